//! Service layer
//!
//! The service frame follows the transport header. Depending on the packet
//! type it starts with a short prefix, followed by service records. Each
//! record is addressed from one service to another and carries subrecords.

pub mod position;
pub mod response;
pub mod subrecord;

use std::fmt::{
    self,
    Display,
};

use bytes::{
    BufMut,
    Bytes,
    BytesMut,
};

pub use self::{
    position::PositionData,
    response::RecordResponse,
    subrecord::{
        DecodeFn,
        Registry,
        Subrecord,
        SubrecordData,
        SubrecordPayload,
        SubrecordType,
    },
};
use crate::{
    DecodeError,
    EncodeError,
    Layer,
    PacketType,
    Priority,
    ProcessingResult,
    RecordDiagnostics,
    Timestamp,
    util::{
        Cursor,
        bits::{
            BitLayout,
            field,
        },
        crc::crc16,
    },
};

const RECORD_FLAGS: BitLayout<7> = BitLayout::new([
    field("SSOD", 1),
    field("RSOD", 1),
    field("GRP", 1),
    field("RPP", 2),
    field("TMFE", 1),
    field("EVFE", 1),
    field("OBFE", 1),
]);

/// Service a record is sent from or to
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServiceType(u8);

impl ServiceType {
    /// Authentication of terminals
    pub const AUTH: Self = Self(1);

    /// Telematics data, e.g. positions and sensor readings
    pub const TELEDATA: Self = Self(2);

    /// Commands and messages
    pub const COMMANDS: Self = Self(4);

    /// Firmware and configuration updates
    pub const FIRMWARE: Self = Self(9);

    /// Emergency calls
    pub const ECALL: Self = Self(10);

    pub const fn from_u8(byte: u8) -> Self {
        Self(byte)
    }

    pub fn as_u8(&self) -> u8 {
        self.0
    }

    pub fn name(&self) -> Option<&'static str> {
        let name = match *self {
            Self::AUTH => "EGTS_AUTH_SERVICE",
            Self::TELEDATA => "EGTS_TELEDATA_SERVICE",
            Self::COMMANDS => "EGTS_COMMANDS_SERVICE",
            Self::FIRMWARE => "EGTS_FIRMWARE_SERVICE",
            Self::ECALL => "EGTS_ECALL_SERVICE",
            _ => return None,
        };
        Some(name)
    }
}

impl Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} ({name})", self.0),
            None => write!(f, "{}", self.0),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RecordFlags {
    /// The source service is on the terminal.
    pub source_on_device: bool,

    /// The recipient service is on the terminal.
    pub recipient_on_device: bool,

    /// The record is for a group of terminals.
    pub group: bool,

    pub priority: Priority,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ServiceRecord {
    pub record_number: u16,

    pub flags: RecordFlags,

    /// Identifies the terminal
    pub object_id: Option<u32>,

    /// Identifies an event the record belongs to
    pub event_id: Option<u32>,

    /// When the record was created
    pub time: Option<Timestamp>,

    pub source_service: ServiceType,

    pub recipient_service: ServiceType,

    pub subrecords: Vec<Subrecord>,
}

impl ServiceRecord {
    pub fn new(record_number: u16, service: ServiceType) -> Self {
        Self {
            record_number,
            flags: RecordFlags::default(),
            object_id: None,
            event_id: None,
            time: None,
            source_service: service,
            recipient_service: service,
            subrecords: vec![],
        }
    }

    pub fn decode(cursor: &mut Cursor<'_>, registry: &Registry) -> Result<Self, DecodeError> {
        let offset = cursor.offset();
        let record_length = cursor.read_u16_le()?;
        let record_number = cursor.read_u16_le()?;
        let [ssod, rsod, grp, rpp, tmfe, evfe, obfe] = RECORD_FLAGS.unpack(cursor.read_u8()?);

        let object_id = (obfe != 0).then(|| cursor.read_u32_le()).transpose()?;
        let event_id = (evfe != 0).then(|| cursor.read_u32_le()).transpose()?;
        let time = (tmfe != 0)
            .then(|| cursor.read_u32_le().map(Timestamp::from_seconds))
            .transpose()?;

        let source_service = ServiceType(cursor.read_u8()?);
        let recipient_service = ServiceType(cursor.read_u8()?);

        let mut data = cursor.split(record_length.into(), Layer::Record)?;
        let mut subrecords = vec![];

        while !data.is_empty() {
            let subrecord = Subrecord::decode(&mut data, registry).map_err(|error| {
                match error {
                    DecodeError::Truncated {
                        layer: Layer::Record,
                        needed,
                        ..
                    } => {
                        DecodeError::RecordLengthMismatch {
                            record_number,
                            offset,
                            declared: record_length.into(),
                            consumed: data.consumed() + needed,
                        }
                    }
                    error => error,
                }
            })?;
            subrecords.push(subrecord);
        }

        tracing::trace!(
            record_number,
            record_length,
            %source_service,
            %recipient_service,
            num_subrecords = subrecords.len(),
            "decoded service record"
        );

        Ok(Self {
            record_number,
            flags: RecordFlags {
                source_on_device: ssod != 0,
                recipient_on_device: rsod != 0,
                group: grp != 0,
                priority: Priority::from_u8_unchecked(rpp),
            },
            object_id,
            event_id,
            time,
            source_service,
            recipient_service,
            subrecords,
        })
    }

    pub fn encode<B: BufMut>(&self, buffer: &mut B) -> Result<(), EncodeError> {
        let mut data = BytesMut::new();
        for subrecord in &self.subrecords {
            subrecord.encode(&mut data)?;
        }
        let record_length = EncodeError::length_u16("record length", data.len())?;

        let flags = RECORD_FLAGS.pack([
            self.flags.source_on_device.into(),
            self.flags.recipient_on_device.into(),
            self.flags.group.into(),
            self.flags.priority.as_u8(),
            self.time.is_some().into(),
            self.event_id.is_some().into(),
            self.object_id.is_some().into(),
        ])?;

        buffer.put_u16_le(record_length);
        buffer.put_u16_le(self.record_number);
        buffer.put_u8(flags);
        if let Some(object_id) = self.object_id {
            buffer.put_u32_le(object_id);
        }
        if let Some(event_id) = self.event_id {
            buffer.put_u32_le(event_id);
        }
        if let Some(time) = self.time {
            buffer.put_u32_le(time.as_seconds());
        }
        buffer.put_u8(self.source_service.as_u8());
        buffer.put_u8(self.recipient_service.as_u8());
        buffer.put_slice(&data);

        Ok(())
    }

    /// First non-OK subrecord result, or OK.
    pub fn processing_result(&self) -> ProcessingResult {
        self.subrecords
            .iter()
            .map(Subrecord::processing_result)
            .find(|result| !result.is_ok())
            .unwrap_or(ProcessingResult::OK)
    }

    pub fn diagnostics(&self) -> RecordDiagnostics {
        RecordDiagnostics {
            record_number: self.record_number,
            result: self.processing_result(),
            subrecords: self
                .subrecords
                .iter()
                .map(Subrecord::processing_result)
                .collect(),
        }
    }
}

/// The service frame of a packet
///
/// The variant follows the packet type.
#[derive(Clone, Debug, PartialEq)]
pub enum ServiceFrame {
    AppData {
        records: Vec<ServiceRecord>,
    },
    Response {
        /// Id of the packet that is acknowledged
        response_packet_id: u16,

        /// Transport level result for that packet
        result: ProcessingResult,

        records: Vec<ServiceRecord>,
    },
    SignedAppData {
        signature: Bytes,
        records: Vec<ServiceRecord>,
    },
}

impl ServiceFrame {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Self::AppData { .. } => PacketType::AppData,
            Self::Response { .. } => PacketType::Response,
            Self::SignedAppData { .. } => PacketType::SignedAppData,
        }
    }

    pub fn records(&self) -> &[ServiceRecord] {
        match self {
            Self::AppData { records }
            | Self::Response { records, .. }
            | Self::SignedAppData { records, .. } => records,
        }
    }

    pub fn records_mut(&mut self) -> &mut Vec<ServiceRecord> {
        match self {
            Self::AppData { records }
            | Self::Response { records, .. }
            | Self::SignedAppData { records, .. } => records,
        }
    }

    /// Splits off the frame data and checks its checksum.
    ///
    /// Returns the frame data and the checksum, which is only there if the
    /// frame isn't empty. Nothing inside the frame is looked at, so a
    /// corrupted frame is always reported as
    /// [`DecodeError::FrameChecksumMismatch`].
    pub fn verify<'a>(
        cursor: &mut Cursor<'a>,
        frame_data_length: u16,
    ) -> Result<(Cursor<'a>, Option<u16>), DecodeError> {
        let length = usize::from(frame_data_length);
        if length == 0 {
            return Ok((cursor.split(0, Layer::Frame)?, None));
        }

        cursor.ensure(length + 2)?;
        let frame = cursor.split(length, Layer::Frame)?;
        let expected = cursor.read_u16_le()?;
        let calculated = crc16(frame.rest());
        if expected != calculated {
            return Err(DecodeError::FrameChecksumMismatch {
                expected,
                calculated,
            });
        }

        Ok((frame, Some(expected)))
    }

    /// Decodes verified frame data (see [`verify`][Self::verify]).
    pub fn decode(
        frame: &mut Cursor<'_>,
        packet_type: PacketType,
        registry: &Registry,
    ) -> Result<Self, DecodeError> {
        let frame = match packet_type {
            PacketType::AppData => {
                Self::AppData {
                    records: decode_records(frame, registry)?,
                }
            }
            PacketType::Response => {
                let response_packet_id = frame.read_u16_le()?;
                let result = ProcessingResult::from_u8(frame.read_u8()?);
                Self::Response {
                    response_packet_id,
                    result,
                    records: decode_records(frame, registry)?,
                }
            }
            PacketType::SignedAppData => {
                let signature_length = frame.read_u16_le()?;
                let signature = Bytes::copy_from_slice(frame.read_slice(signature_length.into())?);
                Self::SignedAppData {
                    signature,
                    records: decode_records(frame, registry)?,
                }
            }
        };

        Ok(frame)
    }

    /// Encodes the frame data followed by its checksum, if it's not empty.
    ///
    /// Returns the length of the frame data (without checksum).
    pub fn encode<B: BufMut>(&self, buffer: &mut B) -> Result<u16, EncodeError> {
        let mut data = BytesMut::new();

        match self {
            Self::AppData { records } => encode_records(records, &mut data)?,
            Self::Response {
                response_packet_id,
                result,
                records,
            } => {
                data.put_u16_le(*response_packet_id);
                data.put_u8(result.as_u8());
                encode_records(records, &mut data)?;
            }
            Self::SignedAppData { signature, records } => {
                data.put_u16_le(EncodeError::length_u16("signature length", signature.len())?);
                data.put_slice(signature);
                encode_records(records, &mut data)?;
            }
        }

        let frame_data_length = EncodeError::length_u16("frame data length", data.len())?;
        buffer.put_slice(&data);
        if !data.is_empty() {
            buffer.put_u16_le(crc16(&data));
        }

        Ok(frame_data_length)
    }
}

fn decode_records(
    frame: &mut Cursor<'_>,
    registry: &Registry,
) -> Result<Vec<ServiceRecord>, DecodeError> {
    let mut records = vec![];
    while !frame.is_empty() {
        records.push(ServiceRecord::decode(frame, registry)?);
    }
    Ok(records)
}

fn encode_records<B: BufMut>(records: &[ServiceRecord], buffer: &mut B) -> Result<(), EncodeError> {
    for record in records {
        record.encode(buffer)?;
    }
    Ok(())
}
