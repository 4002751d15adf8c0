//! Subrecords and the registry of subrecord decoders

use std::{
    collections::HashMap,
    fmt::{
        self,
        Debug,
        Display,
    },
    sync::OnceLock,
};

use bytes::{
    BufMut,
    Bytes,
    BytesMut,
};

use super::{
    position::PositionData,
    response::RecordResponse,
};
use crate::{
    DecodeError,
    EncodeError,
    Layer,
    ProcessingResult,
    util::Cursor,
};

/// Subrecord type code
///
/// Codes are assigned per service. The ones here are those of the teledata
/// service, plus [`RECORD_RESPONSE`][Self::RECORD_RESPONSE] which all
/// services share.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubrecordType(u8);

impl SubrecordType {
    pub const RECORD_RESPONSE: Self = Self(0);
    pub const TERM_IDENTITY: Self = Self(1);
    pub const MODULE_DATA: Self = Self(2);
    pub const VEHICLE_DATA: Self = Self(3);
    pub const AUTH_PARAMS: Self = Self(6);
    pub const AUTH_INFO: Self = Self(7);
    pub const SERVICE_INFO: Self = Self(8);
    pub const RESULT_CODE: Self = Self(9);
    pub const POS_DATA: Self = Self(16);
    pub const EXT_POS_DATA: Self = Self(17);
    pub const AD_SENSORS_DATA: Self = Self(18);
    pub const COUNTERS_DATA: Self = Self(19);
    pub const ACCEL_DATA: Self = Self(20);
    pub const STATE_DATA: Self = Self(21);
    pub const LOOPIN_DATA: Self = Self(22);
    pub const ABS_DIG_SENS_DATA: Self = Self(23);
    pub const ABS_AN_SENS_DATA: Self = Self(24);
    pub const ABS_CNTR_DATA: Self = Self(25);
    pub const ABS_LOOPIN_DATA: Self = Self(26);
    pub const LIQUID_LEVEL_SENSOR: Self = Self(27);
    pub const PASSENGERS_COUNTERS: Self = Self(28);

    pub const fn from_u8(byte: u8) -> Self {
        Self(byte)
    }

    pub fn as_u8(&self) -> u8 {
        self.0
    }

    pub fn name(&self) -> Option<&'static str> {
        let name = match *self {
            Self::RECORD_RESPONSE => "EGTS_SR_RECORD_RESPONSE",
            Self::TERM_IDENTITY => "EGTS_SR_TERM_IDENTITY",
            Self::MODULE_DATA => "EGTS_SR_MODULE_DATA",
            Self::VEHICLE_DATA => "EGTS_SR_VEHICLE_DATA",
            Self::AUTH_PARAMS => "EGTS_SR_AUTH_PARAMS",
            Self::AUTH_INFO => "EGTS_SR_AUTH_INFO",
            Self::SERVICE_INFO => "EGTS_SR_SERVICE_INFO",
            Self::RESULT_CODE => "EGTS_SR_RESULT_CODE",
            Self::POS_DATA => "EGTS_SR_POS_DATA",
            Self::EXT_POS_DATA => "EGTS_SR_EXT_POS_DATA",
            Self::AD_SENSORS_DATA => "EGTS_SR_AD_SENSORS_DATA",
            Self::COUNTERS_DATA => "EGTS_SR_COUNTERS_DATA",
            Self::ACCEL_DATA => "EGTS_SR_ACCEL_DATA",
            Self::STATE_DATA => "EGTS_SR_STATE_DATA",
            Self::LOOPIN_DATA => "EGTS_SR_LOOPIN_DATA",
            Self::ABS_DIG_SENS_DATA => "EGTS_SR_ABS_DIG_SENS_DATA",
            Self::ABS_AN_SENS_DATA => "EGTS_SR_ABS_AN_SENS_DATA",
            Self::ABS_CNTR_DATA => "EGTS_SR_ABS_CNTR_DATA",
            Self::ABS_LOOPIN_DATA => "EGTS_SR_ABS_LOOPIN_DATA",
            Self::LIQUID_LEVEL_SENSOR => "EGTS_SR_LIQUID_LEVEL_SENSOR",
            Self::PASSENGERS_COUNTERS => "EGTS_SR_PASSENGERS_COUNTERS",
            _ => return None,
        };
        Some(name)
    }
}

impl Display for SubrecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} ({name})", self.0),
            None => write!(f, "{}", self.0),
        }
    }
}

/// A subrecord payload with a fixed type code.
pub trait SubrecordPayload: Sized + Into<SubrecordData> {
    /// Type code the payload is registered and encoded under by default.
    const SUBRECORD_TYPE: SubrecordType;

    /// Decodes the payload from exactly the bytes the subrecord declares.
    ///
    /// Running out of bytes is reported by the caller as a length mismatch,
    /// so implementations just read what they need.
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, DecodeError>;

    fn encode<B: BufMut>(&self, buffer: &mut B) -> Result<(), EncodeError>;
}

/// A subrecord: its type code and payload.
///
/// The type code is the one read from the wire and is written back as is,
/// so a payload decoder registered under another code round-trips.
#[derive(Clone, Debug, PartialEq)]
pub struct Subrecord {
    pub subrecord_type: SubrecordType,
    pub data: SubrecordData,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SubrecordData {
    RecordResponse(RecordResponse),
    PositionData(PositionData),

    /// Payload the registry had no decoder for, kept as raw bytes.
    Unrecognized(Bytes),
}

impl Subrecord {
    pub fn new(subrecord_type: SubrecordType, data: impl Into<SubrecordData>) -> Self {
        Self {
            subrecord_type,
            data: data.into(),
        }
    }

    /// Wraps a payload under its default type code.
    pub fn from_payload<P: SubrecordPayload>(payload: P) -> Self {
        Self::new(P::SUBRECORD_TYPE, payload)
    }

    pub fn unrecognized(subrecord_type: SubrecordType, data: Bytes) -> Self {
        Self::new(subrecord_type, SubrecordData::Unrecognized(data))
    }

    pub fn subrecord_type(&self) -> SubrecordType {
        self.subrecord_type
    }

    /// Result reported for this subrecord in a record response.
    pub fn processing_result(&self) -> ProcessingResult {
        match self.data {
            SubrecordData::Unrecognized(_) => ProcessingResult::SRVC_UNKN,
            _ => ProcessingResult::OK,
        }
    }

    /// Decodes a subrecord.
    ///
    /// `cursor` holds the rest of the record's subrecords. Running out of
    /// those bytes is a [`Layer::Record`] truncation.
    pub fn decode(cursor: &mut Cursor<'_>, registry: &Registry) -> Result<Self, DecodeError> {
        let subrecord_type = SubrecordType(cursor.read_u8()?);
        let length = cursor.read_u16_le()?;
        let offset = cursor.offset();
        let mut payload = cursor.split(length.into(), Layer::Subrecord)?;

        let Some(decode) = registry.get(subrecord_type) else {
            tracing::debug!(%subrecord_type, length, offset, "unrecognized subrecord");
            return Ok(Self::unrecognized(
                subrecord_type,
                Bytes::copy_from_slice(payload.rest()),
            ));
        };

        let length_mismatch = |consumed| {
            DecodeError::SubrecordLengthMismatch {
                subrecord_type,
                offset,
                declared: length.into(),
                consumed,
            }
        };

        let data = decode(&mut payload).map_err(|error| {
            match error {
                DecodeError::Truncated {
                    layer: Layer::Subrecord,
                    needed,
                    ..
                } => length_mismatch(payload.consumed() + needed),
                error => error,
            }
        })?;

        if !payload.is_empty() {
            return Err(length_mismatch(payload.consumed()));
        }

        Ok(Self {
            subrecord_type,
            data,
        })
    }

    pub fn encode<B: BufMut>(&self, buffer: &mut B) -> Result<(), EncodeError> {
        let mut payload = BytesMut::new();
        match &self.data {
            SubrecordData::RecordResponse(response) => response.encode(&mut payload)?,
            SubrecordData::PositionData(position) => position.encode(&mut payload)?,
            SubrecordData::Unrecognized(data) => payload.put_slice(data),
        }
        let length = EncodeError::length_u16("subrecord length", payload.len())?;

        buffer.put_u8(self.subrecord_type.as_u8());
        buffer.put_u16_le(length);
        buffer.put_slice(&payload);

        Ok(())
    }
}

/// Decodes a subrecord payload. See [`Registry`].
pub type DecodeFn = fn(&mut Cursor<'_>) -> Result<SubrecordData, DecodeError>;

fn decode_payload<P: SubrecordPayload>(
    cursor: &mut Cursor<'_>,
) -> Result<SubrecordData, DecodeError> {
    P::decode(cursor).map(Into::into)
}

/// Maps subrecord type codes to payload decoders.
///
/// Subrecords with a type that has no decoder are kept as
/// [`SubrecordData::Unrecognized`]. The default registry decodes
/// [`RecordResponse`] and [`PositionData`].
#[derive(Clone)]
pub struct Registry {
    decoders: HashMap<SubrecordType, DecodeFn>,
}

impl Registry {
    /// A registry that doesn't decode anything.
    pub fn empty() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// The default registry, shared by all callers.
    pub fn standard() -> &'static Registry {
        static STANDARD: OnceLock<Registry> = OnceLock::new();
        STANDARD.get_or_init(Registry::default)
    }

    pub fn register<P: SubrecordPayload>(&mut self) -> &mut Self {
        self.register_as::<P>(P::SUBRECORD_TYPE)
    }

    /// Registers a payload under a type code other than its own, e.g. for
    /// a service that numbers its subrecords differently.
    pub fn register_as<P: SubrecordPayload>(
        &mut self,
        subrecord_type: SubrecordType,
    ) -> &mut Self {
        self.register_decoder(subrecord_type, decode_payload::<P>)
    }

    /// Registers a decoder, replacing any previous one for `subrecord_type`.
    pub fn register_decoder(
        &mut self,
        subrecord_type: SubrecordType,
        decoder: DecodeFn,
    ) -> &mut Self {
        self.decoders.insert(subrecord_type, decoder);
        self
    }

    pub fn remove(&mut self, subrecord_type: SubrecordType) -> Option<DecodeFn> {
        self.decoders.remove(&subrecord_type)
    }

    pub fn get(&self, subrecord_type: SubrecordType) -> Option<DecodeFn> {
        self.decoders.get(&subrecord_type).copied()
    }

    pub fn contains(&self, subrecord_type: SubrecordType) -> bool {
        self.decoders.contains_key(&subrecord_type)
    }
}

impl Default for Registry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry
            .register::<RecordResponse>()
            .register::<PositionData>();
        registry
    }
}

impl Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types = self.decoders.keys().collect::<Vec<_>>();
        types.sort();
        f.debug_struct("Registry").field("types", &types).finish()
    }
}

#[cfg(test)]
mod tests {
    use bytes::{
        Bytes,
        BytesMut,
    };

    use super::{
        Registry,
        Subrecord,
        SubrecordData,
        SubrecordType,
    };
    use crate::{
        DecodeError,
        Layer,
        ProcessingResult,
        service::{
            PositionData,
            RecordResponse,
        },
        util::Cursor,
    };

    const POSITION_SUBRECORD: [u8; 24] = [
        0x10, 0x15, 0x00, 0xd5, 0x3f, 0x01, 0x10, 0x6f, 0x1c, 0x05, 0x9e, 0x7a, 0xb5, 0x3c, 0x35,
        0x01, 0xd0, 0x87, 0x2c, 0x01, 0x00, 0x00, 0x00, 0x00,
    ];

    fn decode(bytes: &[u8], registry: &Registry) -> Result<Subrecord, DecodeError> {
        let mut cursor = Cursor::new(bytes, Layer::Record);
        let subrecord = Subrecord::decode(&mut cursor, registry)?;
        assert!(cursor.is_empty());
        Ok(subrecord)
    }

    #[test]
    fn it_decodes_registered_types() {
        match decode(&POSITION_SUBRECORD, Registry::standard()).unwrap() {
            Subrecord {
                subrecord_type: SubrecordType::POS_DATA,
                data: SubrecordData::PositionData(position),
            } => assert_eq!(position.odometer, 1),
            subrecord => panic!("unexpected subrecord: {subrecord:?}"),
        }
    }

    #[test]
    fn it_keeps_unknown_types_as_bytes() {
        let subrecord = decode(&POSITION_SUBRECORD, &Registry::empty()).unwrap();
        assert_eq!(subrecord.processing_result(), ProcessingResult::SRVC_UNKN);
        assert_eq!(subrecord.subrecord_type(), SubrecordType::POS_DATA);
        match &subrecord.data {
            SubrecordData::Unrecognized(data) => {
                assert_eq!(&data[..], &POSITION_SUBRECORD[3..]);
            }
            data => panic!("unexpected data: {data:?}"),
        }

        let mut buffer = BytesMut::new();
        subrecord.encode(&mut buffer).unwrap();
        assert_eq!(&buffer[..], &POSITION_SUBRECORD[..]);
    }

    #[test]
    fn it_reports_payloads_shorter_than_declared() {
        // declares 22 bytes: position data is done after 21
        let mut bytes = POSITION_SUBRECORD.to_vec();
        bytes[1] = 22;
        bytes.push(0xff);
        match decode(&bytes, Registry::standard()) {
            Err(DecodeError::SubrecordLengthMismatch {
                subrecord_type,
                offset,
                declared,
                consumed,
            }) => {
                assert_eq!(subrecord_type, SubrecordType::POS_DATA);
                assert_eq!(offset, 3);
                assert_eq!(declared, 22);
                assert_eq!(consumed, 21);
            }
            result => panic!("unexpected result: {result:?}"),
        }
    }

    #[test]
    fn it_reports_payloads_longer_than_declared() {
        // declares 20 bytes: position data needs 21
        let mut bytes = POSITION_SUBRECORD[..23].to_vec();
        bytes[1] = 20;
        match decode(&bytes, Registry::standard()) {
            Err(DecodeError::SubrecordLengthMismatch {
                declared, consumed, ..
            }) => {
                assert_eq!(declared, 20);
                assert_eq!(consumed, 21);
            }
            result => panic!("unexpected result: {result:?}"),
        }
    }

    #[test]
    fn it_reports_subrecords_overrunning_the_record() {
        match decode(&POSITION_SUBRECORD[..20], Registry::standard()) {
            Err(DecodeError::Truncated { layer, needed, .. }) => {
                assert_eq!(layer, Layer::Record);
                assert_eq!(needed, 21);
            }
            result => panic!("unexpected result: {result:?}"),
        }
    }

    #[test]
    fn it_uses_custom_decoders() {
        let mut registry = Registry::empty();
        registry.register_decoder(SubrecordType::COUNTERS_DATA, |cursor| {
            let data = Bytes::copy_from_slice(cursor.rest());
            cursor.read_slice(data.len())?;
            Ok(SubrecordData::Unrecognized(data))
        });
        assert!(registry.contains(SubrecordType::COUNTERS_DATA));
        assert!(!registry.contains(SubrecordType::POS_DATA));

        let subrecord = decode(&[19, 0x02, 0x00, 0xaa, 0xbb], &registry).unwrap();
        assert_eq!(subrecord.subrecord_type(), SubrecordType::COUNTERS_DATA);

        assert!(registry.remove(SubrecordType::COUNTERS_DATA).is_some());
        assert!(registry.get(SubrecordType::COUNTERS_DATA).is_none());
    }

    #[test]
    fn it_keeps_the_wire_type_of_payloads_registered_under_other_codes() {
        let mut registry = Registry::empty();
        registry.register_as::<PositionData>(SubrecordType::EXT_POS_DATA);

        let mut bytes = POSITION_SUBRECORD;
        bytes[0] = SubrecordType::EXT_POS_DATA.as_u8();

        let subrecord = decode(&bytes, &registry).unwrap();
        assert_eq!(subrecord.subrecord_type(), SubrecordType::EXT_POS_DATA);
        assert_eq!(subrecord.processing_result(), ProcessingResult::OK);
        match &subrecord.data {
            SubrecordData::PositionData(position) => assert_eq!(position.odometer, 1),
            data => panic!("unexpected data: {data:?}"),
        }

        let mut buffer = BytesMut::new();
        subrecord.encode(&mut buffer).unwrap();
        assert_eq!(&buffer[..], &bytes[..]);
    }

    #[test]
    fn it_encodes_payloads_under_their_default_type() {
        let subrecord = Subrecord::from_payload(RecordResponse {
            confirmed_record_number: 97,
            status: ProcessingResult::OK,
        });
        let mut buffer = BytesMut::new();
        subrecord.encode(&mut buffer).unwrap();
        assert_eq!(&buffer[..], &[0x00, 0x03, 0x00, 0x61, 0x00, 0x00]);

        let mut buffer = BytesMut::new();
        Subrecord::new(SubrecordType::from_u8(200), subrecord.data)
            .encode(&mut buffer)
            .unwrap();
        assert_eq!(buffer[0], 200);
    }

    #[test]
    fn it_displays_type_names() {
        assert_eq!(SubrecordType::POS_DATA.to_string(), "16 (EGTS_SR_POS_DATA)");
        assert_eq!(SubrecordType::from_u8(99).to_string(), "99");
    }
}
