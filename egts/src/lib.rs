//! EGTS packet codec
//!
//! EGTS (ERA GLONASS Telematics Standard) is the binary protocol vehicle
//! terminals use to report positions and status to a telematics platform.
//! It's layered:
//!
//! - the [transport layer][transport] wraps everything in a header with its
//!   own CRC-8,
//! - the [service layer][service] carries one or more service records, all of
//!   them covered by a CRC-16,
//! - each service record carries subrecords, whose payloads are decoded by
//!   type code through a [`Registry`][service::Registry].
//!
//! [GOST R 54619][1] defines the transport layer, [GOST R 33472][2] the
//! service layer and the teledata subrecords.
//!
//! ```plain
//! header    PRV SKID FLG HL HE FDL(2) PID(2) PT [PRA(2) RCA(2) TTL] HCS
//! frame     [type specific prefix] record* SFRCS(2)
//! record    RL(2) RN(2) RFL [OID(4)] [EVID(4)] [TM(4)] SST RST subrecord*
//! subrecord SRT SRL(2) SRD(SRL)
//! ```
//!
//! All integers are little-endian.
//!
//! [1]: https://docs.cntd.ru/document/1200096279
//! [2]: https://docs.cntd.ru/document/1200137386

pub mod packet;
pub mod result;
pub mod service;
pub mod time;
pub mod transport;
pub mod util;

use std::fmt::{
    self,
    Display,
};

pub use crate::{
    packet::{
        DecodedPacket,
        Packet,
    },
    result::{
        Diagnostics,
        ProcessingResult,
        RecordDiagnostics,
    },
    service::{
        Registry,
        ServiceFrame,
        ServiceRecord,
        ServiceType,
        Subrecord,
        SubrecordData,
        SubrecordType,
    },
    time::Timestamp,
    transport::{
        Header,
        PacketType,
        Priority,
    },
};

/// The only protocol version this codec understands.
pub const PROTOCOL_VERSION: u8 = 1;

/// Protocol layer an error was detected in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Layer {
    Transport,
    Frame,
    Record,
    Subrecord,
}

impl Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Layer::Transport => "transport header",
            Layer::Frame => "service frame",
            Layer::Record => "service record",
            Layer::Subrecord => "subrecord",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error(
        "{layer}: needed {needed} bytes at offset {offset}, but only {available} bytes are left"
    )]
    Truncated {
        layer: Layer,
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("header checksum mismatch: packet says 0x{expected:02x}, calculated 0x{calculated:02x}")]
    HeaderChecksumMismatch { expected: u8, calculated: u8 },

    #[error("frame checksum mismatch: packet says 0x{expected:04x}, calculated 0x{calculated:04x}")]
    FrameChecksumMismatch { expected: u16, calculated: u16 },

    #[error("unsupported protocol version: {version}")]
    UnsupportedProtocolVersion { version: u8 },

    #[error("header length is {declared}, but the header layout takes {expected} bytes")]
    HeaderLengthMismatch { declared: u8, expected: u8 },

    #[error("invalid packet type: {value}")]
    InvalidPacketType { value: u8 },

    #[error("can't decode frame data with encryption algorithm {encryption} (compressed: {compressed})")]
    UnsupportedFrameEncoding { encryption: u8, compressed: bool },

    #[error(
        "record {record_number} at offset {offset} declares {declared} bytes of subrecords, but they take {consumed} bytes"
    )]
    RecordLengthMismatch {
        record_number: u16,
        offset: usize,
        declared: usize,
        consumed: usize,
    },

    #[error(
        "subrecord of type {subrecord_type} at offset {offset} declares {declared} bytes, but its payload takes {consumed} bytes"
    )]
    SubrecordLengthMismatch {
        subrecord_type: SubrecordType,
        offset: usize,
        declared: usize,
        consumed: usize,
    },
}

impl DecodeError {
    /// The result code a receiver reports back for this error.
    pub fn processing_result(&self) -> ProcessingResult {
        match self {
            DecodeError::Truncated {
                layer: Layer::Transport,
                ..
            } => ProcessingResult::INC_HEADERFORM,
            DecodeError::Truncated { .. } => ProcessingResult::INC_DATAFORM,
            DecodeError::HeaderChecksumMismatch { .. } => ProcessingResult::HEADERCRC_ERROR,
            DecodeError::FrameChecksumMismatch { .. } => ProcessingResult::DATACRC_ERROR,
            DecodeError::UnsupportedProtocolVersion { .. } => ProcessingResult::UNS_PROTOCOL,
            DecodeError::HeaderLengthMismatch { .. } => ProcessingResult::INC_HEADERFORM,
            DecodeError::InvalidPacketType { .. } => ProcessingResult::UNS_TYPE,
            DecodeError::UnsupportedFrameEncoding { .. } => ProcessingResult::DECRYPT_ERROR,
            DecodeError::RecordLengthMismatch { .. }
            | DecodeError::SubrecordLengthMismatch { .. } => ProcessingResult::INVDATALEN,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("field `{field}` has value {value}, but at most {max} fits")]
    FieldOutOfRange {
        field: &'static str,
        value: i64,
        max: i64,
    },

    #[error("{field} of {degrees}° is out of range")]
    CoordinateOutOfRange { field: &'static str, degrees: f64 },
}

impl EncodeError {
    pub(crate) fn check_range(field: &'static str, value: i64, max: i64) -> Result<(), Self> {
        if (0..=max).contains(&value) {
            Ok(())
        }
        else {
            Err(Self::FieldOutOfRange { field, value, max })
        }
    }

    pub(crate) fn length_u16(field: &'static str, length: usize) -> Result<u16, Self> {
        u16::try_from(length).map_err(|_| {
            Self::FieldOutOfRange {
                field,
                value: i64::try_from(length).unwrap_or(i64::MAX),
                max: u16::MAX.into(),
            }
        })
    }
}
