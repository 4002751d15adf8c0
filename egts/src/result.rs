//! Processing results and decode diagnostics

use std::fmt::{
    self,
    Display,
};

/// Processing result code
///
/// Reported back to the sender in response packets, at the transport level
/// and per record. Codes 2 to 127 are unassigned.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessingResult(u8);

impl ProcessingResult {
    /// Processed successfully
    pub const OK: Self = Self(0);

    /// Still being processed
    pub const IN_PROGRESS: Self = Self(1);

    /// Unsupported protocol version
    pub const UNS_PROTOCOL: Self = Self(128);

    /// Decryption failed
    pub const DECRYPT_ERROR: Self = Self(129);

    pub const PROC_DENIED: Self = Self(130);

    /// Malformed transport header
    pub const INC_HEADERFORM: Self = Self(131);

    /// Malformed frame data
    pub const INC_DATAFORM: Self = Self(132);

    /// Unsupported packet type
    pub const UNS_TYPE: Self = Self(133);

    pub const NOTEN_PARAMS: Self = Self(134);

    /// Processed already (duplicate)
    pub const DBL_PROC: Self = Self(135);

    pub const PROC_SRC_DENIED: Self = Self(136);

    /// Header checksum mismatch
    pub const HEADERCRC_ERROR: Self = Self(137);

    /// Frame checksum mismatch
    pub const DATACRC_ERROR: Self = Self(138);

    /// Invalid data length
    pub const INVDATALEN: Self = Self(139);

    pub const ROUTE_NFOUND: Self = Self(140);
    pub const ROUTE_CLOSED: Self = Self(141);
    pub const ROUTE_DENIED: Self = Self(142);
    pub const INVADDR: Self = Self(143);
    pub const TTLEXPIRED: Self = Self(144);
    pub const NO_ACK: Self = Self(145);
    pub const OBJ_NFOUND: Self = Self(146);
    pub const EVNT_NFOUND: Self = Self(147);
    pub const SRVC_NFOUND: Self = Self(148);
    pub const SRVC_DENIED: Self = Self(149);

    /// Unknown service or subrecord type
    pub const SRVC_UNKN: Self = Self(150);

    pub const AUTH_DENIED: Self = Self(151);
    pub const ALREADY_EXISTS: Self = Self(152);
    pub const ID_NFOUND: Self = Self(153);
    pub const INC_DATETIME: Self = Self(154);
    pub const IO_ERROR: Self = Self(155);
    pub const NO_RES_AVAIL: Self = Self(156);
    pub const MODULE_FAULT: Self = Self(157);

    pub const fn from_u8(byte: u8) -> Self {
        Self(byte)
    }

    pub fn as_u8(&self) -> u8 {
        self.0
    }

    pub fn is_ok(&self) -> bool {
        *self == Self::OK
    }

    /// Symbolic name of the code, if it's an assigned one.
    pub fn name(&self) -> Option<&'static str> {
        let name = match self.0 {
            0 => "OK",
            1 => "IN_PROGRESS",
            128 => "UNS_PROTOCOL",
            129 => "DECRYPT_ERROR",
            130 => "PROC_DENIED",
            131 => "INC_HEADERFORM",
            132 => "INC_DATAFORM",
            133 => "UNS_TYPE",
            134 => "NOTEN_PARAMS",
            135 => "DBL_PROC",
            136 => "PROC_SRC_DENIED",
            137 => "HEADERCRC_ERROR",
            138 => "DATACRC_ERROR",
            139 => "INVDATALEN",
            140 => "ROUTE_NFOUND",
            141 => "ROUTE_CLOSED",
            142 => "ROUTE_DENIED",
            143 => "INVADDR",
            144 => "TTLEXPIRED",
            145 => "NO_ACK",
            146 => "OBJ_NFOUND",
            147 => "EVNT_NFOUND",
            148 => "SRVC_NFOUND",
            149 => "SRVC_DENIED",
            150 => "SRVC_UNKN",
            151 => "AUTH_DENIED",
            152 => "ALREADY_EXISTS",
            153 => "ID_NFOUND",
            154 => "INC_DATETIME",
            155 => "IO_ERROR",
            156 => "NO_RES_AVAIL",
            157 => "MODULE_FAULT",
            _ => return None,
        };
        Some(name)
    }
}

impl Default for ProcessingResult {
    fn default() -> Self {
        Self::OK
    }
}

impl Display for ProcessingResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} ({name})", self.0),
            None => write!(f, "{}", self.0),
        }
    }
}

impl From<ProcessingResult> for u8 {
    fn from(value: ProcessingResult) -> Self {
        value.0
    }
}

/// Non-fatal findings of a successful decode
///
/// A packet that decodes without error can still contain things the receiver
/// didn't understand (e.g. unknown subrecord types). These are reported here
/// instead of failing the decode.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Diagnostics {
    pub transport: ProcessingResult,
    pub records: Vec<RecordDiagnostics>,
}

impl Diagnostics {
    pub fn is_ok(&self) -> bool {
        self.transport.is_ok() && self.records.iter().all(RecordDiagnostics::is_ok)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordDiagnostics {
    pub record_number: u16,

    /// First non-OK subrecord result, or OK.
    pub result: ProcessingResult,

    /// One result per subrecord, in order.
    pub subrecords: Vec<ProcessingResult>,
}

impl RecordDiagnostics {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}
