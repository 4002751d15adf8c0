//! Transport layer
//!
//! Every packet starts with an 11 byte header (16 bytes with a routing
//! block), protected by a CRC-8 in its last byte. The header tells how many
//! bytes of service frame follow and what kind of frame it is.

use bytes::{
    BufMut,
    BytesMut,
};

use crate::{
    DecodeError,
    EncodeError,
    PROTOCOL_VERSION,
    util::{
        Cursor,
        bits::{
            BitLayout,
            field,
        },
        crc::crc8,
    },
};

/// Header length without routing block, including the checksum.
pub const HEADER_LENGTH: u8 = 11;

/// Header length with routing block, including the checksum.
pub const HEADER_LENGTH_WITH_ROUTE: u8 = 16;

/// Offset of the flags byte in the header.
const FLAGS_OFFSET: usize = 2;

const HEADER_FLAGS: BitLayout<5> = BitLayout::new([
    field("PRF", 2),
    field("RTE", 1),
    field("ENA", 2),
    field("CMP", 1),
    field("PR", 2),
]);

/// Routing priority of a packet
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(u8);

impl Priority {
    pub const HIGHEST: Self = Self(0b00);
    pub const HIGH: Self = Self(0b01);
    pub const NORMAL: Self = Self(0b10);
    pub const LOW: Self = Self(0b11);

    pub const fn from_u8_unchecked(byte: u8) -> Self {
        Self(byte)
    }

    pub fn as_u8(&self) -> u8 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::HIGHEST
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PacketType {
    /// Acknowledgement of a received packet
    Response,

    /// Service records
    AppData,

    /// Service records with a signature
    SignedAppData,
}

impl PacketType {
    pub fn from_u8(value: u8) -> Result<Self, DecodeError> {
        match value {
            0 => Ok(Self::Response),
            1 => Ok(Self::AppData),
            2 => Ok(Self::SignedAppData),
            _ => Err(DecodeError::InvalidPacketType { value }),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            Self::Response => 0,
            Self::AppData => 1,
            Self::SignedAppData => 2,
        }
    }
}

/// Routing block
///
/// Only present on packets that are forwarded between platforms.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Route {
    /// Address of the platform that sent the packet
    pub sender: u16,

    /// Address of the platform the packet is for
    pub recipient: u16,

    /// Remaining hops
    pub ttl: u8,
}

/// Transport header fields that are not derived from the rest of the packet.
///
/// Protocol version, header length, frame length, packet type and checksum
/// are computed on encode. On decode they are reported in a
/// [`DecodedHeader`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Header {
    pub security_key_id: u8,

    /// 2 bit header prefix. Always 0 in this protocol version.
    pub prefix: u8,

    /// 2 bit encryption algorithm. 0 means unencrypted.
    pub encryption: u8,

    pub compressed: bool,

    pub priority: Priority,

    pub header_encoding: u8,

    pub packet_id: u16,

    pub route: Option<Route>,
}

/// A header as it was found on the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedHeader {
    pub header: Header,
    pub packet_type: PacketType,
    pub protocol_version: u8,
    pub header_length: u8,
    pub frame_data_length: u16,
    pub checksum: u8,
}

impl Header {
    pub fn new(packet_id: u16) -> Self {
        Self {
            packet_id,
            ..Default::default()
        }
    }

    /// Length of the encoded header, including the checksum.
    pub fn header_length(&self) -> u8 {
        header_length(self.route.is_some())
    }

    /// Decodes a header.
    ///
    /// The checksum is checked before any field is looked at, so a corrupted
    /// header is always reported as [`DecodeError::HeaderChecksumMismatch`].
    /// Only the route flag is read beforehand, since it decides how long the
    /// header is.
    pub fn decode(cursor: &mut Cursor<'_>) -> Result<DecodedHeader, DecodeError> {
        cursor.ensure(HEADER_LENGTH.into())?;
        let [_, route_flag, ..] = HEADER_FLAGS.unpack(cursor.rest()[FLAGS_OFFSET]);
        let layout_length = header_length(route_flag != 0);
        cursor.ensure(layout_length.into())?;

        let checksum_offset = usize::from(layout_length) - 1;
        let bytes = cursor.rest();
        let checksum = bytes[checksum_offset];
        let calculated = crc8(&bytes[..checksum_offset]);
        if checksum != calculated {
            return Err(DecodeError::HeaderChecksumMismatch {
                expected: checksum,
                calculated,
            });
        }

        let protocol_version = cursor.read_u8()?;
        if protocol_version != PROTOCOL_VERSION {
            return Err(DecodeError::UnsupportedProtocolVersion {
                version: protocol_version,
            });
        }

        let security_key_id = cursor.read_u8()?;
        let [prefix, _, encryption, compressed, priority] =
            HEADER_FLAGS.unpack(cursor.read_u8()?);

        let declared_length = cursor.read_u8()?;
        if declared_length != layout_length {
            return Err(DecodeError::HeaderLengthMismatch {
                declared: declared_length,
                expected: layout_length,
            });
        }

        let header_encoding = cursor.read_u8()?;
        let frame_data_length = cursor.read_u16_le()?;
        let packet_id = cursor.read_u16_le()?;
        let packet_type = PacketType::from_u8(cursor.read_u8()?)?;

        let route = if route_flag != 0 {
            Some(Route {
                sender: cursor.read_u16_le()?,
                recipient: cursor.read_u16_le()?,
                ttl: cursor.read_u8()?,
            })
        }
        else {
            None
        };

        // already checked
        cursor.read_u8()?;

        tracing::trace!(
            packet_id,
            ?packet_type,
            header_length = layout_length,
            frame_data_length,
            "decoded transport header"
        );

        Ok(DecodedHeader {
            header: Header {
                security_key_id,
                prefix,
                encryption,
                compressed: compressed != 0,
                priority: Priority::from_u8_unchecked(priority),
                header_encoding,
                packet_id,
                route,
            },
            packet_type,
            protocol_version,
            header_length: layout_length,
            frame_data_length,
            checksum,
        })
    }

    /// Encodes the header and returns its checksum.
    pub fn encode<B: BufMut>(
        &self,
        packet_type: PacketType,
        frame_data_length: u16,
        buffer: &mut B,
    ) -> Result<u8, EncodeError> {
        let flags = HEADER_FLAGS.pack([
            self.prefix,
            self.route.is_some().into(),
            self.encryption,
            self.compressed.into(),
            self.priority.as_u8(),
        ])?;

        let mut header = BytesMut::with_capacity(HEADER_LENGTH_WITH_ROUTE.into());
        header.put_u8(PROTOCOL_VERSION);
        header.put_u8(self.security_key_id);
        header.put_u8(flags);
        header.put_u8(self.header_length());
        header.put_u8(self.header_encoding);
        header.put_u16_le(frame_data_length);
        header.put_u16_le(self.packet_id);
        header.put_u8(packet_type.as_u8());

        if let Some(route) = &self.route {
            header.put_u16_le(route.sender);
            header.put_u16_le(route.recipient);
            header.put_u8(route.ttl);
        }

        let checksum = crc8(&header);
        header.put_u8(checksum);
        buffer.put_slice(&header);

        Ok(checksum)
    }
}

fn header_length(has_route: bool) -> u8 {
    if has_route {
        HEADER_LENGTH_WITH_ROUTE
    }
    else {
        HEADER_LENGTH
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::{
        Header,
        PacketType,
        Priority,
        Route,
    };
    use crate::{
        DecodeError,
        Layer,
        util::{
            Cursor,
            crc::crc8,
        },
    };

    const HEADER: [u8; 11] = [
        0x01, 0x00, 0x03, 0x0b, 0x00, 0x23, 0x00, 0x8a, 0x00, 0x01, 0x49,
    ];

    /// Recomputes the checksum after tampering with a header.
    fn reseal(header: &mut [u8]) {
        let last = header.len() - 1;
        header[last] = crc8(&header[..last]);
    }

    fn decode(bytes: &[u8]) -> Result<super::DecodedHeader, DecodeError> {
        Header::decode(&mut Cursor::new(bytes, Layer::Transport))
    }

    #[test]
    fn it_decodes_reference_header() {
        let decoded = decode(&HEADER).unwrap();
        assert_eq!(decoded.protocol_version, 1);
        assert_eq!(decoded.header_length, 11);
        assert_eq!(decoded.frame_data_length, 35);
        assert_eq!(decoded.packet_type, PacketType::AppData);
        assert_eq!(decoded.checksum, 0x49);
        assert_eq!(decoded.header.packet_id, 138);
        assert_eq!(decoded.header.priority, Priority::LOW);
        assert_eq!(decoded.header.route, None);
        assert!(!decoded.header.compressed);
    }

    #[test]
    fn it_encodes_reference_header() {
        let header = Header {
            priority: Priority::LOW,
            ..Header::new(138)
        };
        let mut buffer = BytesMut::new();
        let checksum = header.encode(PacketType::AppData, 35, &mut buffer).unwrap();
        assert_eq!(checksum, 0x49);
        assert_eq!(&buffer[..], &HEADER[..]);
    }

    #[test]
    fn it_round_trips_a_routed_header() {
        let header = Header {
            route: Some(Route {
                sender: 0x1234,
                recipient: 0xabcd,
                ttl: 7,
            }),
            ..Header::new(1)
        };
        let mut buffer = BytesMut::new();
        header.encode(PacketType::Response, 0, &mut buffer).unwrap();
        assert_eq!(buffer.len(), 16);
        assert_eq!(buffer[3], 16);

        let decoded = decode(&buffer).unwrap();
        assert_eq!(decoded.header, header);
        assert_eq!(decoded.header_length, 16);
        assert_eq!(decoded.packet_type, PacketType::Response);
    }

    #[test]
    fn it_checks_the_checksum_first() {
        // version 2 would be unsupported, but the checksum no longer matches
        let mut bytes = HEADER;
        bytes[0] = 0x02;
        match decode(&bytes) {
            Err(DecodeError::HeaderChecksumMismatch {
                expected,
                calculated,
            }) => {
                assert_eq!(expected, 0x49);
                assert_ne!(calculated, 0x49);
            }
            result => panic!("unexpected result: {result:?}"),
        }
    }

    #[test]
    fn it_rejects_unsupported_versions() {
        let mut bytes = HEADER;
        bytes[0] = 0x02;
        reseal(&mut bytes);
        assert!(matches!(
            decode(&bytes),
            Err(DecodeError::UnsupportedProtocolVersion { version: 2 })
        ));
    }

    #[test]
    fn it_rejects_a_header_length_not_matching_the_route_flag() {
        let mut bytes = HEADER;
        bytes[3] = 16;
        reseal(&mut bytes);
        assert!(matches!(
            decode(&bytes),
            Err(DecodeError::HeaderLengthMismatch {
                declared: 16,
                expected: 11,
            })
        ));
    }

    #[test]
    fn it_rejects_invalid_packet_types() {
        let mut bytes = HEADER;
        bytes[9] = 3;
        reseal(&mut bytes);
        assert!(matches!(
            decode(&bytes),
            Err(DecodeError::InvalidPacketType { value: 3 })
        ));
    }

    #[test]
    fn it_needs_the_routing_block_when_flagged() {
        let mut bytes = HEADER;
        bytes[2] |= 0b0010_0000;
        match decode(&bytes) {
            Err(DecodeError::Truncated {
                layer,
                needed,
                available,
                ..
            }) => {
                assert_eq!(layer, Layer::Transport);
                assert_eq!(needed, 16);
                assert_eq!(available, 11);
            }
            result => panic!("unexpected result: {result:?}"),
        }
    }

    #[test]
    fn it_rejects_out_of_range_flags() {
        let header = Header {
            encryption: 4,
            ..Header::new(1)
        };
        assert!(
            header
                .encode(PacketType::AppData, 0, &mut BytesMut::new())
                .is_err()
        );
    }
}
