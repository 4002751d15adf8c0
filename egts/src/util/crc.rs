//! Checksums
//!
//! The transport header is protected by a CRC-8, the service frame by a
//! CRC-16. Both are the plain (unreflected) variants with all-ones initial
//! value.

/// CRC algorithm for the transport header
///
/// This is what the crc catalogue calls CRC-8/NRSC-5.
pub const CRC_8_EGTS: crc::Algorithm<u8> = crc::Algorithm {
    width: 8,
    poly: 0x31,
    init: 0xff,
    refin: false,
    refout: false,
    xorout: 0x00,
    check: 0xf7,
    residue: 0x00,
};

/// CRC algorithm for the service frame
///
/// This is CRC-16/CCITT-FALSE (CRC-16/IBM-3740).
pub const CRC_16_EGTS: crc::Algorithm<u16> = crc::Algorithm {
    width: 16,
    poly: 0x1021,
    init: 0xffff,
    refin: false,
    refout: false,
    xorout: 0x0000,
    check: 0x29b1,
    residue: 0x0000,
};

const HEADER_CRC: crc::Crc<u8> = crc::Crc::<u8>::new(&CRC_8_EGTS);
const FRAME_CRC: crc::Crc<u16> = crc::Crc::<u16>::new(&CRC_16_EGTS);

/// Header checksum over all header bytes preceding the checksum byte.
pub fn crc8(bytes: &[u8]) -> u8 {
    HEADER_CRC.checksum(bytes)
}

/// Frame checksum over the service frame bytes.
pub fn crc16(bytes: &[u8]) -> u16 {
    FRAME_CRC.checksum(bytes)
}

#[cfg(test)]
mod tests {
    use super::{
        crc8,
        crc16,
    };

    #[test]
    fn it_matches_catalogue_check_values() {
        assert_eq!(crc8(b"123456789"), 0xf7);
        assert_eq!(crc16(b"123456789"), 0x29b1);
    }

    #[test]
    fn it_checksums_reference_packet() {
        let header = [0x01, 0x00, 0x03, 0x0b, 0x00, 0x23, 0x00, 0x8a, 0x00, 0x01];
        assert_eq!(crc8(&header), 0x49);

        let frame = [
            0x18, 0x00, 0x61, 0x00, 0x99, 0xb0, 0x09, 0x02, 0x00, 0x02, 0x02, 0x10, 0x15, 0x00,
            0xd5, 0x3f, 0x01, 0x10, 0x6f, 0x1c, 0x05, 0x9e, 0x7a, 0xb5, 0x3c, 0x35, 0x01, 0xd0,
            0x87, 0x2c, 0x01, 0x00, 0x00, 0x00, 0x00,
        ];
        assert_eq!(crc16(&frame), 0x27cc);
    }
}
