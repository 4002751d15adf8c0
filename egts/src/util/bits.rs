//! Bit-packed flag bytes
//!
//! EGTS packs flags into single bytes at three layers (transport header,
//! service record, position data). A [`BitLayout`] describes one such byte as
//! an ordered list of named fields, most significant bits first:
//!
//! ```plain
//! bit   7 6 5 4 3 2 1 0
//! HFLG  p p r e e c i i      PRF(2) RTE(1) ENA(2) CMP(1) PR(2)
//! ```

use crate::EncodeError;

/// A named field of a [`BitLayout`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BitField {
    pub name: &'static str,
    pub width: u8,
}

pub const fn field(name: &'static str, width: u8) -> BitField {
    BitField { name, width }
}

/// Layout of `N` bit fields that make up exactly one byte.
#[derive(Clone, Copy, Debug)]
pub struct BitLayout<const N: usize> {
    fields: [BitField; N],
}

impl<const N: usize> BitLayout<N> {
    /// # Panics
    ///
    /// Panics if the widths don't add up to 8 bits. Layouts are constants, so
    /// this fails at compile time.
    pub const fn new(fields: [BitField; N]) -> Self {
        let mut total = 0;
        let mut i = 0;
        while i < N {
            assert!(fields[i].width > 0, "bit fields must be at least 1 bit wide");
            total += fields[i].width as usize;
            i += 1;
        }
        assert!(total == 8, "bit fields must add up to exactly one byte");
        Self { fields }
    }

    /// Packs `values` (in field order) into a byte.
    ///
    /// Fails with [`EncodeError::FieldOutOfRange`] if a value doesn't fit its
    /// field.
    pub fn pack(&self, values: [u8; N]) -> Result<u8, EncodeError> {
        let mut byte = 0u8;
        let mut shift = 8u32;

        for (field, value) in self.fields.iter().zip(values) {
            shift -= u32::from(field.width);
            let max = mask(field.width);
            EncodeError::check_range(field.name, value.into(), max.into())?;
            byte |= value << shift;
        }

        Ok(byte)
    }

    /// Unpacks a byte into its field values (in field order).
    pub fn unpack(&self, byte: u8) -> [u8; N] {
        let mut values = [0; N];
        let mut shift = 8u32;

        for (value, field) in values.iter_mut().zip(&self.fields) {
            shift -= u32::from(field.width);
            *value = (byte >> shift) & mask(field.width);
        }

        values
    }
}

#[inline(always)]
fn mask(width: u8) -> u8 {
    ((1u16 << width) - 1) as u8
}

#[cfg(test)]
mod tests {
    use super::{
        BitLayout,
        field,
    };
    use crate::EncodeError;

    const RECORD_FLAGS: BitLayout<7> = BitLayout::new([
        field("SSOD", 1),
        field("RSOD", 1),
        field("GRP", 1),
        field("RPP", 2),
        field("TMFE", 1),
        field("EVFE", 1),
        field("OBFE", 1),
    ]);

    #[test]
    fn it_unpacks_msb_first() {
        assert_eq!(RECORD_FLAGS.unpack(0x99), [1, 0, 0, 3, 0, 0, 1]);
        assert_eq!(RECORD_FLAGS.unpack(0x00), [0; 7]);
        assert_eq!(RECORD_FLAGS.unpack(0xff), [1, 1, 1, 3, 1, 1, 1]);
    }

    #[test]
    fn it_packs_what_it_unpacks() {
        for byte in 0..=255u8 {
            assert_eq!(RECORD_FLAGS.pack(RECORD_FLAGS.unpack(byte)).unwrap(), byte);
        }
    }

    #[test]
    fn it_rejects_values_wider_than_their_field() {
        match RECORD_FLAGS.pack([1, 0, 0, 4, 0, 0, 1]) {
            Err(EncodeError::FieldOutOfRange { field, value, max }) => {
                assert_eq!(field, "RPP");
                assert_eq!(value, 4);
                assert_eq!(max, 3);
            }
            result => panic!("unexpected result: {result:?}"),
        }
    }

    #[test]
    fn it_handles_a_single_full_width_field() {
        let layout = BitLayout::new([field("DIN", 8)]);
        assert_eq!(layout.pack([0xa5]).unwrap(), 0xa5);
        assert_eq!(layout.unpack(0xa5), [0xa5]);
    }
}
