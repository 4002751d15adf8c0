pub mod bits;
pub mod crc;

use bytes::Buf;

use crate::{
    DecodeError,
    Layer,
};

/// A [`Buf`] over a byte slice that knows where it is in the packet.
///
/// Reads return [`DecodeError::Truncated`] instead of panicking, tagged with
/// the layer being decoded and the absolute offset in the packet.
#[derive(Clone, Copy, Debug)]
pub struct Cursor<'a> {
    bytes: &'a [u8],
    position: usize,
    base_offset: usize,
    layer: Layer,
}

impl<'a> Cursor<'a> {
    pub fn new(bytes: &'a [u8], layer: Layer) -> Self {
        Self {
            bytes,
            position: 0,
            base_offset: 0,
            layer,
        }
    }

    pub fn with_layer(mut self, layer: Layer) -> Self {
        self.layer = layer;
        self
    }

    /// Offset of the next byte, relative to the start of the packet.
    pub fn offset(&self) -> usize {
        self.base_offset + self.position
    }

    /// Number of bytes read so far.
    pub fn consumed(&self) -> usize {
        self.position
    }

    pub fn is_empty(&self) -> bool {
        self.position >= self.bytes.len()
    }

    /// The bytes not read yet.
    pub fn rest(&self) -> &'a [u8] {
        &self.bytes[self.position..]
    }

    pub fn truncated(&self, needed: usize) -> DecodeError {
        DecodeError::Truncated {
            layer: self.layer,
            offset: self.offset(),
            needed,
            available: self.remaining(),
        }
    }

    pub fn ensure(&self, needed: usize) -> Result<(), DecodeError> {
        if self.remaining() < needed {
            Err(self.truncated(needed))
        }
        else {
            Ok(())
        }
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        self.try_get_u8().map_err(|error| self.truncated(error.requested))
    }

    pub fn read_u16_le(&mut self) -> Result<u16, DecodeError> {
        self.try_get_u16_le().map_err(|error| self.truncated(error.requested))
    }

    pub fn read_u32_le(&mut self) -> Result<u32, DecodeError> {
        self.try_get_u32_le().map_err(|error| self.truncated(error.requested))
    }

    /// Reads a 3 byte little-endian integer.
    pub fn read_u24_le(&mut self) -> Result<u32, DecodeError> {
        let [b0, b1, b2] = self.read_array()?;
        Ok(u32::from_le_bytes([b0, b1, b2, 0]))
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut data = [0; N];
        self.try_copy_to_slice(&mut data[..])
            .map_err(|error| self.truncated(error.requested))?;
        Ok(data)
    }

    pub fn read_slice(&mut self, length: usize) -> Result<&'a [u8], DecodeError> {
        self.ensure(length)?;
        let slice = &self.bytes[self.position..self.position + length];
        self.position += length;
        Ok(slice)
    }

    /// Splits off the next `length` bytes into their own cursor.
    ///
    /// The returned cursor keeps absolute offsets and reports errors for
    /// `layer`. This cursor is advanced past the split off bytes.
    pub fn split(&mut self, length: usize, layer: Layer) -> Result<Cursor<'a>, DecodeError> {
        let base_offset = self.offset();
        let bytes = self.read_slice(length)?;
        Ok(Cursor {
            bytes,
            position: 0,
            base_offset,
            layer,
        })
    }
}

impl Buf for Cursor<'_> {
    fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.position)
    }

    fn chunk(&self) -> &[u8] {
        self.rest()
    }

    fn advance(&mut self, cnt: usize) {
        assert!(
            cnt <= self.remaining(),
            "cannot advance past the end of the cursor"
        );
        self.position += cnt;
    }
}

/// Writes the lower 3 bytes of `value`, little-endian.
pub(crate) fn put_u24_le<B: bytes::BufMut>(buffer: &mut B, value: u32) {
    buffer.put_slice(&value.to_le_bytes()[..3]);
}

#[cfg(test)]
mod tests {
    use bytes::Buf;

    use super::Cursor;
    use crate::{
        DecodeError,
        Layer,
    };

    #[test]
    fn it_reads_little_endian() {
        let bytes = [0x18, 0x00, 0xb0, 0x09, 0x02, 0x00, 0x01, 0x00, 0x00];
        let mut cursor = Cursor::new(&bytes, Layer::Record);
        assert_eq!(cursor.read_u16_le().unwrap(), 24);
        assert_eq!(cursor.read_u32_le().unwrap(), 133552);
        assert_eq!(cursor.read_u24_le().unwrap(), 1);
        assert!(cursor.is_empty());
    }

    #[test]
    fn it_reports_truncation_with_offset() {
        let bytes = [0x01, 0x02, 0x03];
        let mut cursor = Cursor::new(&bytes, Layer::Frame);
        cursor.advance(2);
        match cursor.read_u16_le() {
            Err(DecodeError::Truncated {
                layer,
                offset,
                needed,
                available,
            }) => {
                assert_eq!(layer, Layer::Frame);
                assert_eq!(offset, 2);
                assert_eq!(needed, 2);
                assert_eq!(available, 1);
            }
            result => panic!("unexpected result: {result:?}"),
        }
        // a failed read doesn't consume anything
        assert_eq!(cursor.read_u8().unwrap(), 0x03);
    }

    #[test]
    fn split_keeps_absolute_offsets() {
        let bytes = [0u8; 10];
        let mut cursor = Cursor::new(&bytes, Layer::Frame);
        cursor.advance(3);
        let mut inner = cursor.split(4, Layer::Subrecord).unwrap();
        assert_eq!(cursor.offset(), 7);
        assert_eq!(inner.offset(), 3);
        inner.advance(4);
        match inner.read_u8() {
            Err(DecodeError::Truncated { layer, offset, .. }) => {
                assert_eq!(layer, Layer::Subrecord);
                assert_eq!(offset, 7);
            }
            result => panic!("unexpected result: {result:?}"),
        }
    }
}
