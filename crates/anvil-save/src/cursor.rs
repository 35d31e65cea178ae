//! Bounds-checked forward reader over a byte slice
//!
//! Every variable-layout structure in a save file (node streams, region
//! scanning) is read through [`ByteCursor`]. Offsets reported in errors are
//! absolute: the cursor carries the offset of its slice within the enclosing
//! block so diagnostics point at real file positions.

use thiserror::Error;

/// Read past the end of the cursor's slice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("read of {needed} bytes at offset {offset} exceeds buffer ({available} bytes available)")]
pub struct CursorError {
    /// Absolute offset of the failed read
    pub offset: usize,
    /// Bytes requested
    pub needed: usize,
    /// Bytes left in the buffer
    pub available: usize,
}

/// Result type for cursor reads
pub type CursorResult<T> = Result<T, CursorError>;

/// Forward-only reader with an explicit position
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
    base: usize,
}

impl<'a> ByteCursor<'a> {
    /// Create a cursor over `data`, reporting offsets relative to the slice
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_base(data, 0)
    }

    /// Create a cursor whose slice starts at absolute offset `base`
    pub fn with_base(data: &'a [u8], base: usize) -> Self {
        Self { data, pos: 0, base }
    }

    /// Position relative to the start of the slice
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Absolute position (slice base + position)
    pub fn offset(&self) -> usize {
        self.base + self.pos
    }

    /// Bytes left to read
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Whether every byte has been consumed
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// A new cursor over the same slice, positioned at `pos`
    pub fn fork_at(&self, pos: usize) -> CursorResult<Self> {
        if pos > self.data.len() {
            return Err(CursorError {
                offset: self.base + pos,
                needed: 0,
                available: 0,
            });
        }
        Ok(Self {
            data: self.data,
            pos,
            base: self.base,
        })
    }

    fn peek(&self, len: usize) -> CursorResult<&'a [u8]> {
        if self.remaining() < len {
            return Err(self.short(len));
        }
        Ok(&self.data[self.pos..self.pos + len])
    }

    /// Consume `len` bytes
    pub fn read_bytes(&mut self, len: usize) -> CursorResult<&'a [u8]> {
        let bytes = self.peek(len)?;
        self.pos += len;
        Ok(bytes)
    }

    /// Consume a fixed-size array
    pub fn read_array<const N: usize>(&mut self) -> CursorResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    /// Consume one byte
    pub fn read_u8(&mut self) -> CursorResult<u8> {
        self.read_bytes(1).map(|b| b[0])
    }

    /// Consume a little-endian `u16`
    pub fn read_u16_le(&mut self) -> CursorResult<u16> {
        self.read_array::<2>().map(u16::from_le_bytes)
    }

    /// 24-bit little-endian value widened to `u32`
    pub fn read_u24_le(&mut self) -> CursorResult<u32> {
        let [a, b, c] = self.read_array::<3>()?;
        Ok(u32::from_le_bytes([a, b, c, 0]))
    }

    /// Consume a little-endian `u32`
    pub fn read_u32_le(&mut self) -> CursorResult<u32> {
        self.read_array::<4>().map(u32::from_le_bytes)
    }

    fn short(&self, needed: usize) -> CursorError {
        CursorError {
            offset: self.offset(),
            needed,
            available: self.remaining(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_little_endian_reads() {
        let data = [0x01, 0x39, 0x0E, 0x00, 0x00, 0x00, 0x80, 0x00];
        let mut cursor = ByteCursor::new(&data);
        assert_eq!(cursor.read_u8().unwrap(), 0x01);
        assert_eq!(cursor.read_u24_le().unwrap(), 0x0E39);
        assert_eq!(cursor.read_u32_le().unwrap(), 0x0080_0000);
        assert!(cursor.is_empty());
    }

    #[test]
    fn test_out_of_bounds_reports_absolute_offset() {
        let data = [0xAA, 0xBB];
        let mut cursor = ByteCursor::with_base(&data, 0x100);
        cursor.read_u8().unwrap();
        let err = cursor.read_u32_le().expect_err("only one byte left");
        assert_eq!(
            err,
            CursorError {
                offset: 0x101,
                needed: 4,
                available: 1,
            }
        );
        // A failed read does not move the cursor
        assert_eq!(cursor.position(), 1);
    }

    #[test]
    fn test_fork_is_independent() {
        let data = [1, 2, 3, 4];
        let mut cursor = ByteCursor::new(&data);
        cursor.read_bytes(3).unwrap();
        let mut fork = cursor.fork_at(1).unwrap();
        assert_eq!(fork.read_u8().unwrap(), 2);
        assert_eq!(cursor.read_u8().unwrap(), 4);
        assert!(cursor.fork_at(5).is_err());
    }

    #[test]
    fn test_short_array_read_leaves_position() {
        let data = [0x34, 0x12, 0x56];
        let mut cursor = ByteCursor::new(&data);
        assert_eq!(cursor.read_u16_le().unwrap(), 0x1234);
        assert!(cursor.read_array::<2>().is_err());
        assert_eq!(cursor.remaining(), 1);
        assert_eq!(cursor.read_array::<1>().unwrap(), [0x56]);
    }
}
