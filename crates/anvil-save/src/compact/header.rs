//! Compact block header, region sub-headers and inter-region gaps

use super::error::{CompactError, CompactResult, RegionFramingError};
use binrw::BinRead;
use binrw::io::Cursor;
use serde::Serialize;

/// Only compact format version observed in retail saves
pub const COMPACT_VERSION: u8 = 1;

/// Flags word carried by every compact header and sub-header
pub const COMPACT_FLAGS: u32 = 0x0080_0000;

/// Size of a compact header or region sub-header
pub const COMPACT_HEADER_SIZE: usize = 8;

/// Size of an inter-region gap
pub const GAP_SIZE: usize = 5;

/// Literal value closing every gap
pub const GAP_TERMINATOR: u16 = 0x0020;

/// `flags` as it appears on disk
const FLAGS_BYTES: [u8; 4] = COMPACT_FLAGS.to_le_bytes();

/// Compact block header, also used verbatim as the region sub-header
///
/// ```text
/// 01 39 0E 00 00 00 80 00
/// ^^ version
///    ^^^^^^^^ declared size (u24 LE) = 0x0E39
///             ^^^^^^^^^^^ flags (u32 LE) = 0x00800000
/// ```
#[derive(BinRead, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[br(little)]
pub struct CompactHeader {
    /// Format version
    pub version: u8,
    /// Declared size of the region that follows (24 bits)
    #[br(map = |x: [u8; 3]| u32::from_le_bytes([x[0], x[1], x[2], 0]))]
    pub declared_size: u32,
    /// Flags, always `0x00800000`
    pub flags: u32,
}

impl CompactHeader {
    /// Read the header fields without validating them
    pub fn read_raw(data: &[u8]) -> CompactResult<Self> {
        if data.len() < COMPACT_HEADER_SIZE {
            return Err(CompactError::HeaderTruncated(data.len()));
        }
        Ok(Self::read(&mut Cursor::new(&data[..COMPACT_HEADER_SIZE]))?)
    }

    /// Read and validate a block header
    pub fn parse(data: &[u8]) -> CompactResult<Self> {
        let header = Self::read_raw(data)?;
        header.validate()?;
        Ok(header)
    }

    /// Check version and flags
    pub fn validate(&self) -> CompactResult<()> {
        if self.version != COMPACT_VERSION {
            return Err(CompactError::UnknownVersion(self.version));
        }
        if self.flags != COMPACT_FLAGS {
            return Err(CompactError::InvalidFlags(self.flags));
        }
        Ok(())
    }

    /// Whether the bytes at `pos` look like a region sub-header
    pub fn is_sub_header_at(data: &[u8], pos: usize) -> bool {
        pos.checked_add(COMPACT_HEADER_SIZE)
            .and_then(|end| data.get(pos..end))
            .is_some_and(|h| h[0] == COMPACT_VERSION && h[4..8] == FLAGS_BYTES)
    }

    /// Whether a block carries the compact flags word at bytes 4..8
    pub fn has_compact_flags(data: &[u8]) -> bool {
        data.get(4..8).is_some_and(|f| f == FLAGS_BYTES)
    }

    /// Read a sub-header at `pos` in `block`
    pub(crate) fn read_sub_header(block: &[u8], pos: usize) -> Result<Self, RegionFramingError> {
        if !Self::is_sub_header_at(block, pos) {
            return Err(RegionFramingError::SubHeader {
                offset: pos,
                reason: "expected version 1 and flags 0x00800000".to_string(),
            });
        }
        Self::read_raw(&block[pos..]).map_err(|e| RegionFramingError::SubHeader {
            offset: pos,
            reason: e.to_string(),
        })
    }
}

/// Five-byte separator between regions
#[derive(BinRead, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[br(little)]
pub struct Gap {
    /// Separator type byte
    pub type_tag: u8,
    /// Separator value
    pub value: u16,
    /// Always `0x0020`
    pub terminator: u16,
}

impl Gap {
    /// Read a gap at `pos`, or `None` if fewer than 5 bytes remain
    pub fn read_at(data: &[u8], pos: usize) -> Option<Self> {
        let bytes = data.get(pos..pos.checked_add(GAP_SIZE)?)?;
        Self::read(&mut Cursor::new(bytes)).ok()
    }

    /// Whether the terminator is the expected literal
    pub fn is_terminated(&self) -> bool {
        self.terminator == GAP_TERMINATOR
    }

    /// Reject a gap whose terminator is wrong
    pub fn check(&self, offset: usize) -> Result<(), RegionFramingError> {
        if self.is_terminated() {
            Ok(())
        } else {
            Err(RegionFramingError::GapTerminator {
                offset,
                found: self.terminator,
            })
        }
    }
}
