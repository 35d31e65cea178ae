//! Node tags and tag normalization
//!
//! Every node starts with a two-byte prefix `[tag][param]`. Raw tags in
//! `0x0B..=0x1C` that are not themselves canonical are aliases that rewrite
//! onto other tags, sometimes through several hops:
//!
//! | raw  | rewrites to                         |
//! |------|-------------------------------------|
//! | 0x0B | 0x15                                |
//! | 0x0C | 0x16                                |
//! | 0x0D | indirect, index = param             |
//! | 0x0E | 0x18                                |
//! | 0x0F | 0x19                                |
//! | 0x10 | 0x0E                                |
//! | 0x11 | 0x1A                                |
//! | 0x12 | 0x0A                                |
//! | 0x13 | indirect, u16 index after prefix    |
//! | 0x14 | 0x0B                                |
//! | 0x17 | 0x11                                |
//! | 0x1B | 0x0C                                |
//! | 0x1C | 0x1B with param & 0x7F, when param & 0x80 ("shrink") |
//!
//! Two prefixes are primitives recognised before any rewriting: `08 03`
//! (table reference) and `15 00` / `12 00` (fixed 32-bit values).

use super::error::{NodeDecodeError, NodeResult};
use serde::Serialize;

/// Second prefix byte of a table reference
pub const TABLE_REF_PARAM: u8 = 0x03;

/// Tag byte of a table reference and of the null leaf
pub const TABLE_REF_TAG: u8 = 0x08;

/// Param bit selecting the shrink rewrite of tag 0x1C
const SHRINK_BIT: u8 = 0x80;

/// Canonical node shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum CanonicalTag {
    /// Branch with an 8-bit presence bitmap
    Bitmap8 = 0x01,
    /// Branch with a 16-bit presence bitmap
    Bitmap16 = 0x02,
    /// Branch with a 32-bit presence bitmap
    Bitmap32 = 0x03,
    /// Branch with `param` key digits
    LinearBranch = 0x04,
    /// Branch with a 256-bit presence bitmap
    Bitmap256 = 0x06,
    /// Branch with `param` `{base, bitmap}` clusters
    ClusteredBranch = 0x07,
    /// Empty leaf
    NullLeaf = 0x08,
    /// Empty branch
    NullBranch = 0x09,
    /// Empty marker
    NullMarker = 0x0A,
    /// Leaf with 2-byte keys
    LinearLeaf2 = 0x15,
    /// Leaf with 3-byte keys
    LinearLeaf3 = 0x16,
    /// Leaf with one 1-byte key
    SingleEntry = 0x18,
    /// Leaf with one 3-byte key
    Single3 = 0x19,
    /// Leaf with keys and values stored in separate runs
    Packed3 = 0x1A,
    /// Leaf with length-prefixed values
    VariableSize = 0x1C,
}

impl CanonicalTag {
    /// Canonical tag for a byte, if it is one
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::Bitmap8),
            0x02 => Some(Self::Bitmap16),
            0x03 => Some(Self::Bitmap32),
            0x04 => Some(Self::LinearBranch),
            0x06 => Some(Self::Bitmap256),
            0x07 => Some(Self::ClusteredBranch),
            0x08 => Some(Self::NullLeaf),
            0x09 => Some(Self::NullBranch),
            0x0A => Some(Self::NullMarker),
            0x15 => Some(Self::LinearLeaf2),
            0x16 => Some(Self::LinearLeaf3),
            0x18 => Some(Self::SingleEntry),
            0x19 => Some(Self::Single3),
            0x1A => Some(Self::Packed3),
            0x1C => Some(Self::VariableSize),
            _ => None,
        }
    }

    /// Tag byte
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Whether the tag carries no payload
    pub fn is_null(self) -> bool {
        matches!(self, Self::NullLeaf | Self::NullBranch | Self::NullMarker)
    }

    /// Bitmap width in bytes for bitmap branches
    pub fn bitmap_len(self) -> Option<usize> {
        match self {
            Self::Bitmap8 => Some(1),
            Self::Bitmap16 => Some(2),
            Self::Bitmap32 => Some(4),
            Self::Bitmap256 => Some(32),
            _ => None,
        }
    }
}

/// How an indirect node encodes its target index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndirectIndex {
    /// Index is the prefix param byte
    Param,
    /// Index is a u16 following the prefix
    Wide,
}

/// Result of normalizing a raw prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeShape {
    /// Dispatch to a canonical shape
    Canonical(CanonicalTag),
    /// Back-reference to an earlier node in the region
    Indirect(IndirectIndex),
}

/// Normalized prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizedTag {
    /// Shape to dispatch to
    pub shape: NodeShape,
    /// Param after any rewriting
    pub param: u8,
    /// Rewrites applied
    pub passes: u8,
}

/// Fixed-value primitive kinds, named after their role in an object
/// descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FixedKind {
    /// `15 00 <u32>`
    ObjectId,
    /// `12 00 <u32>`
    FatherId,
}

impl FixedKind {
    /// Fixed-value primitive selected by a prefix
    pub fn from_prefix(tag: u8, param: u8) -> Option<Self> {
        match (tag, param) {
            (0x15, 0x00) => Some(Self::ObjectId),
            (0x12, 0x00) => Some(Self::FatherId),
            _ => None,
        }
    }

    /// Tag byte of the primitive's prefix
    pub fn tag(self) -> u8 {
        match self {
            Self::ObjectId => 0x15,
            Self::FatherId => 0x12,
        }
    }
}

/// Whether a prefix is a table reference
pub fn is_table_ref(tag: u8, param: u8) -> bool {
    tag == TABLE_REF_TAG && param == TABLE_REF_PARAM
}

/// Rewrite a raw prefix until it names a canonical or indirect shape
///
/// `offset` is only used for error reporting.
pub fn normalize(raw: u8, param: u8, max_passes: u8, offset: usize) -> NodeResult<NormalizedTag> {
    let mut tag = raw;
    let mut param = param;
    let mut passes = 0u8;

    loop {
        let shrink = tag == CanonicalTag::VariableSize.as_byte() && param & SHRINK_BIT != 0;
        if !shrink && let Some(canonical) = CanonicalTag::from_byte(tag) {
            return Ok(NormalizedTag {
                shape: NodeShape::Canonical(canonical),
                param,
                passes,
            });
        }

        let next = match tag {
            0x0B => 0x15,
            0x0C => 0x16,
            0x0D => {
                return Ok(NormalizedTag {
                    shape: NodeShape::Indirect(IndirectIndex::Param),
                    param,
                    passes,
                });
            }
            0x0E => 0x18,
            0x0F => 0x19,
            0x10 => 0x0E,
            0x11 => 0x1A,
            0x12 => 0x0A,
            0x13 => {
                return Ok(NormalizedTag {
                    shape: NodeShape::Indirect(IndirectIndex::Wide),
                    param,
                    passes,
                });
            }
            0x14 => 0x0B,
            0x17 => 0x11,
            0x1B => 0x0C,
            0x1C => {
                param &= !SHRINK_BIT;
                0x1B
            }
            _ => {
                return Err(NodeDecodeError::UnknownTag {
                    offset,
                    raw,
                    normalized: tag,
                });
            }
        };

        passes = passes.saturating_add(1);
        if passes > max_passes {
            return Err(NodeDecodeError::NormalizationLoop {
                offset,
                raw,
                passes: max_passes,
            });
        }
        tag = next;
    }
}
