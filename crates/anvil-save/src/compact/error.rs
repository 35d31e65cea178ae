//! Compact-format error types

use crate::cursor::CursorError;
use thiserror::Error;

/// Errors raised while decoding a node stream
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeDecodeError {
    /// Tag byte has no canonical meaning after normalization
    #[error("unknown node tag 0x{normalized:02X} (raw 0x{raw:02X}) at offset {offset}")]
    UnknownTag {
        /// Offset of the node prefix
        offset: usize,
        /// Tag byte as read
        raw: u8,
        /// Tag byte after normalization
        normalized: u8,
    },

    /// Normalization did not reach a canonical tag within the pass limit
    #[error("tag 0x{raw:02X} at offset {offset} still not canonical after {passes} normalization passes")]
    NormalizationLoop {
        /// Offset of the node prefix
        offset: usize,
        /// Tag byte as read
        raw: u8,
        /// Passes applied
        passes: u8,
    },

    /// Composite nesting exceeded the configured depth
    #[error("node nesting exceeds depth limit {depth} at offset {offset}")]
    RecursionLimit {
        /// Offset of the node that would exceed the limit
        offset: usize,
        /// Configured depth limit
        depth: usize,
    },

    /// Region materialized more nodes than the configured budget
    #[error("node budget of {limit} exhausted at offset {offset}")]
    NodeBudget {
        /// Offset of the node that exceeded the budget
        offset: usize,
        /// Configured budget
        limit: usize,
    },

    /// Indirect node points at an invalid target
    #[error("indirect node at offset {offset} has invalid target {target}: {reason}")]
    IndirectTarget {
        /// Offset of the indirect node
        offset: usize,
        /// Target offset, relative to the region start
        target: usize,
        /// Why the target was rejected
        reason: &'static str,
    },

    /// Node payload runs past the end of the region
    #[error("truncated node: {0}")]
    Truncated(#[from] CursorError),
}

/// Result type for node decoding
pub type NodeResult<T> = Result<T, NodeDecodeError>;

/// Errors raised while framing regions within a compact block
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegionFramingError {
    /// Gap terminator is not `0x0020`
    #[error("gap at offset {offset} has terminator 0x{found:04X}, expected 0x0020")]
    GapTerminator {
        /// Offset of the gap
        offset: usize,
        /// Terminator found
        found: u16,
    },

    /// No boundary found within the lookahead window past the declared end
    #[error(
        "region {region} declared {declared} bytes but no boundary follows offset {offset} within {window} bytes"
    )]
    Unterminated {
        /// Region index
        region: usize,
        /// Declared end of the region
        offset: usize,
        /// Declared size
        declared: u32,
        /// Lookahead window searched
        window: usize,
    },

    /// Declared size runs past the end of the block
    #[error("region {region} declared {declared} bytes but only {available} remain")]
    Truncated {
        /// Region index
        region: usize,
        /// Declared size
        declared: u32,
        /// Bytes left in the block
        available: usize,
    },

    /// Sub-header following a gap is malformed
    #[error("invalid region sub-header at offset {offset}: {reason}")]
    SubHeader {
        /// Offset of the sub-header
        offset: usize,
        /// What was wrong with it
        reason: String,
    },
}

/// Errors that abort decoding of a whole compact block
#[derive(Debug, Error)]
pub enum CompactError {
    /// Header version byte is not 1
    #[error("unknown compact format version {0}")]
    UnknownVersion(u8),

    /// Header flags are not `0x00800000`
    #[error("invalid compact header flags 0x{0:08X}")]
    InvalidFlags(u32),

    /// Block is shorter than the 8-byte header
    #[error("compact block of {0} bytes is too short for its header")]
    HeaderTruncated(usize),

    /// Regions could not be framed
    #[error("region framing failed: {0}")]
    Framing(#[from] RegionFramingError),

    /// Structure parsing failed
    #[error("binary parsing error: {0}")]
    BinRw(#[from] binrw::Error),
}

/// Result type for compact block decoding
pub type CompactResult<T> = Result<T, CompactError>;
