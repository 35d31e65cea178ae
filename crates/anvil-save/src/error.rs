//! File-level error types

use thiserror::Error;

/// Corruption of the outer file header or block table
///
/// Fatal to the whole decode: without a sound block table no block can be
/// located.
#[derive(Debug, Error)]
pub enum FramingError {
    /// File is shorter than the outer header
    #[error("file of {0} bytes is too short for the save header")]
    HeaderTruncated(usize),

    /// Header signature or magic mismatch
    #[error("invalid save header: signature 0x{signature:02X}, magic 0x{magic:08X}")]
    InvalidMagic {
        /// Signature byte found
        signature: u8,
        /// Magic found
        magic: u32,
    },

    /// Block size prefix is cut off
    #[error("block {index} size prefix at offset {offset} is truncated")]
    TruncatedBlockTable {
        /// Block index
        index: usize,
        /// Offset of the size prefix
        offset: usize,
    },

    /// Block extends past the end of the file
    #[error("block {index} at offset {offset} declares {size} bytes but only {available} remain")]
    BlockOverrun {
        /// Block index
        index: usize,
        /// Offset of the block data
        offset: usize,
        /// Declared size
        size: usize,
        /// Bytes left in the file
        available: usize,
    },

    /// Header parsing failed
    #[error("binary parsing error: {0}")]
    BinRw(#[from] binrw::Error),
}

/// Errors returned by [`crate::decode`]
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Outer framing is corrupt
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),

    /// Decoder configuration is invalid
    #[error("invalid decoder configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for whole-file decoding
pub type DecodeResult<T> = Result<T, DecodeError>;
