//! Full-format error types

use crate::codec::CodecError;
use crate::cursor::CursorError;
use thiserror::Error;

/// Full-format block errors
#[derive(Debug, Error)]
pub enum FullFormatError {
    /// Block does not start with the full-format magic
    #[error("invalid full-format magic: expected 0x{expected:08X}, found 0x{found:08X}")]
    BadMagic {
        /// Configured magic
        expected: u32,
        /// Magic found
        found: u32,
    },

    /// Block is shorter than the 44-byte header
    #[error("full-format header truncated: {0} bytes")]
    HeaderTruncated(usize),

    /// Header size disagrees with the bytes present
    #[error("payload size mismatch: header declares {declared}, block holds {actual}")]
    PayloadSize {
        /// Compressed size from the header
        declared: usize,
        /// Bytes after the header
        actual: usize,
    },

    /// Root object is a back-reference, which has nothing to refer to
    #[error("root type reference is a back-reference to id {0}")]
    RootBackReference(u8),

    /// Nested type-reference prefixes exceed the depth limit
    #[error("type reference nesting exceeds {0}")]
    RecursionLimit(usize),

    /// Payload ended inside a structure
    #[error("truncated payload: {0}")]
    Truncated(#[from] CursorError),

    /// Payload could not be decompressed
    #[error("decompression error: {0}")]
    Codec(#[from] CodecError),

    /// Header parsing failed
    #[error("binary parsing error: {0}")]
    BinRw(#[from] binrw::Error),
}

/// Result type for full-format operations
pub type FullFormatResult<T> = Result<T, FullFormatError>;
