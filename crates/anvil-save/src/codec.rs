//! Block decompression seam
//!
//! Compressed full-format payloads are handed to a [`Decompressor`]. The
//! crate ships only [`StoredCodec`], which accepts payloads that are already
//! at their decompressed size; an LZSS-family codec for retail saves is
//! supplied by the caller.

use thiserror::Error;

/// Decompression errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The codec cannot expand this payload
    #[error("unsupported compressed payload: {compressed} bytes expanding to {expected}")]
    Unsupported {
        /// Stored size
        compressed: usize,
        /// Expected decompressed size
        expected: usize,
    },

    /// Output length differs from the header's decompressed size
    #[error("decompressed size mismatch: expected {expected}, got {actual}")]
    SizeMismatch {
        /// Size from the block header
        expected: usize,
        /// Size produced
        actual: usize,
    },

    /// Malformed compressed stream
    #[error("decompression failed: {0}")]
    Failed(String),
}

/// Result type for codec operations
pub type CodecResult<T> = Result<T, CodecError>;

/// Expands a compressed block payload
pub trait Decompressor: Send + Sync {
    /// Decompress `data` into exactly `expected_len` bytes
    fn decompress(&self, data: &[u8], expected_len: usize) -> CodecResult<Vec<u8>>;
}

/// Passthrough codec for payloads that are stored uncompressed
#[derive(Debug, Clone, Copy, Default)]
pub struct StoredCodec;

impl Decompressor for StoredCodec {
    fn decompress(&self, data: &[u8], expected_len: usize) -> CodecResult<Vec<u8>> {
        if data.len() == expected_len {
            Ok(data.to_vec())
        } else {
            Err(CodecError::Unsupported {
                compressed: data.len(),
                expected: expected_len,
            })
        }
    }
}

/// Run `codec` and check the output length
pub fn decompress_checked(
    codec: &dyn Decompressor,
    data: &[u8],
    expected_len: usize,
) -> CodecResult<Vec<u8>> {
    let output = codec.decompress(data, expected_len)?;
    if output.len() != expected_len {
        return Err(CodecError::SizeMismatch {
            expected: expected_len,
            actual: output.len(),
        });
    }
    Ok(output)
}
