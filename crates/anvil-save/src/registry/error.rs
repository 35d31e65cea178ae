//! Type registry error types

use std::path::PathBuf;
use thiserror::Error;

/// Registry loading and lookup errors
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Table word does not map to a populated registry slot
    #[error("unknown table id 0x{word:X} (bucket {bucket}, entry 0x{entry:04X})")]
    UnknownTableId {
        /// Table descriptor word as read from the stream
        word: u32,
        /// Bucket index derived from the word
        bucket: u32,
        /// Entry index derived from the word
        entry: u32,
    },

    /// Descriptor is structurally invalid
    #[error("invalid registry descriptor: {0}")]
    InvalidDescriptor(String),

    /// Two descriptor records claim the same table id
    #[error("duplicate registry entry for table id 0x{0:X}")]
    DuplicateTableId(u32),

    /// Descriptor file could not be read
    #[error("failed to load registry from {path}: {source}")]
    LoadFailed {
        /// Path of the descriptor file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// JSON descriptor could not be parsed
    #[error("invalid JSON registry descriptor: {0}")]
    Json(#[from] serde_json::Error),

    /// Binary descriptor could not be parsed
    #[error("binary parsing error: {0}")]
    BinRw(#[from] binrw::Error),
}

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;
