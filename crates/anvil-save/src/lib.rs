//! Decoder for Anvil engine save files
//!
#![allow(clippy::cast_possible_truncation)] // Intentional for binary format parsing
#![allow(clippy::cast_possible_wrap)] // Intentional for binary operations
#![allow(clippy::cast_lossless)] // Sometimes clearer than From
#![allow(clippy::uninlined_format_args)] // Backwards compatibility
#![allow(clippy::doc_markdown)] // Format terms don't need backticks
#![allow(clippy::module_name_repetitions)] // Clear naming is preferred
#![allow(clippy::similar_names)] // Domain-specific naming patterns
#![allow(clippy::needless_pass_by_value)] // Configuration types
#![allow(clippy::redundant_clone)] // Binary format handling
#![allow(clippy::unused_self)] // Decoder methods keep a uniform shape
#![allow(clippy::map_unwrap_or)] // Binary format patterns
#![allow(clippy::redundant_closure)] // Test setup
#![allow(clippy::derive_partial_eq_without_eq)] // Binary format structs
#![allow(clippy::redundant_closure_for_method_calls)] // Iterator chains
#![allow(clippy::unnecessary_wraps)] // Uniform decoder signatures
#![allow(clippy::return_self_not_must_use)] // Builder patterns
#![allow(clippy::use_self)] // Type clarity
#![allow(clippy::clone_on_copy)] // Binary format handling
//! A save file is a sequence of independently framed blocks carrying two
//! incompatible encodings:
//!
//! - **Full format**: a 44-byte header, an optionally compressed payload and
//!   objects addressed by 4-byte type hashes
//! - **Compact format**: small uncompressed blocks that address types by
//!   1-byte table id and store properties as sparse-array ("Judy") nodes,
//!   split into regions whose measured size may differ from the declared one
//!
//! [`decode`] recognises both, decodes what it can and returns a uniform
//! [`ObjectGraph`]. Only a corrupt outer block table fails the call; every
//! other problem becomes a [`Diagnostic`] attributed to its block, region
//! and offset.
//!
//! # Example
//!
//! ```
//! use anvil_save::{TypeRegistry, decode};
//!
//! let registry = TypeRegistry::from_json_str(
//!     r#"{"tables": [{"table_id": 94, "type_hash": "0DEBED19", "property_count": 4}]}"#,
//! )?;
//!
//! // Header, one empty block
//! let file = [0x16, 0xAC, 0xDB, 0xFE, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
//! let graph = decode(&file, &registry)?;
//! assert_eq!(graph.blocks.len(), 1);
//! assert!(graph.objects.is_empty());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Compressed full-format payloads and object bodies are decoded through the
//! [`Decompressor`] and [`FullFormatDecoder`] seams, configured on a
//! [`SaveDecoder`].

#![warn(missing_docs)]

pub mod codec;
/// Compact-format blocks: header, region framing, node decoding
pub mod compact;
pub mod config;
pub mod container;
pub mod cursor;
pub mod decoder;
pub mod dispatch;
pub mod error;
pub mod full;
pub mod graph;
/// Type registry and table-id resolution
pub mod registry;

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
pub(crate) mod test_utils;

pub use codec::{CodecError, Decompressor, StoredCodec};
pub use compact::{CompactBlockDecoder, Node, NodeDecoder, PropertyRef, RegionFramer, RegionKind};
pub use config::DecoderConfig;
pub use decoder::SaveDecoder;
pub use dispatch::{BlockDispatcher, BlockKind};
pub use error::{DecodeError, DecodeResult, FramingError};
pub use full::{EnvelopeDecoder, FullFormatDecoder, TypeRef};
pub use graph::{
    CrossReference, DecodedObject, Diagnostic, DiagnosticKind, GraphSummary, ObjectGraph,
    Severity,
};
pub use registry::{TableResolver, TypeRegistry, TypeTableEntry};

/// Decode a save file with the default configuration and collaborators
pub fn decode(file: &[u8], registry: &TypeRegistry) -> DecodeResult<ObjectGraph> {
    SaveDecoder::new(registry).decode(file)
}
