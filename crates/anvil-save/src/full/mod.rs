//! Full-format block handling
//!
//! Full-format blocks carry a 44-byte header, an optionally compressed
//! payload and objects addressed by 4-byte type hashes. This module unpacks
//! the header and payload and defines the [`FullFormatDecoder`] seam through
//! which object deserialization is plugged in. The bundled
//! [`EnvelopeDecoder`] decodes only the root object envelope.

pub mod error;
pub mod header;
pub mod type_ref;

pub use error::{FullFormatError, FullFormatResult};
pub use header::{FULL_HEADER_SIZE, FullFormatHeader};
pub use type_ref::TypeRef;

use crate::codec::{Decompressor, decompress_checked};
use crate::config::DecoderConfig;
use crate::cursor::ByteCursor;
use crate::graph::{DecodedObject, Diagnostic, DiagnosticKind, ObjectFormat};
use crate::registry::TypeRegistry;
use std::borrow::Cow;
use tracing::{debug, warn};

/// Header and decompressed payload of a full-format block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnpackedBlock<'a> {
    /// Block header
    pub header: FullFormatHeader,
    /// Payload after decompression
    pub payload: Cow<'a, [u8]>,
    /// Checksum verdict, `None` when verification is disabled
    pub checksum_valid: Option<bool>,
}

/// Parse the header, verify the checksum and decompress the payload
pub fn unpack<'a>(
    data: &'a [u8],
    config: &DecoderConfig,
    codec: &dyn Decompressor,
) -> FullFormatResult<UnpackedBlock<'a>> {
    let header = FullFormatHeader::parse(data, config.full_format_magic)?;
    let stored = header.payload(data)?;

    let checksum_valid = config
        .verify_checksums
        .then(|| header.verify_checksum(stored));

    let payload = if header.is_compressed() {
        Cow::Owned(decompress_checked(
            codec,
            stored,
            header.decompressed_size as usize,
        )?)
    } else {
        Cow::Borrowed(stored)
    };

    Ok(UnpackedBlock {
        header,
        payload,
        checksum_valid,
    })
}

/// Object decoded from a full-format payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FullFormatOutput {
    /// Decoded object
    pub object: DecodedObject,
    /// Problems that did not prevent decoding
    pub warnings: Vec<Diagnostic>,
}

/// Deserializes the payload of a full-format block
pub trait FullFormatDecoder: Send + Sync {
    /// Decode the decompressed payload of block `block`
    fn decode(
        &self,
        block: usize,
        payload: &[u8],
        registry: &TypeRegistry,
        config: &DecoderConfig,
    ) -> FullFormatResult<FullFormatOutput>;
}

/// Decodes the root type reference and object id, leaving the body opaque
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvelopeDecoder;

impl FullFormatDecoder for EnvelopeDecoder {
    fn decode(
        &self,
        block: usize,
        payload: &[u8],
        registry: &TypeRegistry,
        config: &DecoderConfig,
    ) -> FullFormatResult<FullFormatOutput> {
        let mut cursor = ByteCursor::new(payload);
        let root = TypeRef::read(&mut cursor, config.max_node_depth)?;
        if let TypeRef::BackReference(id) = root.innermost() {
            return Err(FullFormatError::RootBackReference(*id));
        }

        let mut object = DecodedObject::new(block, ObjectFormat::Full);
        object.object_id = cursor.read_u32_le()?;
        object.type_hash = root.type_hash();
        object.unparsed_len = cursor.remaining();

        let mut warnings = Vec::new();
        if let Some(hash) = object.type_hash
            && !registry.contains_type_hash(hash)
        {
            warn!("Block {}: type hash 0x{:08X} not in registry", block, hash);
            warnings.push(
                Diagnostic::warning(
                    block,
                    DiagnosticKind::FullFormat,
                    format!("type hash 0x{hash:08X} is not in the registry"),
                )
                .at(FULL_HEADER_SIZE),
            );
        }

        debug!(
            "Full-format block {}: object 0x{:08X}, {} bytes opaque",
            block, object.object_id, object.unparsed_len
        );

        Ok(FullFormatOutput { object, warnings })
    }
}
