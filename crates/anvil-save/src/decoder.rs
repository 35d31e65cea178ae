//! Whole-file decoding

use crate::codec::{Decompressor, StoredCodec};
use crate::config::DecoderConfig;
use crate::container::BlockTable;
use crate::dispatch::{self, BlockDispatcher};
use crate::error::{DecodeError, DecodeResult};
use crate::full::{EnvelopeDecoder, FullFormatDecoder};
use crate::graph::{Diagnostic, DiagnosticKind, ObjectGraph, Severity};
use crate::registry::TypeRegistry;
use tracing::{debug, warn};

/// Save file decoder
///
/// Holds the registry and the pluggable collaborators. Decoding never
/// mutates the decoder, so one instance can decode any number of files,
/// from any number of threads.
///
/// ```no_run
/// use anvil_save::{DecoderConfig, SaveDecoder, TypeRegistry};
///
/// let registry = TypeRegistry::load_from_file("tables.json")?;
/// let decoder = SaveDecoder::new(&registry)
///     .with_config(DecoderConfig::default().with_verify_checksums(false));
/// let graph = decoder.decode(&std::fs::read("OPTIONS.SAV")?)?;
/// println!("{}", graph.to_json_pretty()?);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct SaveDecoder<'r> {
    registry: &'r TypeRegistry,
    config: DecoderConfig,
    codec: Box<dyn Decompressor>,
    full: Box<dyn FullFormatDecoder>,
}

impl<'r> SaveDecoder<'r> {
    /// Decoder with default configuration and collaborators
    pub fn new(registry: &'r TypeRegistry) -> Self {
        Self {
            registry,
            config: DecoderConfig::default(),
            codec: Box::new(StoredCodec),
            full: Box::new(EnvelopeDecoder),
        }
    }

    /// Replace the configuration
    pub fn with_config(mut self, config: DecoderConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the decompressor used for compressed full-format payloads
    pub fn with_decompressor(mut self, codec: Box<dyn Decompressor>) -> Self {
        self.codec = codec;
        self
    }

    /// Replace the full-format object decoder
    pub fn with_full_format_decoder(mut self, full: Box<dyn FullFormatDecoder>) -> Self {
        self.full = full;
        self
    }

    /// Active configuration
    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Decode a save file
    ///
    /// Only an invalid configuration or a corrupt outer block table fail
    /// the call. Everything else is recorded in
    /// [`ObjectGraph::diagnostics`] next to whatever could be decoded.
    pub fn decode(&self, file: &[u8]) -> DecodeResult<ObjectGraph> {
        self.config.validate().map_err(DecodeError::InvalidConfig)?;

        let table = BlockTable::parse(file)?;
        debug!(
            "Save file: {} bytes, {} blocks",
            file.len(),
            table.blocks.len()
        );

        let dispatcher =
            BlockDispatcher::new(self.registry, &self.config, &*self.codec, &*self.full);
        let outcomes = table
            .blocks
            .iter()
            .map(|block| dispatcher.dispatch(block))
            .collect();

        let mut graph = dispatch::merge(outcomes, &table.blocks, &self.config);

        if table.trailing > 0 {
            let offset = file.len() - table.trailing;
            warn!("{} trailing bytes after the last block", table.trailing);
            graph.diagnostics.push(Diagnostic {
                block: None,
                region: None,
                offset: Some(offset),
                severity: Severity::Warning,
                kind: DiagnosticKind::TrailingData,
                message: format!("{} bytes follow the last block", table.trailing),
            });
        }

        debug!(
            "Decoded {} objects, {} cross-block references, {} diagnostics",
            graph.objects.len(),
            graph.cross_references.len(),
            graph.diagnostics.len()
        );

        Ok(graph)
    }
}

impl std::fmt::Debug for SaveDecoder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaveDecoder")
            .field("registry_entries", &self.registry.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
