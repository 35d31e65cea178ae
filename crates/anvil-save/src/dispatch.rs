//! Block classification, routing and merging
//!
//! Every block is classified from its first eight bytes and handed to the
//! matching decoder. Blocks nobody recognises are passed through as raw
//! copies. Once all blocks are decoded, cross-block references are resolved
//! against the sizes of their siblings.

use crate::codec::Decompressor;
use crate::compact::{CompactBlockDecoder, CompactError, CompactHeader, PendingCrossRef};
use crate::config::DecoderConfig;
use crate::container::RawBlock;
use crate::full::{self, FULL_HEADER_SIZE, FullFormatDecoder, FullFormatError, FullFormatHeader};
use crate::graph::{
    BlockSummary, CrossReference, CrossReferenceTarget, DecodedObject, Diagnostic,
    DiagnosticKind, GraphSummary, ObjectGraph, SizeMatch,
};
use crate::registry::TypeRegistry;
use serde::Serialize;
use std::ops::Range;
use tracing::{debug, trace, warn};

/// Encoding of a block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    /// Not yet classified
    #[default]
    Unknown,
    /// Header-bearing, type-hash addressed block
    FullFormat,
    /// Table-id addressed sparse-array block
    Compact,
    /// Opaque block passed through untouched
    RawCopy,
}

impl BlockKind {
    /// Classify a block from its leading bytes
    pub fn classify(data: &[u8], full_format_magic: u32) -> Self {
        if data.len() < 8 {
            return Self::RawCopy;
        }
        if CompactHeader::has_compact_flags(data) {
            return Self::Compact;
        }
        if u32::from_le_bytes([data[0], data[1], data[2], data[3]]) == full_format_magic {
            return Self::FullFormat;
        }
        Self::RawCopy
    }
}

/// Sizes a cross-block reference may match
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSizes {
    /// Size in the outer block table
    pub stored: usize,
    /// Full-format payload location within the block
    pub payload: Option<Range<usize>>,
    /// Full-format decompressed size
    pub decompressed: Option<usize>,
}

impl BlockSizes {
    /// Which size equals `declared`, preferring the stored size
    pub fn matches(&self, declared: usize) -> Option<SizeMatch> {
        if self.stored == declared {
            Some(SizeMatch::Stored)
        } else if self.payload.as_ref().is_some_and(|p| p.len() == declared) {
            Some(SizeMatch::Payload)
        } else if self.decompressed == Some(declared) {
            Some(SizeMatch::Decompressed)
        } else {
            None
        }
    }

    /// Stored bytes a descriptor checksum covers for a given match
    fn checksummed<'a>(&self, data: &'a [u8], matched: SizeMatch) -> &'a [u8] {
        match (matched, &self.payload) {
            (SizeMatch::Payload | SizeMatch::Decompressed, Some(range)) => &data[range.clone()],
            _ => data,
        }
    }
}

/// Result of dispatching one block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockOutcome {
    /// Block index
    pub index: usize,
    /// Offset of the block data within the file
    pub offset: usize,
    /// Classification
    pub kind: BlockKind,
    /// Sizes for cross-block matching
    pub sizes: BlockSizes,
    /// Decoded object, if the block produced one
    pub object: Option<DecodedObject>,
    /// Cross-block references awaiting resolution
    pub cross_refs: Vec<PendingCrossRef>,
    /// Block-scoped problems
    pub diagnostics: Vec<Diagnostic>,
}

impl BlockOutcome {
    fn new(block: &RawBlock<'_>) -> Self {
        Self {
            index: block.index,
            offset: block.offset,
            kind: BlockKind::Unknown,
            sizes: BlockSizes {
                stored: block.data.len(),
                payload: None,
                decompressed: None,
            },
            object: None,
            cross_refs: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    fn record_sizes(&mut self, header: &FullFormatHeader) {
        let end = (FULL_HEADER_SIZE + header.compressed_size as usize).min(self.sizes.stored);
        self.sizes.payload = Some(FULL_HEADER_SIZE..end);
        self.sizes.decompressed = Some(header.decompressed_size as usize);
    }

    /// Summary for the object graph
    pub fn summary(&self) -> BlockSummary {
        BlockSummary {
            index: self.index,
            offset: self.offset,
            size: self.sizes.stored,
            kind: self.kind,
            decoded: self.object.is_some(),
        }
    }
}

/// Routes blocks to the compact or full-format decoder
pub struct BlockDispatcher<'a> {
    registry: &'a TypeRegistry,
    config: &'a DecoderConfig,
    compact: CompactBlockDecoder<'a>,
    codec: &'a dyn Decompressor,
    full: &'a dyn FullFormatDecoder,
}

impl<'a> BlockDispatcher<'a> {
    /// Create a dispatcher
    pub fn new(
        registry: &'a TypeRegistry,
        config: &'a DecoderConfig,
        codec: &'a dyn Decompressor,
        full: &'a dyn FullFormatDecoder,
    ) -> Self {
        Self {
            registry,
            config,
            compact: CompactBlockDecoder::new(registry, config),
            codec,
            full,
        }
    }

    /// Classify and decode one block
    pub fn dispatch(&self, block: &RawBlock<'_>) -> BlockOutcome {
        let mut outcome = BlockOutcome::new(block);
        outcome.kind = BlockKind::classify(block.data, self.config.full_format_magic);
        debug!(
            "Block {} ({} bytes) classified as {:?}",
            block.index,
            block.data.len(),
            outcome.kind
        );

        match outcome.kind {
            BlockKind::Compact => self.dispatch_compact(block, &mut outcome),
            BlockKind::FullFormat => self.dispatch_full(block, &mut outcome),
            BlockKind::RawCopy | BlockKind::Unknown => {
                trace!("Block {} passed through as raw copy", block.index);
            }
        }

        outcome
    }

    fn dispatch_compact(&self, block: &RawBlock<'_>, outcome: &mut BlockOutcome) {
        match self.compact.decode(block.index, block.data) {
            Ok(output) => {
                outcome.object = Some(output.object);
                outcome.cross_refs = output.cross_refs;
                outcome.diagnostics = output.diagnostics;
            }
            Err(e) => {
                let kind = match e {
                    CompactError::UnknownVersion(_) | CompactError::InvalidFlags(_) => {
                        DiagnosticKind::UnknownCompactVersion
                    }
                    _ => DiagnosticKind::RegionFraming,
                };
                warn!("Compact block {} failed: {}", block.index, e);
                outcome
                    .diagnostics
                    .push(Diagnostic::error(block.index, kind, e.to_string()));
            }
        }
    }

    fn dispatch_full(&self, block: &RawBlock<'_>, outcome: &mut BlockOutcome) {
        let unpacked = match full::unpack(block.data, self.config, self.codec) {
            Ok(unpacked) => unpacked,
            Err(e) => {
                let kind = match e {
                    FullFormatError::Codec(_) => DiagnosticKind::Decompression,
                    _ => DiagnosticKind::FullFormat,
                };
                warn!("Full-format block {} failed: {}", block.index, e);
                outcome
                    .diagnostics
                    .push(Diagnostic::error(block.index, kind, e.to_string()));
                // Header sizes still count for cross-block matching
                if let Ok(header) =
                    FullFormatHeader::parse(block.data, self.config.full_format_magic)
                {
                    outcome.record_sizes(&header);
                }
                return;
            }
        };

        let header = unpacked.header;
        outcome.record_sizes(&header);

        if unpacked.checksum_valid == Some(false) {
            warn!("Full-format block {} checksum mismatch", block.index);
            outcome.diagnostics.push(Diagnostic::warning(
                block.index,
                DiagnosticKind::ChecksumMismatch,
                format!("payload checksum 0x{:08X} does not match", header.checksum),
            ));
        }

        match self
            .full
            .decode(block.index, &unpacked.payload, self.registry, self.config)
        {
            Ok(output) => {
                outcome.object = Some(output.object);
                outcome.diagnostics.extend(output.warnings);
            }
            Err(e) => {
                warn!("Full-format block {} could not be decoded: {}", block.index, e);
                outcome.diagnostics.push(Diagnostic::error(
                    block.index,
                    DiagnosticKind::FullFormat,
                    e.to_string(),
                ));
            }
        }
    }
}

/// Merge block outcomes into an object graph, resolving cross-block
/// references against sibling block sizes
pub fn merge(
    outcomes: Vec<BlockOutcome>,
    blocks: &[RawBlock<'_>],
    config: &DecoderConfig,
) -> ObjectGraph {
    let sizes: Vec<BlockSizes> = outcomes.iter().map(|o| o.sizes.clone()).collect();
    let mut graph = ObjectGraph {
        blocks: outcomes.iter().map(BlockOutcome::summary).collect(),
        ..ObjectGraph::default()
    };

    for outcome in outcomes {
        graph.diagnostics.extend(outcome.diagnostics);
        for pending in &outcome.cross_refs {
            let (reference, diagnostic) =
                resolve_cross_ref(outcome.index, pending, &sizes, blocks, config);
            graph.diagnostics.extend(diagnostic);
            graph.cross_references.push(reference);
        }
        if let Some(object) = outcome.object {
            graph.objects.push(object);
        }
    }

    graph.summary = GraphSummary::from_objects(&graph.objects);
    graph
}

fn resolve_cross_ref(
    source: usize,
    pending: &PendingCrossRef,
    sizes: &[BlockSizes],
    blocks: &[RawBlock<'_>],
    config: &DecoderConfig,
) -> (CrossReference, Option<Diagnostic>) {
    let declared = pending.declared_size as usize;
    let mut reference = CrossReference {
        source_block: source,
        region: pending.region,
        declared_size: pending.declared_size,
        descriptor: pending.descriptor,
        target: None,
    };

    let mut candidates = (source + 1..sizes.len()).chain(0..source.min(sizes.len()));
    let found =
        candidates.find_map(|index| sizes[index].matches(declared).map(|m| (index, m)));

    let Some((index, matched)) = found else {
        warn!(
            "Block {} region {}: no block of {} bytes for cross-block reference",
            source, pending.region, declared
        );
        let diagnostic = Diagnostic::warning(
            source,
            DiagnosticKind::CrossBlockRefMismatch,
            format!("no sibling block matches declared size {declared}"),
        )
        .in_region(pending.region);
        return (reference, Some(diagnostic));
    };

    let mut diagnostic = None;
    let checksum_valid = match (config.verify_checksums, pending.descriptor.checksum()) {
        (true, Some(expected)) => {
            let data = blocks.get(index).map_or(&[][..], |b| b.data);
            let actual = adler::adler32_slice(sizes[index].checksummed(data, matched));
            if actual != expected {
                warn!(
                    "Block {} region {}: descriptor checksum 0x{:08X} != block {} checksum 0x{:08X}",
                    source, pending.region, expected, index, actual
                );
                diagnostic = Some(
                    Diagnostic::warning(
                        source,
                        DiagnosticKind::ChecksumMismatch,
                        format!(
                            "descriptor checksum 0x{expected:08X} does not match block {index} (0x{actual:08X})"
                        ),
                    )
                    .in_region(pending.region),
                );
            }
            Some(actual == expected)
        }
        _ => None,
    };

    trace!(
        "Block {} region {} references block {} ({:?})",
        source, pending.region, index, matched
    );
    reference.target = Some(CrossReferenceTarget {
        block: index,
        matched,
        checksum_valid,
    });
    (reference, diagnostic)
}
