//! Compact-format block decoding
//!
//! Compact blocks are small uncompressed blocks that address types by
//! 1-byte table id and store properties as sparse-array nodes:
//!
//! ```text
//! [01 <u24 size> 00 00 80 00]   header, declares region 0
//! [preamble] [nodes...]         region 0
//! [gap 5] [sub-header 8] [...]  further regions
//! ```
//!
//! [`CompactBlockDecoder`] parses the header, frames the regions, decodes
//! every node stream and resolves table references through the registry.
//! A node failure ends only its own region; header and framing failures end
//! the block.

pub mod error;
pub mod header;
pub mod node;
pub mod region;
pub mod tag;

pub use error::{CompactError, CompactResult, NodeDecodeError, NodeResult, RegionFramingError};
pub use header::{COMPACT_HEADER_SIZE, CompactHeader, GAP_SIZE, GAP_TERMINATOR, Gap};
pub use node::{
    BranchIndex, Cluster, LeafEntry, LeafValue, Node, NodeDecoder, NodeStream, PropertyRef,
};
pub use region::{CrossBlockDescriptor, Region, RegionFramer, RegionKind, RegionLayout};
pub use tag::{CanonicalTag, FixedKind, IndirectIndex};

use crate::config::DecoderConfig;
use crate::graph::{
    DecodedObject, Diagnostic, DiagnosticKind, ObjectFormat, Property, RegionReport,
    ResolvedProperty,
};
use crate::registry::{TableResolver, TypeRegistry};
use tracing::{debug, warn};

/// Cross-block reference found in a block, not yet matched to a sibling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingCrossRef {
    /// Region index
    pub region: usize,
    /// Declared region size, i.e. the size of the referenced block
    pub declared_size: u32,
    /// Descriptor bytes
    pub descriptor: CrossBlockDescriptor,
}

/// Result of decoding one compact block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactOutput {
    /// Block header
    pub header: CompactHeader,
    /// Decoded object
    pub object: DecodedObject,
    /// Cross-block references, unresolved
    pub cross_refs: Vec<PendingCrossRef>,
    /// Region- and reference-scoped problems
    pub diagnostics: Vec<Diagnostic>,
}

/// Decodes compact blocks into objects
#[derive(Debug, Clone, Copy)]
pub struct CompactBlockDecoder<'r> {
    resolver: TableResolver<'r>,
    framer: RegionFramer,
    nodes: NodeDecoder,
}

impl<'r> CompactBlockDecoder<'r> {
    /// Create a decoder resolving against `registry`
    pub fn new(registry: &'r TypeRegistry, config: &DecoderConfig) -> Self {
        Self {
            resolver: TableResolver::new(registry),
            framer: RegionFramer::new(config.gap_lookahead),
            nodes: NodeDecoder::from_config(config),
        }
    }

    /// Decode one compact block
    ///
    /// `block` is the block's index in the file, used to attribute
    /// diagnostics.
    pub fn decode(&self, block: usize, data: &[u8]) -> CompactResult<CompactOutput> {
        let header = CompactHeader::parse(data)?;
        let layout = self.framer.frame(data, &header)?;

        let mut object = DecodedObject::new(block, ObjectFormat::Compact);
        let mut cross_refs = Vec::new();
        let mut diagnostics = Vec::new();

        for region in &layout.regions {
            let mut report = RegionReport {
                index: region.index,
                header_offset: region.header_offset,
                payload_offset: region.payload_offset,
                declared_size: region.declared_size,
                actual_size: region.actual_size(),
                kind: region.kind,
                gap: region.gap,
                nodes: 0,
                error: None,
                growth: None,
            };

            if let RegionKind::CrossBlockRef(descriptor) = region.kind {
                cross_refs.push(PendingCrossRef {
                    region: region.index,
                    declared_size: region.declared_size,
                    descriptor,
                });
                object.regions.push(report);
                continue;
            }

            let bytes = region.node_bytes();
            let start = if region.index == 0 {
                self.decode_preamble(block, region, &mut object, &mut diagnostics)
            } else {
                0
            };

            let stream = self.nodes.decode_stream(bytes, region.payload_offset, start);
            report.nodes = stream.nodes.len();
            object.unparsed_len += bytes.len() - stream.consumed;

            for (offset, node) in stream.nodes {
                self.resolve_references(
                    block,
                    region.index,
                    offset,
                    &node,
                    &mut object,
                    &mut diagnostics,
                );
                object.properties.push(Property {
                    region: region.index,
                    offset,
                    node,
                });
            }

            if let Some(error) = stream.error {
                let offset = region.payload_offset + stream.consumed;
                warn!(
                    "Block {} region {}: node decode failed at offset {}: {}",
                    block, region.index, offset, error
                );
                diagnostics.push(
                    Diagnostic::error(block, DiagnosticKind::NodeDecode, error.to_string())
                        .in_region(region.index)
                        .at(offset),
                );
                report.error = Some(error.to_string());
            }

            let growth = region.growth_bytes();
            if !growth.is_empty() {
                object.unparsed_len += growth.len();
                report.growth = Some(growth.to_vec());
            }

            object.regions.push(report);
        }

        object.type_hash = object.references.iter().find_map(|r| r.type_hash);

        debug!(
            "Compact block {}: {} regions, {} properties, {} references, {} cross-block refs",
            block,
            object.regions.len(),
            object.properties.len(),
            object.references.len(),
            cross_refs.len()
        );

        Ok(CompactOutput {
            header,
            object,
            cross_refs,
            diagnostics,
        })
    }

    /// Decode the object descriptor at the start of region 0 and return the
    /// position where property nodes begin
    fn decode_preamble(
        &self,
        block: usize,
        region: &Region<'_>,
        object: &mut DecodedObject,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> usize {
        let bytes = region.node_bytes();
        let Some(end) = find_first_table_ref(bytes) else {
            return 0;
        };

        let stream = self
            .nodes
            .decode_stream(&bytes[..end], region.payload_offset, 0);
        let nodes: Vec<Node> = stream.nodes.into_iter().map(|(_, node)| node).collect();

        object.object_id = nodes
            .iter()
            .find_map(|n| n.fixed_value(FixedKind::ObjectId))
            .unwrap_or(0);
        object.father_id = nodes.iter().find_map(|n| n.fixed_value(FixedKind::FatherId));
        object.preamble = nodes;

        if let Some(error) = stream.error {
            warn!("Block {} preamble could not be decoded: {}", block, error);
            diagnostics.push(
                Diagnostic::warning(block, DiagnosticKind::PreambleDecode, error.to_string())
                    .in_region(region.index)
                    .at(region.payload_offset + stream.consumed),
            );
            object.preamble_raw = Some(bytes[..end].to_vec());
        }

        end
    }

    fn resolve_references(
        &self,
        block: usize,
        region: usize,
        offset: usize,
        node: &Node,
        object: &mut DecodedObject,
        diagnostics: &mut Vec<Diagnostic>,
    ) {
        for reference in node.references() {
            let mut resolved = ResolvedProperty {
                region,
                offset,
                table_id: reference.table_id,
                property_index: reference.property_index,
                type_hash: None,
                property_name: None,
            };

            match self
                .resolver
                .resolve(reference.table_id, reference.property_index)
            {
                Ok(resolution) => {
                    resolved.type_hash = Some(resolution.type_hash);
                    resolved.property_name = resolution.property_name;
                }
                Err(e) => {
                    debug!("Block {} region {}: {}", block, region, e);
                    diagnostics.push(
                        Diagnostic::warning(block, DiagnosticKind::UnknownTableId, e.to_string())
                            .in_region(region)
                            .at(offset),
                    );
                }
            }

            object.references.push(resolved);
        }
    }
}

/// Position of the first `08 03` pair in a region
fn find_first_table_ref(bytes: &[u8]) -> Option<usize> {
    bytes
        .windows(2)
        .position(|w| w == [tag::TABLE_REF_TAG, tag::TABLE_REF_PARAM])
}
