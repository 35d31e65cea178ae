//! Decoded object graph
//!
//! The uniform result of decoding a save file, whichever encoding produced
//! each object. Everything here serializes with serde; raw byte runs are
//! written as lowercase hex.

use crate::compact::{CanonicalTag, CrossBlockDescriptor, Gap, Node, RegionKind};
use crate::dispatch::BlockKind;
use serde::Serialize;
use std::collections::BTreeMap;

/// Hex serialization for byte payloads
pub(crate) mod hex_bytes {
    use serde::Serializer;

    pub fn serialize<S, T>(bytes: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: AsRef<[u8]>,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    #[allow(clippy::ref_option)]
    pub fn serialize_option<S, T>(bytes: &Option<T>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: AsRef<[u8]>,
    {
        match bytes {
            Some(bytes) => serializer.serialize_some(&hex::encode(bytes)),
            None => serializer.serialize_none(),
        }
    }
}

/// Encoding a decoded object came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectFormat {
    /// Table-id addressed sparse-array encoding
    Compact,
    /// Type-hash addressed encoding
    Full,
}

/// Object instancing mode
///
/// Every object observed in save files is instanced normally; the field is
/// kept so the object header shape matches the full format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstancingMode {
    /// Regular instance
    #[default]
    Normal,
}

/// A top-level node of a compact region
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Property {
    /// Region index
    pub region: usize,
    /// Offset of the node within its block
    pub offset: usize,
    /// Decoded node
    pub node: Node,
}

/// A table reference and its registry resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedProperty {
    /// Region index (0 for references in the preamble)
    pub region: usize,
    /// Offset of the top-level node carrying the reference
    pub offset: usize,
    /// Table id
    pub table_id: u8,
    /// Property index
    pub property_index: u8,
    /// Type hash, when the registry knows the table
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_hash: Option<u32>,
    /// Property name, when the registry schema provides one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property_name: Option<String>,
}

/// Framing and decode outcome of one region
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegionReport {
    /// Region index
    pub index: usize,
    /// Offset of the declaring header
    pub header_offset: usize,
    /// Offset of the first payload byte
    pub payload_offset: usize,
    /// Declared size
    pub declared_size: u32,
    /// Measured size
    pub actual_size: usize,
    /// Classification
    pub kind: RegionKind,
    /// Gap preceding the region's sub-header
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gap: Option<Gap>,
    /// Top-level nodes decoded
    pub nodes: usize,
    /// Node decode error that ended the region early
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Reserved bytes of a growth region, preserved verbatim
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "hex_bytes::serialize_option"
    )]
    pub growth: Option<Vec<u8>>,
}

/// One decoded object
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodedObject {
    /// Index of the block the object was decoded from
    pub block: usize,
    /// Source encoding
    pub format: ObjectFormat,
    /// Type hash of the object
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_hash: Option<u32>,
    /// Object id
    pub object_id: u32,
    /// Parent object id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub father_id: Option<u32>,
    /// Instancing mode
    pub instancing_mode: InstancingMode,
    /// Object descriptor nodes preceding the first table reference
    pub preamble: Vec<Node>,
    /// Preamble bytes, kept when they could not be decoded
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "hex_bytes::serialize_option"
    )]
    pub preamble_raw: Option<Vec<u8>>,
    /// Top-level property nodes in stream order
    pub properties: Vec<Property>,
    /// Every table reference in stream order
    pub references: Vec<ResolvedProperty>,
    /// Per-region framing and decode results
    pub regions: Vec<RegionReport>,
    /// Payload bytes the decoder left uninterpreted
    pub unparsed_len: usize,
}

impl DecodedObject {
    /// Empty object for a block
    pub fn new(block: usize, format: ObjectFormat) -> Self {
        Self {
            block,
            format,
            type_hash: None,
            object_id: 0,
            father_id: None,
            instancing_mode: InstancingMode::Normal,
            preamble: Vec::new(),
            preamble_raw: None,
            properties: Vec::new(),
            references: Vec::new(),
            regions: Vec::new(),
            unparsed_len: 0,
        }
    }

    /// Whether any region stopped on a node error
    pub fn is_partial(&self) -> bool {
        self.regions.iter().any(|r| r.error.is_some())
    }

    /// References the registry could not resolve
    pub fn unresolved_references(&self) -> impl Iterator<Item = &ResolvedProperty> {
        self.references.iter().filter(|r| r.type_hash.is_none())
    }
}

/// Which size of the target block a cross-block reference matched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeMatch {
    /// Size recorded in the outer block table
    Stored,
    /// Full-format payload size as stored (compressed)
    Payload,
    /// Full-format decompressed size
    Decompressed,
}

/// Block a cross-block reference resolved to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CrossReferenceTarget {
    /// Target block index
    pub block: usize,
    /// Which size matched
    pub matched: SizeMatch,
    /// Descriptor checksum verdict, when the descriptor carries one and
    /// verification is enabled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum_valid: Option<bool>,
}

/// A cross-block reference region
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrossReference {
    /// Block holding the reference
    pub source_block: usize,
    /// Region index within the source block
    pub region: usize,
    /// Declared size, i.e. the size of the referenced block
    pub declared_size: u32,
    /// Opaque descriptor bytes
    pub descriptor: CrossBlockDescriptor,
    /// Resolved target, `None` when no sibling block matched
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<CrossReferenceTarget>,
}

/// Diagnostic severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Structure was still decoded
    Warning,
    /// A block or region was abandoned
    Error,
}

/// Diagnostic categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Compact header version or flags not recognised
    UnknownCompactVersion,
    /// Region framing failed
    RegionFraming,
    /// A node failed to decode; its region is partial
    NodeDecode,
    /// The object preamble could not be decoded
    PreambleDecode,
    /// A table reference did not resolve
    UnknownTableId,
    /// A cross-block reference matched no sibling block
    CrossBlockRefMismatch,
    /// A checksum did not match
    ChecksumMismatch,
    /// The full-format decoder failed or reported a problem
    FullFormat,
    /// A full-format payload could not be decompressed
    Decompression,
    /// Bytes follow the last block
    TrailingData,
}

/// An attributable decode problem
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// Block index, absent for file-level diagnostics
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block: Option<usize>,
    /// Region index
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<usize>,
    /// Offset within the block (or file, for file-level diagnostics)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
    /// Severity
    pub severity: Severity,
    /// Category
    pub kind: DiagnosticKind,
    /// Human-readable description
    pub message: String,
}

impl Diagnostic {
    /// Warning scoped to a block
    pub fn warning(block: usize, kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            block: Some(block),
            region: None,
            offset: None,
            severity: Severity::Warning,
            kind,
            message: message.into(),
        }
    }

    /// Error scoped to a block
    pub fn error(block: usize, kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            ..Self::warning(block, kind, message)
        }
    }

    /// Attach a region index
    pub fn in_region(mut self, region: usize) -> Self {
        self.region = Some(region);
        self
    }

    /// Attach an offset
    pub fn at(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// Per-block summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlockSummary {
    /// Block index
    pub index: usize,
    /// Offset of the block data within the file
    pub offset: usize,
    /// Stored size
    pub size: usize,
    /// Classification
    pub kind: BlockKind,
    /// Whether an object was produced
    pub decoded: bool,
}

/// Table references to one table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableRefSummary {
    /// References seen
    pub count: usize,
    /// Type hash the table resolved to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_hash: Option<u32>,
    /// Reference count per property index
    pub properties: BTreeMap<u8, usize>,
}

/// Node and table reference statistics over every decoded object
///
/// Nodes are counted as encoded: preamble and property nodes with their
/// branch children, but not the targets copied into indirect nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphSummary {
    /// Encoded nodes
    pub nodes: usize,
    /// Nodes per raw tag byte
    pub raw_tags: BTreeMap<u8, usize>,
    /// Nodes per canonical shape, after tag normalization
    pub canonical_tags: BTreeMap<CanonicalTag, usize>,
    /// Table references grouped by table id
    pub table_refs: BTreeMap<u8, TableRefSummary>,
}

impl GraphSummary {
    /// Summarize decoded objects
    pub fn from_objects(objects: &[DecodedObject]) -> Self {
        let mut summary = Self::default();
        for object in objects {
            let nodes = object
                .preamble
                .iter()
                .chain(object.properties.iter().map(|p| &p.node));
            for node in nodes {
                node.walk(&mut |n| summary.count_node(n));
            }

            for reference in &object.references {
                let table = summary.table_refs.entry(reference.table_id).or_default();
                table.count += 1;
                table.type_hash = table.type_hash.or(reference.type_hash);
                *table.properties.entry(reference.property_index).or_default() += 1;
            }
        }
        summary
    }

    fn count_node(&mut self, node: &Node) {
        self.nodes += 1;
        *self.raw_tags.entry(node.raw_tag()).or_default() += 1;
        if let Some(tag) = node.canonical_tag() {
            *self.canonical_tags.entry(tag).or_default() += 1;
        }
    }

    /// References across all tables
    pub fn table_ref_count(&self) -> usize {
        self.table_refs.values().map(|t| t.count).sum()
    }
}

/// Result of decoding a save file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ObjectGraph {
    /// Every block in file order
    pub blocks: Vec<BlockSummary>,
    /// Decoded objects in block order
    pub objects: Vec<DecodedObject>,
    /// Cross-block references, resolved where possible
    pub cross_references: Vec<CrossReference>,
    /// Everything that went wrong, in discovery order
    pub diagnostics: Vec<Diagnostic>,
    /// Tag and table reference statistics
    pub summary: GraphSummary,
}

impl ObjectGraph {
    /// Object decoded from a block
    pub fn object_for_block(&self, block: usize) -> Option<&DecodedObject> {
        self.objects.iter().find(|o| o.block == block)
    }

    /// Diagnostics of a given severity
    pub fn diagnostics_with(&self, severity: Severity) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(move |d| d.severity == severity)
    }

    /// Whether any block or region was abandoned
    pub fn has_errors(&self) -> bool {
        self.diagnostics_with(Severity::Error).next().is_some()
    }

    /// Cross-block references that matched no sibling
    pub fn unresolved_cross_references(&self) -> impl Iterator<Item = &CrossReference> {
        self.cross_references.iter().filter(|r| r.target.is_none())
    }

    /// Serialize to compact JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Serialize to indented JSON
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
