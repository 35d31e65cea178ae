//! Sparse-array node decoding
//!
//! Property data in compact blocks is a stream of Judy-style nodes. Each
//! node is a two-byte prefix `[tag][param]` followed by a tag-specific
//! payload; branch shapes nest further nodes, leaf shapes hold 4-byte values
//! keyed by 1-, 2- or 3-byte keys. Values are kept as raw bytes except for
//! table references (`08 03 <table> <property>`), which are recognised
//! wherever a value slot starts with `08 03`.

use super::error::{NodeDecodeError, NodeResult};
use super::tag::{
    self, CanonicalTag, FixedKind, IndirectIndex, NodeShape, TABLE_REF_PARAM, TABLE_REF_TAG,
};
use crate::config::{
    DEFAULT_MAX_NODE_DEPTH, DEFAULT_MAX_NODES, DEFAULT_MAX_NORMALIZATION_PASSES, DecoderConfig,
};
use crate::cursor::ByteCursor;
use crate::graph::hex_bytes;
use serde::Serialize;
use std::collections::HashMap;

/// Table reference: `08 03 <table_id> <property_index>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PropertyRef {
    /// Table id, resolved through the type registry
    pub table_id: u8,
    /// Property index within the table, kept opaque
    pub property_index: u8,
}

impl PropertyRef {
    /// Parse a 4-byte slot that starts with `08 03`
    pub fn from_slot(slot: &[u8]) -> Option<Self> {
        match slot {
            [TABLE_REF_TAG, TABLE_REF_PARAM, table_id, property_index] => Some(Self {
                table_id: *table_id,
                property_index: *property_index,
            }),
            _ => None,
        }
    }
}

/// Value stored in a leaf entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LeafValue {
    /// Uninterpreted 4-byte value
    Raw(#[serde(serialize_with = "hex_bytes::serialize")] [u8; 4]),
    /// 4-byte value that is a table reference
    Reference(PropertyRef),
    /// Variable-length value
    Bytes(#[serde(serialize_with = "hex_bytes::serialize")] Vec<u8>),
}

impl LeafValue {
    fn from_slot(slot: [u8; 4]) -> Self {
        PropertyRef::from_slot(&slot).map_or(Self::Raw(slot), Self::Reference)
    }

    fn from_bytes(bytes: &[u8]) -> Self {
        PropertyRef::from_slot(bytes).map_or_else(|| Self::Bytes(bytes.to_vec()), Self::Reference)
    }
}

/// One key/value pair of a leaf
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeafEntry {
    /// Key, widened from its on-disk width
    pub key: u32,
    /// Value
    pub value: LeafValue,
}

/// Cluster of a clustered branch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Cluster {
    /// Key base
    pub base: u8,
    /// Presence bits relative to `base`
    pub bitmap: u8,
}

/// How a branch indexes its children
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchIndex {
    /// Presence bitmap, one child per set bit
    Bitmap(#[serde(serialize_with = "hex_bytes::serialize")] Vec<u8>),
    /// Key digits, one child per digit
    Digits(#[serde(serialize_with = "hex_bytes::serialize")] Vec<u8>),
    /// Clusters, one child per set bit across all clusters
    Clusters(Vec<Cluster>),
}

/// A decoded node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum Node {
    /// Table reference
    Reference {
        /// Reference
        reference: PropertyRef,
    },
    /// Fixed 32-bit value primitive
    Fixed {
        /// Which primitive
        kind: FixedKind,
        /// Value
        value: u32,
    },
    /// Payload-free sentinel
    Null {
        /// Tag as read
        raw_tag: u8,
        /// Canonical tag
        tag: CanonicalTag,
        /// Param byte
        param: u8,
    },
    /// Key/value leaf
    Leaf {
        /// Tag as read
        raw_tag: u8,
        /// Canonical tag
        tag: CanonicalTag,
        /// Param after normalization
        param: u8,
        /// Entries in stream order
        entries: Vec<LeafEntry>,
    },
    /// Composite node
    Branch {
        /// Tag as read
        raw_tag: u8,
        /// Canonical tag
        tag: CanonicalTag,
        /// Param after normalization
        param: u8,
        /// Child index
        index: BranchIndex,
        /// Children in stream order
        children: Vec<Node>,
    },
    /// Back-reference to an earlier node in the same region
    Indirect {
        /// Tag as read
        raw_tag: u8,
        /// Index encoding
        index: IndirectIndex,
        /// Target offset relative to the region start
        target: usize,
        /// Node decoded at the target
        node: Box<Node>,
    },
}

impl Node {
    /// Table references carried by this node, in stream order
    ///
    /// Indirect targets are not followed: their references were already
    /// reported where the target node appeared.
    pub fn references(&self) -> Vec<PropertyRef> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references(&self, out: &mut Vec<PropertyRef>) {
        match self {
            Self::Reference { reference } => out.push(*reference),
            Self::Leaf { entries, .. } => out.extend(entries.iter().filter_map(|e| match e.value {
                LeafValue::Reference(r) => Some(r),
                _ => None,
            })),
            Self::Branch { children, .. } => {
                for child in children {
                    child.collect_references(out);
                }
            }
            Self::Fixed { .. } | Self::Null { .. } | Self::Indirect { .. } => {}
        }
    }

    /// Value of a fixed primitive of the given kind
    pub fn fixed_value(&self, kind: FixedKind) -> Option<u32> {
        match self {
            Self::Fixed { kind: k, value } if *k == kind => Some(*value),
            _ => None,
        }
    }

    /// Number of nodes in this tree, indirect targets included
    pub fn node_count(&self) -> usize {
        match self {
            Self::Branch { children, .. } => {
                1 + children.iter().map(Self::node_count).sum::<usize>()
            }
            Self::Indirect { node, .. } => 1 + node.node_count(),
            _ => 1,
        }
    }

    /// Nesting levels below this node, indirect targets included
    pub fn height(&self) -> usize {
        match self {
            Self::Branch { children, .. } => {
                children.iter().map(|c| c.height() + 1).max().unwrap_or(0)
            }
            Self::Indirect { node, .. } => node.height() + 1,
            _ => 0,
        }
    }

    /// Tag byte the node was encoded with
    pub fn raw_tag(&self) -> u8 {
        match self {
            Self::Reference { .. } => TABLE_REF_TAG,
            Self::Fixed { kind, .. } => kind.tag(),
            Self::Null { raw_tag, .. }
            | Self::Leaf { raw_tag, .. }
            | Self::Branch { raw_tag, .. }
            | Self::Indirect { raw_tag, .. } => *raw_tag,
        }
    }

    /// Canonical shape, for nulls, leaves and branches
    pub fn canonical_tag(&self) -> Option<CanonicalTag> {
        match self {
            Self::Null { tag, .. } | Self::Leaf { tag, .. } | Self::Branch { tag, .. } => {
                Some(*tag)
            }
            Self::Reference { .. } | Self::Fixed { .. } | Self::Indirect { .. } => None,
        }
    }

    /// Visit this node and every branch child below it
    ///
    /// Indirect targets are not followed, so each encoded node is visited
    /// once.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Self)) {
        visit(self);
        if let Self::Branch { children, .. } = self {
            for child in children {
                child.walk(visit);
            }
        }
    }
}

/// Nodes decoded from one stream, plus the error that stopped it
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NodeStream {
    /// `(absolute offset, node)` pairs in stream order
    pub nodes: Vec<(usize, Node)>,
    /// Error that ended decoding before the stream was exhausted
    pub error: Option<NodeDecodeError>,
    /// Region position just past the last successfully decoded node
    pub consumed: usize,
}

/// Nodes materialized so far against the stream's limit
#[derive(Debug)]
struct Budget {
    used: usize,
    limit: usize,
}

impl Budget {
    fn charge(&mut self, nodes: usize, offset: usize) -> NodeResult<()> {
        self.used = self.used.saturating_add(nodes);
        if self.used > self.limit {
            return Err(NodeDecodeError::NodeBudget {
                offset,
                limit: self.limit,
            });
        }
        Ok(())
    }
}

/// Indirect target already decoded in this stream
#[derive(Debug)]
struct DecodedTarget {
    node: Node,
    count: usize,
    height: usize,
}

/// State shared by every node of one stream
#[derive(Debug)]
struct StreamState {
    budget: Budget,
    targets: HashMap<usize, DecodedTarget>,
}

impl StreamState {
    fn new(limit: usize) -> Self {
        Self {
            budget: Budget { used: 0, limit },
            targets: HashMap::new(),
        }
    }
}

/// Decoder for node streams
///
/// Each indirect target is decoded once per stream and copied on later
/// references. Copies count against the node budget, so a chain of
/// branches full of indirect nodes fails with
/// [`NodeDecodeError::NodeBudget`] instead of growing without bound.
#[derive(Debug, Clone, Copy)]
pub struct NodeDecoder {
    max_depth: usize,
    max_passes: u8,
    max_nodes: usize,
}

impl Default for NodeDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_NODE_DEPTH, DEFAULT_MAX_NORMALIZATION_PASSES)
    }
}

impl NodeDecoder {
    /// Create a decoder with explicit limits and the default node budget
    pub fn new(max_depth: usize, max_passes: u8) -> Self {
        Self {
            max_depth,
            max_passes,
            max_nodes: DEFAULT_MAX_NODES,
        }
    }

    /// Set the number of nodes one stream may materialize
    pub fn with_max_nodes(mut self, max_nodes: usize) -> Self {
        self.max_nodes = max_nodes;
        self
    }

    /// Create a decoder from configuration
    pub fn from_config(config: &DecoderConfig) -> Self {
        Self::new(config.max_node_depth, config.max_normalization_passes)
            .with_max_nodes(config.max_nodes)
    }

    /// Decode one node at the cursor
    ///
    /// The cursor's slice must start at the region start: indirect targets
    /// are positions within it.
    pub fn decode(&self, cursor: &mut ByteCursor<'_>) -> NodeResult<Node> {
        let mut state = StreamState::new(self.max_nodes);
        self.decode_at(cursor, 0, &mut state)
    }

    /// Decode nodes from `start` until the region is exhausted or a node
    /// fails
    ///
    /// `region` is the whole region, `base` its absolute offset.
    pub fn decode_stream(&self, region: &[u8], base: usize, start: usize) -> NodeStream {
        let mut stream = NodeStream {
            consumed: start,
            ..NodeStream::default()
        };
        let mut cursor = match ByteCursor::with_base(region, base).fork_at(start) {
            Ok(cursor) => cursor,
            Err(e) => {
                stream.error = Some(e.into());
                return stream;
            }
        };

        let mut state = StreamState::new(self.max_nodes);
        while !cursor.is_empty() {
            let offset = cursor.offset();
            match self.decode_at(&mut cursor, 0, &mut state) {
                Ok(node) => {
                    stream.nodes.push((offset, node));
                    stream.consumed = cursor.position();
                }
                Err(e) => {
                    stream.error = Some(e);
                    break;
                }
            }
        }
        stream
    }

    fn decode_at(
        &self,
        cursor: &mut ByteCursor<'_>,
        depth: usize,
        state: &mut StreamState,
    ) -> NodeResult<Node> {
        let start = cursor.position();
        let offset = cursor.offset();
        self.check_depth(depth, offset)?;
        state.budget.charge(1, offset)?;

        let [raw, param] = cursor.read_array::<2>()?;

        if tag::is_table_ref(raw, param) {
            let [table_id, property_index] = cursor.read_array::<2>()?;
            return Ok(Node::Reference {
                reference: PropertyRef {
                    table_id,
                    property_index,
                },
            });
        }

        if let Some(kind) = FixedKind::from_prefix(raw, param) {
            let value = cursor.read_u32_le()?;
            return Ok(Node::Fixed { kind, value });
        }

        let normalized = tag::normalize(raw, param, self.max_passes, offset)?;
        match normalized.shape {
            NodeShape::Indirect(index) => {
                let target = match index {
                    IndirectIndex::Param => usize::from(normalized.param),
                    IndirectIndex::Wide => usize::from(cursor.read_u16_le()?),
                };
                if target >= start {
                    return Err(NodeDecodeError::IndirectTarget {
                        offset,
                        target,
                        reason: "target does not precede the indirect node",
                    });
                }
                let node = self.decode_target(cursor, target, depth + 1, offset, state)?;
                Ok(Node::Indirect {
                    raw_tag: raw,
                    index,
                    target,
                    node: Box::new(node),
                })
            }
            NodeShape::Canonical(tag) => {
                self.decode_canonical(cursor, raw, tag, normalized.param, depth, state)
            }
        }
    }

    fn check_depth(&self, depth: usize, offset: usize) -> NodeResult<()> {
        if depth > self.max_depth {
            return Err(NodeDecodeError::RecursionLimit {
                offset,
                depth: self.max_depth,
            });
        }
        Ok(())
    }

    fn decode_target(
        &self,
        cursor: &ByteCursor<'_>,
        target: usize,
        depth: usize,
        offset: usize,
        state: &mut StreamState,
    ) -> NodeResult<Node> {
        if let Some(decoded) = state.targets.get(&target) {
            self.check_depth(depth + decoded.height, offset)?;
            state.budget.charge(decoded.count, offset)?;
            return Ok(decoded.node.clone());
        }

        let mut target_cursor = cursor.fork_at(target)?;
        let before = state.budget.used;
        let node = self.decode_at(&mut target_cursor, depth, state)?;
        let decoded = DecodedTarget {
            count: state.budget.used - before,
            height: node.height(),
            node: node.clone(),
        };
        state.targets.insert(target, decoded);
        Ok(node)
    }

    fn decode_canonical(
        &self,
        cursor: &mut ByteCursor<'_>,
        raw_tag: u8,
        tag: CanonicalTag,
        param: u8,
        depth: usize,
        state: &mut StreamState,
    ) -> NodeResult<Node> {
        let count = usize::from(param);

        let leaf = |entries: Vec<LeafEntry>| Node::Leaf {
            raw_tag,
            tag,
            param,
            entries,
        };

        match tag {
            CanonicalTag::NullLeaf | CanonicalTag::NullBranch | CanonicalTag::NullMarker => {
                Ok(Node::Null {
                    raw_tag,
                    tag,
                    param,
                })
            }

            CanonicalTag::Bitmap8
            | CanonicalTag::Bitmap16
            | CanonicalTag::Bitmap32
            | CanonicalTag::Bitmap256 => {
                let width = tag.bitmap_len().unwrap_or(1);
                let bitmap = cursor.read_bytes(width)?.to_vec();
                let children_count = bitmap.iter().map(|b| b.count_ones() as usize).sum();
                let children = self.decode_children(cursor, children_count, depth, state)?;
                Ok(Node::Branch {
                    raw_tag,
                    tag,
                    param,
                    index: BranchIndex::Bitmap(bitmap),
                    children,
                })
            }

            CanonicalTag::LinearBranch => {
                let digits = cursor.read_bytes(count)?.to_vec();
                let children = self.decode_children(cursor, count, depth, state)?;
                Ok(Node::Branch {
                    raw_tag,
                    tag,
                    param,
                    index: BranchIndex::Digits(digits),
                    children,
                })
            }

            CanonicalTag::ClusteredBranch => {
                let mut clusters = Vec::with_capacity(count);
                for _ in 0..count {
                    let [base, bitmap] = cursor.read_array::<2>()?;
                    clusters.push(Cluster { base, bitmap });
                }
                let children_count = clusters.iter().map(|c| c.bitmap.count_ones() as usize).sum();
                let children = self.decode_children(cursor, children_count, depth, state)?;
                Ok(Node::Branch {
                    raw_tag,
                    tag,
                    param,
                    index: BranchIndex::Clusters(clusters),
                    children,
                })
            }

            CanonicalTag::LinearLeaf2 => {
                let mut entries = Vec::with_capacity(count);
                for _ in 0..count {
                    let key = u32::from(cursor.read_u16_le()?);
                    let value = LeafValue::from_slot(cursor.read_array()?);
                    entries.push(LeafEntry { key, value });
                }
                Ok(leaf(entries))
            }

            CanonicalTag::LinearLeaf3 => {
                let mut entries = Vec::with_capacity(count);
                for _ in 0..count {
                    let key = cursor.read_u24_le()?;
                    let value = LeafValue::from_slot(cursor.read_array()?);
                    entries.push(LeafEntry { key, value });
                }
                Ok(leaf(entries))
            }

            CanonicalTag::SingleEntry => {
                let key = u32::from(cursor.read_u8()?);
                let value = LeafValue::from_slot(cursor.read_array()?);
                Ok(leaf(vec![LeafEntry { key, value }]))
            }

            CanonicalTag::Single3 => {
                let key = cursor.read_u24_le()?;
                let value = LeafValue::from_slot(cursor.read_array()?);
                Ok(leaf(vec![LeafEntry { key, value }]))
            }

            CanonicalTag::Packed3 => {
                let mut keys = Vec::with_capacity(count);
                for _ in 0..count {
                    keys.push(cursor.read_u24_le()?);
                }
                let mut entries = Vec::with_capacity(count);
                for key in keys {
                    let value = LeafValue::from_slot(cursor.read_array()?);
                    entries.push(LeafEntry { key, value });
                }
                Ok(leaf(entries))
            }

            CanonicalTag::VariableSize => {
                let mut entries = Vec::with_capacity(count);
                for _ in 0..count {
                    let key = u32::from(cursor.read_u8()?);
                    let len = usize::from(cursor.read_u8()?);
                    let value = LeafValue::from_bytes(cursor.read_bytes(len)?);
                    entries.push(LeafEntry { key, value });
                }
                Ok(leaf(entries))
            }
        }
    }

    fn decode_children(
        &self,
        cursor: &mut ByteCursor<'_>,
        count: usize,
        depth: usize,
        state: &mut StreamState,
    ) -> NodeResult<Vec<Node>> {
        let mut children = Vec::with_capacity(count);
        for _ in 0..count {
            children.push(self.decode_at(cursor, depth + 1, state)?);
        }
        Ok(children)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn decode(data: &[u8]) -> (NodeResult<Node>, usize) {
        let mut cursor = ByteCursor::new(data);
        let result = NodeDecoder::default().decode(&mut cursor);
        (result, cursor.position())
    }

    fn decode_ok(data: &[u8]) -> Node {
        let (result, consumed) = decode(data);
        let node = result.unwrap();
        assert_eq!(consumed, data.len(), "node did not consume its whole encoding");
        node
    }

    fn raw(bytes: [u8; 4]) -> LeafValue {
        LeafValue::Raw(bytes)
    }

    #[test]
    fn test_table_ref() {
        assert_eq!(
            decode_ok(&[0x08, 0x03, 0x5E, 0xB6]),
            Node::Reference {
                reference: PropertyRef {
                    table_id: 0x5E,
                    property_index: 0xB6
                }
            }
        );
        assert_eq!(
            decode_ok(&[0x08, 0x03, 0x5B, 0x8A]),
            Node::Reference {
                reference: PropertyRef {
                    table_id: 0x5B,
                    property_index: 0x8A
                }
            }
        );
    }

    #[test]
    fn test_fixed_values_consume_six_bytes() {
        let data = [0x15, 0x00, 0x08, 0xA5, 0x10, 0xA6, 0xFF];
        let (node, consumed) = decode(&data);
        assert_eq!(
            node.unwrap(),
            Node::Fixed {
                kind: FixedKind::ObjectId,
                value: 0xA610_A508
            }
        );
        assert_eq!(consumed, 6);

        assert_eq!(
            decode_ok(&[0x12, 0x00, 0x05, 0xE9, 0xEA, 0xE2]),
            Node::Fixed {
                kind: FixedKind::FatherId,
                value: 0xE2EA_E905
            }
        );
    }

    #[test]
    fn test_null_shapes() {
        assert_eq!(
            decode_ok(&[0x08, 0x00]),
            Node::Null {
                raw_tag: 0x08,
                tag: CanonicalTag::NullLeaf,
                param: 0
            }
        );
        assert_eq!(
            decode_ok(&[0x12, 0x05]),
            Node::Null {
                raw_tag: 0x12,
                tag: CanonicalTag::NullMarker,
                param: 5
            }
        );
    }

    #[test]
    fn test_linear_leaf_with_reference_value() {
        let data = [
            0x15, 0x02, // linear leaf, 2 entries
            0x01, 0x00, 0xAA, 0xBB, 0xCC, 0xDD, //
            0x02, 0x00, 0x08, 0x03, 0x5E, 0xB6,
        ];
        let node = decode_ok(&data);
        assert_eq!(
            node,
            Node::Leaf {
                raw_tag: 0x15,
                tag: CanonicalTag::LinearLeaf2,
                param: 2,
                entries: vec![
                    LeafEntry {
                        key: 1,
                        value: raw([0xAA, 0xBB, 0xCC, 0xDD])
                    },
                    LeafEntry {
                        key: 2,
                        value: LeafValue::Reference(PropertyRef {
                            table_id: 0x5E,
                            property_index: 0xB6
                        })
                    },
                ],
            }
        );
        assert_eq!(node.references().len(), 1);
    }

    #[test]
    fn test_aliased_leaf_keeps_raw_tag() {
        // 0x14 -> 0x0B -> 0x15
        let data = [0x14, 0x01, 0x34, 0x12, 1, 2, 3, 4];
        match decode_ok(&data) {
            Node::Leaf {
                raw_tag,
                tag,
                entries,
                ..
            } => {
                assert_eq!(raw_tag, 0x14);
                assert_eq!(tag, CanonicalTag::LinearLeaf2);
                assert_eq!(entries[0].key, 0x1234);
            }
            other => panic!("expected leaf, got {other:?}"),
        }
    }

    #[test]
    fn test_three_byte_leaves() {
        let linear = [0x16, 0x01, 0x03, 0x02, 0x01, 9, 9, 9, 9];
        match decode_ok(&linear) {
            Node::Leaf { entries, .. } => assert_eq!(entries[0].key, 0x01_0203),
            other => panic!("expected leaf, got {other:?}"),
        }

        let single = [0x19, 0x00, 0x01, 0x00, 0x01, 9, 9, 9, 9];
        match decode_ok(&single) {
            Node::Leaf { tag, entries, .. } => {
                assert_eq!(tag, CanonicalTag::Single3);
                assert_eq!(entries[0].key, 0x01_0001);
            }
            other => panic!("expected leaf, got {other:?}"),
        }

        let packed = [
            0x1A, 0x02, // packed, 2 entries
            0x01, 0x00, 0x00, 0x02, 0x00, 0x00, // keys
            1, 1, 1, 1, 2, 2, 2, 2, // values
        ];
        match decode_ok(&packed) {
            Node::Leaf { entries, .. } => {
                assert_eq!(entries.len(), 2);
                assert_eq!(entries[1].key, 2);
                assert_eq!(entries[1].value, raw([2, 2, 2, 2]));
            }
            other => panic!("expected leaf, got {other:?}"),
        }
    }

    #[test]
    fn test_variable_size_leaf() {
        let data = [
            0x1C, 0x02, // variable, 2 entries
            0x01, 0x02, 0xAA, 0xBB, //
            0x02, 0x04, 0x08, 0x03, 0x5B, 0x8A,
        ];
        match decode_ok(&data) {
            Node::Leaf { entries, .. } => {
                assert_eq!(entries[0].value, LeafValue::Bytes(vec![0xAA, 0xBB]));
                assert_eq!(
                    entries[1].value,
                    LeafValue::Reference(PropertyRef {
                        table_id: 0x5B,
                        property_index: 0x8A
                    })
                );
            }
            other => panic!("expected leaf, got {other:?}"),
        }
    }

    #[test]
    fn test_bitmap_branch_children_per_set_bit() {
        let data = [
            0x01, 0x00, 0b0000_0101, // bitmap-8 branch, bits 0 and 2
            0x08, 0x00, // null leaf
            0x18, 0x00, 0x07, 0x08, 0x03, 0x5E, 0xB6, // single entry holding a reference
        ];
        let node = decode_ok(&data);
        match &node {
            Node::Branch {
                index, children, ..
            } => {
                assert_eq!(index, &BranchIndex::Bitmap(vec![0b0000_0101]));
                assert_eq!(children.len(), 2);
            }
            other => panic!("expected branch, got {other:?}"),
        }
        assert_eq!(
            node.references(),
            vec![PropertyRef {
                table_id: 0x5E,
                property_index: 0xB6
            }]
        );
    }

    #[test]
    fn test_wide_bitmap_branch() {
        let mut data = vec![0x06, 0x00];
        let mut bitmap = [0u8; 32];
        bitmap[31] = 0x80;
        data.extend_from_slice(&bitmap);
        data.extend_from_slice(&[0x09, 0x00]);
        match decode_ok(&data) {
            Node::Branch { tag, children, .. } => {
                assert_eq!(tag, CanonicalTag::Bitmap256);
                assert_eq!(children.len(), 1);
            }
            other => panic!("expected branch, got {other:?}"),
        }
    }

    #[test]
    fn test_linear_and_clustered_branches() {
        let linear = [0x04, 0x02, 0x0A, 0x0B, 0x08, 0x00, 0x09, 0x00];
        match decode_ok(&linear) {
            Node::Branch {
                index, children, ..
            } => {
                assert_eq!(index, BranchIndex::Digits(vec![0x0A, 0x0B]));
                assert_eq!(children.len(), 2);
            }
            other => panic!("expected branch, got {other:?}"),
        }

        let clustered = [
            0x07, 0x02, // 2 clusters
            0x00, 0b11, 0x10, 0b1, // 3 set bits
            0x08, 0x00, 0x08, 0x00, 0x0A, 0x00,
        ];
        match decode_ok(&clustered) {
            Node::Branch {
                index, children, ..
            } => {
                assert_eq!(
                    index,
                    BranchIndex::Clusters(vec![
                        Cluster {
                            base: 0,
                            bitmap: 0b11
                        },
                        Cluster {
                            base: 0x10,
                            bitmap: 0b1
                        },
                    ])
                );
                assert_eq!(children.len(), 3);
            }
            other => panic!("expected branch, got {other:?}"),
        }
    }

    #[test]
    fn test_indirect_nodes_decode_target() {
        let data = [
            0x18, 0x00, 0x07, 0x11, 0x22, 0x33, 0x44, // single entry at 0
            0x0D, 0x00, // indirect to 0 via param
            0x13, 0x00, 0x00, 0x00, // indirect to 0 via u16
        ];
        let stream = NodeDecoder::default().decode_stream(&data, 0, 0);
        assert_eq!(stream.error, None);
        assert_eq!(stream.nodes.len(), 3);

        let (offset, second) = &stream.nodes[1];
        assert_eq!(*offset, 7);
        match second {
            Node::Indirect {
                index,
                target,
                node,
                ..
            } => {
                assert_eq!(*index, IndirectIndex::Param);
                assert_eq!(*target, 0);
                assert_eq!(**node, stream.nodes[0].1);
            }
            other => panic!("expected indirect, got {other:?}"),
        }
        assert!(matches!(
            stream.nodes[2].1,
            Node::Indirect {
                index: IndirectIndex::Wide,
                target: 0,
                ..
            }
        ));
    }

    #[test]
    fn test_forward_indirect_rejected() {
        let data = [0x08, 0x00, 0x0D, 0x02];
        let stream = NodeDecoder::default().decode_stream(&data, 0x40, 0);
        assert_eq!(stream.nodes.len(), 1);
        assert_eq!(
            stream.error,
            Some(NodeDecodeError::IndirectTarget {
                offset: 0x42,
                target: 2,
                reason: "target does not precede the indirect node",
            })
        );
    }

    /// `08 00` followed by `levels` bitmap-256 branches of 256 indirect
    /// children each. The first branch points every child at offset 0, each
    /// later branch at the branch before it.
    fn indirect_fan_out(levels: usize) -> (Vec<u8>, Vec<usize>) {
        let mut data = vec![0x08, 0x00];
        let mut starts: Vec<usize> = Vec::new();
        for _ in 0..levels {
            let start = data.len();
            data.extend_from_slice(&[0x06, 0x00]);
            data.extend_from_slice(&[0xFF; 32]);
            for _ in 0..256 {
                match starts.last() {
                    None => data.extend_from_slice(&[0x0D, 0x00]),
                    Some(&previous) => {
                        data.extend_from_slice(&[0x13, 0x00]);
                        data.extend_from_slice(&u16::try_from(previous).unwrap().to_le_bytes());
                    }
                }
            }
            starts.push(start);
        }
        (data, starts)
    }

    #[test]
    fn test_indirect_fan_out_hits_node_budget() {
        let (data, starts) = indirect_fan_out(3);
        assert_eq!(data.len(), 2664);

        let stream = NodeDecoder::default().decode_stream(&data, 0, 0);
        assert_eq!(stream.nodes.len(), 3);
        assert_eq!(stream.consumed, starts[2]);
        assert_eq!(stream.nodes[1].1.node_count(), 1 + 256 * 2);
        assert_eq!(stream.nodes[2].1.node_count(), 1 + 256 * (1 + 513));
        assert!(matches!(
            stream.error,
            Some(NodeDecodeError::NodeBudget {
                limit: DEFAULT_MAX_NODES,
                ..
            })
        ));
    }

    #[test]
    fn test_node_budget_is_shared_across_stream() {
        let (data, starts) = indirect_fan_out(2);

        let decoder = NodeDecoder::default().with_max_nodes(514);
        let stream = decoder.decode_stream(&data[..starts[1]], 0, 0);
        assert_eq!(stream.error, None);
        assert_eq!(stream.nodes.len(), 2);

        let decoder = NodeDecoder::default().with_max_nodes(600);
        let stream = decoder.decode_stream(&data, 0, 0);
        assert_eq!(stream.nodes.len(), 2);
        assert!(matches!(
            stream.error,
            Some(NodeDecodeError::NodeBudget { limit: 600, .. })
        ));
    }

    #[test]
    fn test_repeated_target_respects_depth_limit() {
        let data = [
            0x01, 0x00, 0x01, 0x08, 0x00, // branch with one null child
            0x0D, 0x00, // indirect to 0
            0x01, 0x00, 0x01, 0x0D, 0x00, // branch around an indirect to 0
        ];

        let stream = NodeDecoder::new(2, 8).decode_stream(&data, 0, 0);
        assert_eq!(stream.nodes.len(), 2);
        assert_eq!(
            stream.error,
            Some(NodeDecodeError::RecursionLimit {
                offset: 10,
                depth: 2
            })
        );

        let stream = NodeDecoder::new(3, 8).decode_stream(&data, 0, 0);
        assert_eq!(stream.error, None);
        match &stream.nodes[2].1 {
            Node::Branch { children, .. } => match &children[0] {
                Node::Indirect { node, .. } => assert_eq!(**node, stream.nodes[0].1),
                other => panic!("expected indirect, got {other:?}"),
            },
            other => panic!("expected branch, got {other:?}"),
        }
        assert_eq!(stream.nodes[2].1.height(), 3);
    }

    #[test]
    fn test_recursion_limit() {
        let data = [
            0x01, 0x00, 0x01, //
            0x01, 0x00, 0x01, //
            0x01, 0x00, 0x01, //
            0x08, 0x00,
        ];
        let mut cursor = ByteCursor::new(&data);
        assert_eq!(
            NodeDecoder::new(2, 8).decode(&mut cursor),
            Err(NodeDecodeError::RecursionLimit {
                offset: 9,
                depth: 2
            })
        );

        let mut cursor = ByteCursor::new(&data);
        assert!(NodeDecoder::new(3, 8).decode(&mut cursor).is_ok());
    }

    #[test]
    fn test_unknown_tag_and_truncation() {
        let (result, _) = decode(&[0x05, 0x00]);
        assert_eq!(
            result,
            Err(NodeDecodeError::UnknownTag {
                offset: 0,
                raw: 0x05,
                normalized: 0x05
            })
        );

        let (result, _) = decode(&[0x15, 0x02, 0x01, 0x00]);
        assert!(matches!(result, Err(NodeDecodeError::Truncated(_))));

        let (result, _) = decode(&[0x08]);
        assert!(matches!(result, Err(NodeDecodeError::Truncated(_))));
    }

    #[test]
    fn test_stream_stops_at_first_error() {
        let data = [0x08, 0x00, 0x09, 0x00, 0xFF, 0x00, 0x08, 0x00];
        let stream = NodeDecoder::default().decode_stream(&data, 100, 0);
        assert_eq!(stream.nodes.len(), 2);
        assert_eq!(stream.consumed, 4);
        assert_eq!(stream.nodes[1].0, 102);
        assert!(matches!(
            stream.error,
            Some(NodeDecodeError::UnknownTag { offset: 104, .. })
        ));
    }

    #[test]
    fn test_stream_start_offset() {
        let data = [0xEE, 0xEE, 0x08, 0x00];
        let stream = NodeDecoder::default().decode_stream(&data, 0, 2);
        assert_eq!(stream.error, None);
        assert_eq!(stream.nodes.len(), 1);
        assert_eq!(stream.nodes[0].0, 2);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Arbitrary input never panics and decoded nodes never extend
            /// past the buffer
            #[test]
            fn decode_is_bounds_safe(data in proptest::collection::vec(any::<u8>(), 0..512)) {
                let mut cursor = ByteCursor::new(&data);
                let decoder = NodeDecoder::new(8, 8);
                while !cursor.is_empty() {
                    if decoder.decode(&mut cursor).is_err() {
                        break;
                    }
                    prop_assert!(cursor.position() <= data.len());
                }
            }

            /// Any table reference value round-trips through the decoder
            #[test]
            fn table_ref_fields(table_id in any::<u8>(), property_index in any::<u8>()) {
                let data = [0x08, 0x03, table_id, property_index];
                let mut cursor = ByteCursor::new(&data);
                let node = NodeDecoder::default().decode(&mut cursor).unwrap();
                prop_assert_eq!(node, Node::Reference { reference: PropertyRef { table_id, property_index } });
                prop_assert_eq!(cursor.position(), 4);
            }
        }
    }
}
