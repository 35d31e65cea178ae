//! Decoder configuration
//!
//! Limits that guarantee termination on adversarial input, plus the few
//! discriminators that differ between game builds. Defaults match the
//! retail save layout.

use serde::{Deserialize, Serialize};

/// Default bound on branch/indirect node recursion
pub const DEFAULT_MAX_NODE_DEPTH: usize = 32;

/// Default cap on tag normalization rewrites per node
pub const DEFAULT_MAX_NORMALIZATION_PASSES: u8 = 8;

/// Default cap on nodes materialized from one region's node stream
pub const DEFAULT_MAX_NODES: usize = 1 << 18;

/// Default window scanned past a declared region end for the next boundary
pub const DEFAULT_GAP_LOOKAHEAD: usize = 64 * 1024;

/// Full-format block magic (`33 AA FB 57` on disk)
pub const DEFAULT_FULL_FORMAT_MAGIC: u32 = 0x57FB_AA33;

/// Save decoder configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Maximum recursion depth for composite nodes
    pub max_node_depth: usize,
    /// Maximum normalization rewrites applied to one raw tag
    pub max_normalization_passes: u8,
    /// Maximum nodes materialized per region, indirect copies included
    pub max_nodes: usize,
    /// Bytes scanned past a declared region end before framing gives up
    pub gap_lookahead: usize,
    /// Verify Adler-32 checksums in full-format headers and cross-block descriptors
    pub verify_checksums: bool,
    /// Little-endian magic identifying full-format blocks
    pub full_format_magic: u32,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            max_node_depth: DEFAULT_MAX_NODE_DEPTH,
            max_normalization_passes: DEFAULT_MAX_NORMALIZATION_PASSES,
            max_nodes: DEFAULT_MAX_NODES,
            gap_lookahead: DEFAULT_GAP_LOOKAHEAD,
            verify_checksums: true,
            full_format_magic: DEFAULT_FULL_FORMAT_MAGIC,
        }
    }
}

impl DecoderConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Set maximum node recursion depth
    pub fn with_max_node_depth(mut self, depth: usize) -> Self {
        self.max_node_depth = depth;
        self
    }

    /// Set maximum normalization passes
    pub fn with_max_normalization_passes(mut self, passes: u8) -> Self {
        self.max_normalization_passes = passes;
        self
    }

    /// Set the per-region node budget
    pub fn with_max_nodes(mut self, nodes: usize) -> Self {
        self.max_nodes = nodes;
        self
    }

    /// Set the region boundary lookahead window
    pub fn with_gap_lookahead(mut self, window: usize) -> Self {
        self.gap_lookahead = window;
        self
    }

    /// Enable or disable checksum verification
    pub fn with_verify_checksums(mut self, verify: bool) -> Self {
        self.verify_checksums = verify;
        self
    }

    /// Set the full-format block magic
    pub fn with_full_format_magic(mut self, magic: u32) -> Self {
        self.full_format_magic = magic;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_node_depth == 0 {
            return Err("max_node_depth must be greater than 0".to_string());
        }

        if self.max_normalization_passes == 0 {
            return Err("max_normalization_passes must be greater than 0".to_string());
        }

        if self.max_nodes == 0 {
            return Err("max_nodes must be greater than 0".to_string());
        }

        if self.gap_lookahead == 0 {
            return Err("gap_lookahead must be greater than 0".to_string());
        }

        Ok(())
    }
}
