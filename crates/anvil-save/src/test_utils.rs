//! Synthetic block and file builders for unit tests

use crate::compact::GAP_TERMINATOR;
use crate::config::DEFAULT_FULL_FORMAT_MAGIC;
use crate::container::{FILE_MAGIC, FILE_SIGNATURE};

/// Builds compact blocks region by region
#[derive(Debug, Default)]
pub struct CompactBlockBuilder {
    regions: Vec<(u32, Vec<u8>)>,
    trailing_gap: bool,
}

impl CompactBlockBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Region whose declared size matches its payload
    pub fn region(self, payload: Vec<u8>) -> Self {
        let declared = payload.len() as u32;
        self.declared_region(declared, payload)
    }

    /// Region with an explicit declared size
    pub fn declared_region(mut self, declared: u32, payload: Vec<u8>) -> Self {
        self.regions.push((declared, payload));
        self
    }

    /// Region carrying reserved bytes past its declared size
    pub fn growth_region(self, declared: u32, payload: Vec<u8>) -> Self {
        assert!(payload.len() > declared as usize);
        self.declared_region(declared, payload)
    }

    /// Close the block with a gap
    pub fn trailing_gap(mut self) -> Self {
        self.trailing_gap = true;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for (index, (declared, payload)) in self.regions.iter().enumerate() {
            if index > 0 {
                push_gap(&mut out, index);
            }
            push_header(&mut out, *declared);
            out.extend_from_slice(payload);
        }
        if self.regions.is_empty() {
            push_header(&mut out, 0);
        }
        if self.trailing_gap {
            push_gap(&mut out, self.regions.len());
        }
        out
    }
}

/// Compact header or sub-header
pub fn push_header(out: &mut Vec<u8>, declared: u32) {
    out.push(0x01);
    out.extend_from_slice(&declared.to_le_bytes()[..3]);
    out.extend_from_slice(&[0x00, 0x00, 0x80, 0x00]);
}

fn push_gap(out: &mut Vec<u8>, index: usize) {
    out.push(0x01);
    out.extend_from_slice(&(index as u16).to_le_bytes());
    out.extend_from_slice(&GAP_TERMINATOR.to_le_bytes());
}

/// Full-format block with a valid header around `payload`
///
/// `decompressed_size` equal to the payload length marks the block as
/// stored.
pub fn full_format_block(payload: &[u8], decompressed_size: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(44 + payload.len());
    out.extend_from_slice(&DEFAULT_FULL_FORMAT_MAGIC.to_le_bytes());
    out.extend_from_slice(&[0u8; 28]);
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&decompressed_size.to_le_bytes());
    out.extend_from_slice(&adler::adler32_slice(payload).to_le_bytes());
    out.extend_from_slice(payload);
    out
}

/// Outer save file wrapping `blocks`
pub fn save_file(blocks: &[Vec<u8>]) -> Vec<u8> {
    let mut out = vec![FILE_SIGNATURE];
    out.extend_from_slice(&FILE_MAGIC.to_le_bytes());
    out.extend_from_slice(&(blocks.len() as u32).to_le_bytes());
    for block in blocks {
        out.extend_from_slice(&(block.len() as u32).to_le_bytes());
        out.extend_from_slice(block);
    }
    out
}
