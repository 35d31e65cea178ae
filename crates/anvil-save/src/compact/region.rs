//! Region framing
//!
//! A compact block is a chain of declared regions:
//!
//! ```text
//! [header 8] [region 0] ([gap 5] [sub-header 8] [region n])* [gap 5]?
//! ```
//!
//! Declared sizes do not always match the bytes that follow. Some regions
//! carry pre-allocated growth space past their declared size, and some
//! declare the size of a different block while holding only a 5-byte
//! descriptor. The framer never trusts a declared size on its own: it
//! locates the next boundary (a terminated gap followed by a sub-header, or
//! the end of the block) and classifies the region by the measured distance.

use super::error::RegionFramingError;
use super::header::{COMPACT_HEADER_SIZE, CompactHeader, GAP_SIZE, Gap};
use crate::config::DEFAULT_GAP_LOOKAHEAD;
use serde::{Serialize, Serializer};
use tracing::{debug, trace};

/// Size of a cross-block reference descriptor
pub const DESCRIPTOR_SIZE: usize = GAP_SIZE;

/// Opaque 5-byte payload of a cross-block reference region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CrossBlockDescriptor(pub [u8; DESCRIPTOR_SIZE]);

impl CrossBlockDescriptor {
    /// Raw descriptor bytes
    pub fn bytes(&self) -> &[u8; DESCRIPTOR_SIZE] {
        &self.0
    }

    /// Adler-32 of the referenced block, for descriptors of the `00 <u32>` form
    pub fn checksum(&self) -> Option<u32> {
        let [kind, a, b, c, d] = self.0;
        (kind == 0).then(|| u32::from_le_bytes([a, b, c, d]))
    }
}

impl Serialize for CrossBlockDescriptor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

/// How a region's measured size relates to its declared size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RegionKind {
    /// Measured size equals declared size
    Normal,
    /// Measured size exceeds declared size; extra bytes are reserved space
    GrowthBuffer,
    /// Region holds a descriptor pointing at another block of the declared size
    CrossBlockRef(CrossBlockDescriptor),
}

impl RegionKind {
    /// Classify a region from its declared size and measured payload
    ///
    /// Returns `None` for a short payload that is not a 5-byte descriptor.
    pub fn classify(declared: u32, payload: &[u8]) -> Option<Self> {
        let declared = declared as usize;
        let actual = payload.len();
        if actual == declared {
            Some(Self::Normal)
        } else if actual > declared {
            Some(Self::GrowthBuffer)
        } else if actual == DESCRIPTOR_SIZE {
            let mut descriptor = [0u8; DESCRIPTOR_SIZE];
            descriptor.copy_from_slice(payload);
            Some(Self::CrossBlockRef(CrossBlockDescriptor(descriptor)))
        } else {
            None
        }
    }

    /// Short name for logs and reports
    pub fn name(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::GrowthBuffer => "growth",
            Self::CrossBlockRef(_) => "cross-block-ref",
        }
    }
}

/// One framed region
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region<'a> {
    /// Position in the block's region chain
    pub index: usize,
    /// Offset of the header that declared this region (0 for region 0)
    pub header_offset: usize,
    /// Offset of the first payload byte
    pub payload_offset: usize,
    /// Size declared by the header
    pub declared_size: u32,
    /// Classification
    pub kind: RegionKind,
    /// Gap preceding the sub-header (`None` for region 0)
    pub gap: Option<Gap>,
    /// Measured payload
    pub payload: &'a [u8],
}

impl<'a> Region<'a> {
    /// Measured payload size
    pub fn actual_size(&self) -> usize {
        self.payload.len()
    }

    /// Bytes that hold node data
    ///
    /// For growth regions this is the declared prefix; cross-block references
    /// hold no node data.
    pub fn node_bytes(&self) -> &'a [u8] {
        match self.kind {
            RegionKind::Normal => self.payload,
            RegionKind::GrowthBuffer => &self.payload[..self.declared_size as usize],
            RegionKind::CrossBlockRef(_) => &[],
        }
    }

    /// Reserved bytes past the declared size of a growth region
    pub fn growth_bytes(&self) -> &'a [u8] {
        match self.kind {
            RegionKind::GrowthBuffer => &self.payload[self.declared_size as usize..],
            _ => &[],
        }
    }
}

/// Regions of one compact block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionLayout<'a> {
    /// Regions in block order
    pub regions: Vec<Region<'a>>,
    /// Gap closing the block, when present
    pub trailing_gap: Option<Gap>,
}

/// What follows a region's payload
enum Boundary {
    End,
    Trailing(Gap),
    Next { gap: Gap, header_offset: usize },
}

/// Splits compact blocks into regions
#[derive(Debug, Clone, Copy)]
pub struct RegionFramer {
    gap_lookahead: usize,
}

impl Default for RegionFramer {
    fn default() -> Self {
        Self::new(DEFAULT_GAP_LOOKAHEAD)
    }
}

impl RegionFramer {
    /// Create a framer that scans at most `gap_lookahead` bytes past a
    /// declared region end
    pub fn new(gap_lookahead: usize) -> Self {
        Self { gap_lookahead }
    }

    /// Frame every region of a compact block
    ///
    /// `block` is the whole block including its 8-byte header; offsets in
    /// the result are relative to the block start.
    pub fn frame<'a>(
        &self,
        block: &'a [u8],
        header: &CompactHeader,
    ) -> Result<RegionLayout<'a>, RegionFramingError> {
        let end = block.len();
        let mut regions = Vec::new();
        let mut header_offset = 0;
        let mut start = COMPACT_HEADER_SIZE.min(end);
        let mut declared = header.declared_size;
        let mut gap = None;

        loop {
            let index = regions.len();
            let payload_end = self.measure(block, index, start, declared)?;
            let payload = &block[start..payload_end];
            let kind = RegionKind::classify(declared, payload).ok_or(
                RegionFramingError::Truncated {
                    region: index,
                    declared,
                    available: end - start,
                },
            )?;

            trace!(
                "Region {} at {}: declared {}, actual {}, {}",
                index,
                start,
                declared,
                payload.len(),
                kind.name()
            );

            regions.push(Region {
                index,
                header_offset,
                payload_offset: start,
                declared_size: declared,
                kind,
                gap,
                payload,
            });

            match self.boundary_at(block, payload_end)? {
                Boundary::End => {
                    return Ok(RegionLayout {
                        regions,
                        trailing_gap: None,
                    });
                }
                Boundary::Trailing(closing) => {
                    return Ok(RegionLayout {
                        regions,
                        trailing_gap: Some(closing),
                    });
                }
                Boundary::Next {
                    gap: next_gap,
                    header_offset: next_header,
                } => {
                    let sub_header = CompactHeader::read_sub_header(block, next_header)?;
                    gap = Some(next_gap);
                    header_offset = next_header;
                    start = next_header + COMPACT_HEADER_SIZE;
                    declared = sub_header.declared_size;
                }
            }
        }
    }

    /// Find where the payload of a region starting at `start` really ends
    fn measure(
        &self,
        block: &[u8],
        region: usize,
        start: usize,
        declared: u32,
    ) -> Result<usize, RegionFramingError> {
        let end = block.len();
        let declared_end = start + declared as usize;

        // Declared size lands on the end of the block, a trailing gap, or a
        // gap before the next sub-header. The gap itself is checked when the
        // boundary is consumed, so a bad terminator fails loudly here.
        if declared_end == end
            || declared_end + GAP_SIZE == end
            || CompactHeader::is_sub_header_at(block, declared_end + GAP_SIZE)
        {
            return Ok(declared_end);
        }

        let descriptor_end = start + DESCRIPTOR_SIZE;
        if declared as usize > DESCRIPTOR_SIZE && self.is_boundary(block, descriptor_end) {
            return Ok(descriptor_end);
        }

        if declared_end < end {
            let limit = declared_end.saturating_add(self.gap_lookahead).min(end);
            if let Some(found) = (declared_end + 1..=limit).find(|&q| self.is_boundary(block, q)) {
                debug!(
                    "Region {} declares {} bytes but extends {} bytes further",
                    region,
                    declared,
                    found - declared_end
                );
                return Ok(found);
            }
            return Err(RegionFramingError::Unterminated {
                region,
                offset: declared_end,
                declared,
                window: self.gap_lookahead,
            });
        }

        Err(RegionFramingError::Truncated {
            region,
            declared,
            available: end - start,
        })
    }

    /// Whether a region may end at `pos`
    fn is_boundary(&self, block: &[u8], pos: usize) -> bool {
        let end = block.len();
        if pos == end {
            return true;
        }
        let Some(gap) = Gap::read_at(block, pos) else {
            return false;
        };
        gap.is_terminated()
            && (pos + GAP_SIZE == end || CompactHeader::is_sub_header_at(block, pos + GAP_SIZE))
    }

    /// Consume what follows a region payload ending at `pos`
    fn boundary_at(&self, block: &[u8], pos: usize) -> Result<Boundary, RegionFramingError> {
        let end = block.len();
        if pos >= end {
            return Ok(Boundary::End);
        }

        let gap = Gap::read_at(block, pos).ok_or_else(|| RegionFramingError::SubHeader {
            offset: pos,
            reason: format!("{} bytes left, expected a gap", end - pos),
        })?;
        gap.check(pos)?;

        let header_offset = pos + GAP_SIZE;
        if header_offset == end {
            Ok(Boundary::Trailing(gap))
        } else {
            Ok(Boundary::Next { gap, header_offset })
        }
    }
}
