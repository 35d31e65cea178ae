//! Binary registry descriptor
//!
//! A little-endian dump of the game's type table:
//!
//! ```text
//! u32              bucket_count
//! BucketRecord[n]  12 bytes each
//!   u32 count_word      entry count in the low 14 bits
//!   u32 entries_offset  absolute offset of the first entry
//!   u32 reserved
//! ...
//! EntryRecord      16 bytes each, `count` per bucket
//!   u32 type_hash       0 marks a vacant slot
//!   u32 property_count
//!   u32[2] extra
//! ```

use super::{
    ENTRY_INDEX_MASK, RegistryError, RegistryResult, TableSlot, TypeBucket, TypeRegistry,
    TypeTableEntry,
};
use binrw::BinRead;
use binrw::io::{Cursor, Seek, SeekFrom};
use std::collections::BTreeMap;

/// Size of a bucket record
pub const BUCKET_RECORD_SIZE: usize = 12;

/// Size of an entry record
pub const ENTRY_RECORD_SIZE: usize = 16;

/// Bucket record
#[derive(BinRead, Debug, Clone, Copy, PartialEq, Eq)]
#[br(little)]
pub struct BucketRecord {
    /// Entry count in the low 14 bits
    pub count_word: u32,
    /// Absolute offset of the bucket's first entry
    pub entries_offset: u32,
    /// Unused
    pub reserved: u32,
}

impl BucketRecord {
    /// Masked entry count
    pub fn entry_count(&self) -> u32 {
        self.count_word & ENTRY_INDEX_MASK
    }
}

/// Entry record
#[derive(BinRead, Debug, Clone, Copy, PartialEq, Eq)]
#[br(little)]
pub struct EntryRecord {
    /// Type hash, zero for vacant slots
    pub type_hash: u32,
    /// Declared property count
    pub property_count: u32,
    /// Unused by the decoder
    pub extra: [u32; 2],
}

/// Parse a binary descriptor into a registry
pub fn parse_descriptor(data: &[u8]) -> RegistryResult<TypeRegistry> {
    let mut reader = Cursor::new(data);
    let bucket_count = u32::read_le(&mut reader)? as usize;

    let table_end = bucket_count
        .checked_mul(BUCKET_RECORD_SIZE)
        .and_then(|n| n.checked_add(4))
        .ok_or_else(|| invalid(format!("bucket count {bucket_count} overflows")))?;
    if table_end > data.len() {
        return Err(invalid(format!(
            "{bucket_count} bucket records need {table_end} bytes, descriptor has {}",
            data.len()
        )));
    }

    let mut records = Vec::with_capacity(bucket_count);
    for _ in 0..bucket_count {
        records.push(BucketRecord::read(&mut reader)?);
    }

    let mut buckets = BTreeMap::new();
    for (index, record) in records.iter().enumerate() {
        let count = record.entry_count();
        let start = record.entries_offset as usize;
        let end = start + count as usize * ENTRY_RECORD_SIZE;
        if end > data.len() {
            return Err(invalid(format!(
                "bucket {index} entries [{start}, {end}) exceed descriptor size {}",
                data.len()
            )));
        }

        reader
            .seek(SeekFrom::Start(start as u64))
            .map_err(binrw::Error::from)?;
        let mut entries = Vec::with_capacity(count as usize);
        for entry in 0..count {
            let raw = EntryRecord::read(&mut reader)?;
            if raw.type_hash == 0 {
                entries.push(None);
                continue;
            }
            let slot = TableSlot {
                bucket: index as u32,
                entry,
            };
            entries.push(Some(TypeTableEntry::new(
                slot.to_word(),
                raw.type_hash,
                raw.property_count,
            )));
        }

        buckets.insert(
            index as u32,
            TypeBucket {
                declared_count: count,
                entries,
            },
        );
    }

    let registry = TypeRegistry::from_buckets(buckets);
    tracing::trace!(
        "Parsed binary registry descriptor: {} buckets, {} entries",
        registry.bucket_count(),
        registry.len()
    );
    Ok(registry)
}

fn invalid(message: String) -> RegistryError {
    RegistryError::InvalidDescriptor(message)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn descriptor_bytes() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&2u32.to_le_bytes());
        // Bucket 0: 3 entries at offset 28
        data.extend_from_slice(&3u32.to_le_bytes());
        data.extend_from_slice(&28u32.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());
        // Bucket 1: count word with high flag bits, 1 entry at offset 76
        data.extend_from_slice(&(0x8000_4000u32 | 1).to_le_bytes());
        data.extend_from_slice(&76u32.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());
        for (hash, props) in [(0x1111_1111u32, 2u32), (0, 0), (0x3333_3333, 7), (0x4444_4444, 1)] {
            data.extend_from_slice(&hash.to_le_bytes());
            data.extend_from_slice(&props.to_le_bytes());
            data.extend_from_slice(&[0u8; 8]);
        }
        data
    }

    #[test]
    fn test_parse_buckets_and_vacant_slots() {
        let registry = parse_descriptor(&descriptor_bytes()).unwrap();

        assert_eq!(registry.bucket_count(), 2);
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.lookup_word(1).unwrap().type_hash, 0x1111_1111);
        assert!(registry.lookup_word(2).is_none());
        assert_eq!(registry.lookup_word(3).unwrap().property_count, 7);
        // Bucket 1 entry 0 is word 0x4001
        assert_eq!(registry.lookup_word(0x4001).unwrap().type_hash, 0x4444_4444);
        assert!(registry.lookup_word(0x4002).is_none());
    }

    #[test]
    fn test_truncated_bucket_table_rejected() {
        let data = [0xFF, 0xFF, 0x00, 0x00, 0x01];
        assert!(matches!(
            parse_descriptor(&data),
            Err(RegistryError::InvalidDescriptor(_))
        ));
    }

    #[test]
    fn test_entries_out_of_range_rejected() {
        let mut data = descriptor_bytes();
        data.truncate(80);
        assert!(matches!(
            parse_descriptor(&data),
            Err(RegistryError::InvalidDescriptor(_))
        ));
    }
}
