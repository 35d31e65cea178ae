//! Compact-format type registry
//!
//! Compact blocks address their types through 1-byte table ids instead of
//! 4-byte type hashes. The registry maps those ids onto the type table the
//! game carries: a set of buckets, each holding up to `0x3FFF` entries of
//! `{type_hash, property_count}`. A table descriptor word selects its slot
//! with
//!
//! ```text
//! raw    = word & 0xC3FFFFFF
//! id     = raw - 1            (wrapping)
//! bucket = id >> 14
//! entry  = id & 0x3FFF
//! ```
//!
//! The registry is loaded once from an external descriptor (JSON or the
//! binary bucket/entry dump, see [`descriptor`]) and is read-only afterwards,
//! so a single instance can be shared by reference across block decodes.

pub mod descriptor;
mod error;
mod json;
mod resolver;

pub use error::{RegistryError, RegistryResult};
pub use json::{HashValue, RegistryDocument, TableRecord};
pub use resolver::{Resolution, TableResolver};

use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// Bits of a table descriptor word that participate in slot selection
pub const TABLE_WORD_MASK: u32 = 0xC3FF_FFFF;

/// Mask applied to entry indices and bucket entry counts
pub const ENTRY_INDEX_MASK: u32 = 0x3FFF;

/// Shift separating the bucket index from the entry index
pub const BUCKET_SHIFT: u32 = 14;

/// Bucket/entry pair selected by a table descriptor word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TableSlot {
    /// Bucket index
    pub bucket: u32,
    /// Entry index within the bucket
    pub entry: u32,
}

impl TableSlot {
    /// Split a table descriptor word into its bucket and entry
    pub fn from_word(word: u32) -> Self {
        let id = (word & TABLE_WORD_MASK).wrapping_sub(1);
        Self {
            bucket: id >> BUCKET_SHIFT,
            entry: id & ENTRY_INDEX_MASK,
        }
    }

    /// Table word that selects this slot (inverse of [`TableSlot::from_word`])
    pub fn to_word(self) -> u32 {
        ((self.bucket << BUCKET_SHIFT) | self.entry).wrapping_add(1)
    }
}

/// One type table entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeTableEntry {
    /// Table descriptor word addressing this entry
    pub table_id: u32,
    /// Full-format type hash
    pub type_hash: u32,
    /// Number of properties declared by the type
    pub property_count: u32,
    /// Optional type name from the descriptor
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Optional property names keyed by compact property index
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub property_names: BTreeMap<u8, String>,
}

impl TypeTableEntry {
    /// Create an entry without schema names
    pub fn new(table_id: u32, type_hash: u32, property_count: u32) -> Self {
        Self {
            table_id,
            type_hash,
            property_count,
            name: None,
            property_names: BTreeMap::new(),
        }
    }

    /// Attach a type name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Attach a property name
    pub fn with_property_name(mut self, index: u8, name: impl Into<String>) -> Self {
        self.property_names.insert(index, name.into());
        self
    }

    /// Name of a property, if the descriptor provided one
    pub fn property_name(&self, index: u8) -> Option<&str> {
        self.property_names.get(&index).map(String::as_str)
    }
}

/// One bucket of the type table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeBucket {
    /// Declared entry count (already masked with `0x3FFF`)
    pub declared_count: u32,
    /// Entries indexed by entry index; vacant slots are `None`
    pub entries: Vec<Option<TypeTableEntry>>,
}

impl TypeBucket {
    fn get(&self, entry: u32) -> Option<&TypeTableEntry> {
        if entry >= self.declared_count & ENTRY_INDEX_MASK {
            return None;
        }
        self.entries.get(entry as usize).and_then(Option::as_ref)
    }
}

/// Read-only table of compact-format types
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    buckets: BTreeMap<u32, TypeBucket>,
    type_hashes: HashSet<u32>,
}

impl TypeRegistry {
    /// Create an empty registry (every lookup fails)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a registry from fully formed buckets keyed by bucket index
    pub fn from_buckets(buckets: BTreeMap<u32, TypeBucket>) -> Self {
        let type_hashes = buckets
            .values()
            .flat_map(|b| b.entries.iter().flatten())
            .map(|e| e.type_hash)
            .collect();
        Self {
            buckets,
            type_hashes,
        }
    }

    /// Build a registry by slotting each entry according to its table id
    ///
    /// Entries whose masked table word is zero address no slot and are
    /// skipped with a warning.
    pub fn from_entries<I>(entries: I) -> RegistryResult<Self>
    where
        I: IntoIterator<Item = TypeTableEntry>,
    {
        let mut buckets: BTreeMap<u32, TypeBucket> = BTreeMap::new();

        for entry in entries {
            if entry.table_id & TABLE_WORD_MASK == 0 {
                tracing::warn!(
                    "Skipping type table entry 0x{:08X}: table id 0x{:X} does not address a slot",
                    entry.type_hash,
                    entry.table_id
                );
                continue;
            }

            let slot = TableSlot::from_word(entry.table_id);
            if slot.entry == ENTRY_INDEX_MASK {
                return Err(RegistryError::InvalidDescriptor(format!(
                    "table id 0x{:X} selects the reserved entry index 0x3FFF",
                    entry.table_id
                )));
            }

            let bucket = buckets.entry(slot.bucket).or_default();
            let index = slot.entry as usize;
            if bucket.entries.len() <= index {
                bucket.entries.resize(index + 1, None);
            }
            if bucket.entries[index].is_some() {
                return Err(RegistryError::DuplicateTableId(entry.table_id));
            }
            bucket.entries[index] = Some(entry);
            bucket.declared_count = bucket.declared_count.max(slot.entry + 1);
        }

        Ok(Self::from_buckets(buckets))
    }

    /// Load a JSON descriptor from a string
    pub fn from_json_str(json: &str) -> RegistryResult<Self> {
        let document: RegistryDocument = serde_json::from_str(json)?;
        document.into_registry()
    }

    /// Load a JSON descriptor from a reader
    pub fn from_json_reader<R: std::io::Read>(reader: R) -> RegistryResult<Self> {
        let document: RegistryDocument = serde_json::from_reader(reader)?;
        document.into_registry()
    }

    /// Load a binary bucket/entry descriptor
    pub fn from_descriptor(data: &[u8]) -> RegistryResult<Self> {
        descriptor::parse_descriptor(data)
    }

    /// Load a descriptor file; `.json` files are parsed as JSON, anything
    /// else as the binary descriptor
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> RegistryResult<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|source| RegistryError::LoadFailed {
            path: path.to_path_buf(),
            source,
        })?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let registry = if is_json {
            Self::from_json_reader(data.as_slice())?
        } else {
            Self::from_descriptor(&data)?
        };

        tracing::debug!(
            "Loaded type registry from {}: {} entries in {} buckets",
            path.display(),
            registry.len(),
            registry.bucket_count()
        );

        Ok(registry)
    }

    /// Entry at an explicit bucket/entry pair
    pub fn lookup(&self, slot: TableSlot) -> Option<&TypeTableEntry> {
        self.buckets.get(&slot.bucket)?.get(slot.entry)
    }

    /// Entry addressed by a table descriptor word
    pub fn lookup_word(&self, word: u32) -> Option<&TypeTableEntry> {
        self.lookup(TableSlot::from_word(word))
    }

    /// Whether any entry carries this type hash
    pub fn contains_type_hash(&self, type_hash: u32) -> bool {
        self.type_hashes.contains(&type_hash)
    }

    /// Number of populated entries
    pub fn len(&self) -> usize {
        self.buckets
            .values()
            .map(|b| b.entries.iter().flatten().count())
            .sum()
    }

    /// Whether the registry has no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of buckets
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Iterate populated entries in bucket/entry order
    pub fn entries(&self) -> impl Iterator<Item = &TypeTableEntry> {
        self.buckets.values().flat_map(|b| b.entries.iter().flatten())
    }
}
