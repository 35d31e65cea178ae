//! Table reference resolution

use super::{RegistryError, RegistryResult, TableSlot, TypeRegistry, TypeTableEntry};
use serde::Serialize;

/// Result of resolving a table reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    /// Full-format type hash of the table
    pub type_hash: u32,
    /// Property index, passed through unchanged
    pub property_index: u8,
    /// Property name when the registry schema provides one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property_name: Option<String>,
}

/// Maps compact table references onto registry types
#[derive(Debug, Clone, Copy)]
pub struct TableResolver<'r> {
    registry: &'r TypeRegistry,
}

impl<'r> TableResolver<'r> {
    /// Create a resolver over a loaded registry
    pub fn new(registry: &'r TypeRegistry) -> Self {
        Self { registry }
    }

    /// The underlying registry
    pub fn registry(&self) -> &'r TypeRegistry {
        self.registry
    }

    /// Registry entry addressed by a table descriptor word
    pub fn entry(&self, word: u32) -> RegistryResult<&'r TypeTableEntry> {
        let slot = TableSlot::from_word(word);
        self.registry
            .lookup(slot)
            .ok_or(RegistryError::UnknownTableId {
                word,
                bucket: slot.bucket,
                entry: slot.entry,
            })
    }

    /// Resolve a `(table_id, property_index)` reference
    pub fn resolve(&self, table_id: u8, property_index: u8) -> RegistryResult<Resolution> {
        let entry = self.entry(u32::from(table_id))?;
        Ok(Resolution {
            type_hash: entry.type_hash,
            property_index,
            property_name: entry.property_name(property_index).map(str::to_owned),
        })
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn registry() -> TypeRegistry {
        TypeRegistry::from_entries([
            TypeTableEntry::new(0x5E, 0x0DEB_ED19, 4).with_property_name(0xB6, "Flags"),
            TypeTableEntry::new(0x5B, 0xC876_1736, 2),
        ])
        .unwrap()
    }

    #[test]
    fn test_resolve_known_table() {
        let registry = registry();
        let resolver = TableResolver::new(&registry);

        assert_eq!(
            resolver.resolve(0x5E, 0xB6).unwrap(),
            Resolution {
                type_hash: 0x0DEB_ED19,
                property_index: 0xB6,
                property_name: Some("Flags".to_string()),
            }
        );
        assert_eq!(
            resolver.resolve(0x5B, 0x8A).unwrap(),
            Resolution {
                type_hash: 0xC876_1736,
                property_index: 0x8A,
                property_name: None,
            }
        );
    }

    #[test]
    fn test_unknown_table_reports_slot() {
        let registry = registry();
        let resolver = TableResolver::new(&registry);

        match resolver.resolve(0x5F, 0) {
            Err(RegistryError::UnknownTableId {
                word,
                bucket,
                entry,
            }) => {
                assert_eq!(word, 0x5F);
                assert_eq!(bucket, 0);
                assert_eq!(entry, 0x5E);
            }
            other => panic!("expected UnknownTableId, got {other:?}"),
        }
    }

    #[test]
    fn test_table_id_zero_is_unknown() {
        let registry = registry();
        let resolver = TableResolver::new(&registry);
        assert!(matches!(
            resolver.resolve(0, 0),
            Err(RegistryError::UnknownTableId { .. })
        ));
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let registry = registry();
        let resolver = TableResolver::new(&registry);
        let first = resolver.resolve(0x5E, 0xB6).unwrap();
        let second = resolver.resolve(0x5E, 0xB6).unwrap();
        assert_eq!(first, second);
    }
}
