//! JSON registry descriptor
//!
//! ```json
//! {
//!   "tables": [
//!     { "table_id": 94, "type_hash": "0x0DEBED19", "property_count": 4,
//!       "name": "PlayerOptionsSaveData", "properties": { "182": "Flags" } }
//!   ]
//! }
//! ```
//!
//! `type_hash` accepts either a JSON number or a `0x`-prefixed hex string,
//! since dumped tables are usually written in hex.

use super::{RegistryError, RegistryResult, TypeRegistry, TypeTableEntry};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Top-level JSON descriptor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryDocument {
    /// Table records
    pub tables: Vec<TableRecord>,
}

/// One table record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRecord {
    /// Table descriptor word
    pub table_id: u32,
    /// Type hash, as a number or hex string
    pub type_hash: HashValue,
    /// Declared property count
    #[serde(default)]
    pub property_count: u32,
    /// Type name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Property names keyed by property index
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<u8, String>,
}

/// Type hash as it appears in JSON
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HashValue {
    /// Plain integer
    Number(u32),
    /// Hex string, with or without `0x`
    Text(String),
}

impl HashValue {
    fn to_u32(&self) -> RegistryResult<u32> {
        match self {
            Self::Number(n) => Ok(*n),
            Self::Text(s) => {
                let digits = s
                    .strip_prefix("0x")
                    .or_else(|| s.strip_prefix("0X"))
                    .unwrap_or(s);
                u32::from_str_radix(digits, 16).map_err(|e| {
                    RegistryError::InvalidDescriptor(format!("invalid type hash {s:?}: {e}"))
                })
            }
        }
    }
}

impl RegistryDocument {
    /// Convert into a registry
    pub fn into_registry(self) -> RegistryResult<TypeRegistry> {
        let entries = self
            .tables
            .into_iter()
            .map(|record| {
                Ok(TypeTableEntry {
                    table_id: record.table_id,
                    type_hash: record.type_hash.to_u32()?,
                    property_count: record.property_count,
                    name: record.name,
                    property_names: record.properties,
                })
            })
            .collect::<RegistryResult<Vec<_>>>()?;

        TypeRegistry::from_entries(entries)
    }
}
