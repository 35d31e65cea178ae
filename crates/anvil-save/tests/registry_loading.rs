#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]
//! Loading type registries from descriptor files and resolving through them

mod common;

use anvil_save::registry::RegistryError;
use anvil_save::{TypeRegistry, decode};
use common::{REGISTRY_JSON, compact_block, normal, save_file};
use std::io::Write;

fn binary_descriptor() -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(&1u32.to_le_bytes());
    data.extend_from_slice(&3u32.to_le_bytes());
    data.extend_from_slice(&16u32.to_le_bytes());
    data.extend_from_slice(&0u32.to_le_bytes());
    for (hash, props) in [(0x1111_1111u32, 2u32), (0, 0), (0x3333_3333, 7)] {
        data.extend_from_slice(&hash.to_le_bytes());
        data.extend_from_slice(&props.to_le_bytes());
        data.extend_from_slice(&[0u8; 8]);
    }
    data
}

#[test]
fn load_json_descriptor_from_file() {
    let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    file.write_all(REGISTRY_JSON.as_bytes()).unwrap();

    let registry = TypeRegistry::load_from_file(file.path()).unwrap();
    assert_eq!(registry.len(), 2);
    assert!(registry.contains_type_hash(0xC876_1736));

    let block = compact_block(&[normal(vec![0x08, 0x03, 0x5E, 0xB6])]);
    let graph = decode(&save_file(&[block]), &registry).unwrap();
    let reference = &graph.objects[0].references[0];
    assert_eq!(reference.type_hash, Some(0x0DEB_ED19));
    assert_eq!(reference.property_name.as_deref(), Some("Flags"));
}

#[test]
fn load_binary_descriptor_from_file() {
    let mut file = tempfile::Builder::new().suffix(".bin").tempfile().unwrap();
    file.write_all(&binary_descriptor()).unwrap();

    let registry = TypeRegistry::load_from_file(file.path()).unwrap();
    assert_eq!(registry.len(), 2);

    let block = compact_block(&[normal(vec![
        0x08, 0x03, 0x03, 0x10, 0x08, 0x03, 0x02, 0x10,
    ])]);
    let graph = decode(&save_file(&[block]), &registry).unwrap();
    let object = &graph.objects[0];
    assert_eq!(object.references[0].type_hash, Some(0x3333_3333));
    assert_eq!(object.references[0].property_name, None);
    // Slot 2 is vacant
    assert_eq!(object.references[1].type_hash, None);
    assert_eq!(graph.diagnostics.len(), 1);
}

#[test]
fn zero_table_id_is_skipped() {
    let json = r#"{
        "tables": [
            { "table_id": 0, "type_hash": "0x00000000", "property_count": 0 },
            { "table_id": 94, "type_hash": "0x0DEBED19", "property_count": 4 }
        ]
    }"#;

    let registry = TypeRegistry::from_json_str(json).unwrap();
    assert_eq!(registry.len(), 1);

    let block = compact_block(&[normal(vec![0x08, 0x03, 0x5E, 0xB6, 0x08, 0x03, 0x00, 0x01])]);
    let graph = decode(&save_file(&[block]), &registry).unwrap();
    let references = &graph.objects[0].references;
    assert_eq!(references[0].type_hash, Some(0x0DEB_ED19));
    assert_eq!(references[1].type_hash, None);
}

#[test]
fn missing_file_reports_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.json");

    match TypeRegistry::load_from_file(&path) {
        Err(RegistryError::LoadFailed { path: reported, .. }) => assert_eq!(reported, path),
        other => panic!("expected LoadFailed, got {other:?}"),
    }
}

#[test]
fn malformed_json_rejected() {
    let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    file.write_all(b"{\"tables\": [{\"table_id\": }]}").unwrap();

    assert!(matches!(
        TypeRegistry::load_from_file(file.path()),
        Err(RegistryError::Json(_))
    ));
}
