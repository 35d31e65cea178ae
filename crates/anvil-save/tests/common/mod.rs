//! Synthetic save file builders shared by the integration tests

#![allow(dead_code)]

/// Full-format magic as stored on disk
pub const FULL_MAGIC: [u8; 4] = [0x33, 0xAA, 0xFB, 0x57];

/// Compact header or region sub-header
pub fn compact_header(declared: u32) -> Vec<u8> {
    let mut out = vec![0x01];
    out.extend_from_slice(&declared.to_le_bytes()[..3]);
    out.extend_from_slice(&[0x00, 0x00, 0x80, 0x00]);
    out
}

/// Inter-region gap
pub fn gap(index: u16) -> Vec<u8> {
    let mut out = vec![0x01];
    out.extend_from_slice(&index.to_le_bytes());
    out.extend_from_slice(&[0x20, 0x00]);
    out
}

/// Compact block from `(declared size, payload)` regions
pub fn compact_block(regions: &[(u32, Vec<u8>)]) -> Vec<u8> {
    let mut out = Vec::new();
    for (index, (declared, payload)) in regions.iter().enumerate() {
        if index > 0 {
            out.extend(gap(index as u16));
        }
        out.extend(compact_header(*declared));
        out.extend_from_slice(payload);
    }
    out
}

/// Region whose declared size matches its payload
pub fn normal(payload: Vec<u8>) -> (u32, Vec<u8>) {
    (payload.len() as u32, payload)
}

/// Region payload of `levels` bitmap-256 branches whose 256 children are
/// all indirect nodes pointing one level back
pub fn indirect_fan_out(levels: usize) -> Vec<u8> {
    let mut out = vec![0x08, 0x00];
    let mut previous = None;
    for _ in 0..levels {
        let start = out.len() as u16;
        out.extend_from_slice(&[0x06, 0x00]);
        out.extend_from_slice(&[0xFF; 32]);
        for _ in 0..256 {
            match previous {
                None => out.extend_from_slice(&[0x0D, 0x00]),
                Some(target) => {
                    out.extend_from_slice(&[0x13, 0x00]);
                    out.extend_from_slice(&u16::to_le_bytes(target));
                }
            }
        }
        previous = Some(start);
    }
    out
}

/// Full-format block around `payload`
pub fn full_block(payload: &[u8], decompressed_size: u32) -> Vec<u8> {
    let mut out = FULL_MAGIC.to_vec();
    out.extend_from_slice(&[0u8; 28]);
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&decompressed_size.to_le_bytes());
    out.extend_from_slice(&adler::adler32_slice(payload).to_le_bytes());
    out.extend_from_slice(payload);
    out
}

/// Full-format envelope: validated root type reference and object id
pub fn envelope(type_hash: u32, object_id: u32, body: &[u8]) -> Vec<u8> {
    let mut out = vec![0x01, 0x00];
    out.extend_from_slice(&type_hash.to_le_bytes());
    out.extend_from_slice(&object_id.to_le_bytes());
    out.extend_from_slice(body);
    out
}

/// Outer save file
pub fn save_file(blocks: &[Vec<u8>]) -> Vec<u8> {
    let mut out = vec![0x16];
    out.extend_from_slice(&0x00FE_DBACu32.to_le_bytes());
    out.extend_from_slice(&(blocks.len() as u32).to_le_bytes());
    for block in blocks {
        out.extend_from_slice(&(block.len() as u32).to_le_bytes());
        out.extend_from_slice(block);
    }
    out
}

/// Registry JSON used across the tests
pub const REGISTRY_JSON: &str = r#"{
    "tables": [
        { "table_id": 94, "type_hash": "0x0DEBED19", "property_count": 4,
          "name": "PlayerOptionsSaveData", "properties": { "182": "Flags" } },
        { "table_id": 91, "type_hash": 3363182390, "property_count": 2 }
    ]
}"#;
