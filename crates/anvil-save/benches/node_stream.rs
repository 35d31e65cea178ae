//! Node stream and whole-block decoding benchmarks
//!
//! Run with:
//! ```bash
//! cargo bench --bench node_stream
//! ```

#![allow(clippy::expect_used)]

use anvil_save::{CompactBlockDecoder, DecoderConfig, NodeDecoder, TypeRegistry, TypeTableEntry};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;

/// Region payload of `count` mixed leaf and branch nodes
fn node_stream(count: usize) -> Vec<u8> {
    let mut out = Vec::new();
    for i in 0..count {
        match i % 4 {
            0 => out.extend_from_slice(&[0x08, 0x03, 0x5E, (i % 256) as u8]),
            1 => out.extend_from_slice(&[0x18, 0x00, 0x01, 0xAA, 0xBB, 0xCC, 0xDD]),
            2 => {
                // 2-entry linear leaf
                out.extend_from_slice(&[0x15, 0x02]);
                out.extend_from_slice(&[0x01, 0x00, 1, 2, 3, 4, 0x02, 0x00, 5, 6, 7, 8]);
            }
            _ => {
                // bitmap-8 branch with two null children
                out.extend_from_slice(&[0x01, 0x00, 0b0000_0101, 0x08, 0x00, 0x0A, 0x00]);
            }
        }
    }
    out
}

fn compact_block(payload: &[u8]) -> Vec<u8> {
    let mut out = vec![0x01];
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes()[..3]);
    out.extend_from_slice(&[0x00, 0x00, 0x80, 0x00]);
    out.extend_from_slice(payload);
    out
}

fn bench_node_stream(c: &mut Criterion) {
    let decoder = NodeDecoder::default();
    let mut group = c.benchmark_group("node_stream");

    for count in [64usize, 1024, 16_384] {
        let stream = node_stream(count);
        group.throughput(Throughput::Bytes(stream.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &stream, |b, stream| {
            b.iter(|| decoder.decode_stream(black_box(stream), 0, 0));
        });
    }

    group.finish();
}

fn bench_compact_block(c: &mut Criterion) {
    let registry = TypeRegistry::from_entries([TypeTableEntry::new(0x5E, 0x0DEB_ED19, 4)])
        .expect("Failed to build benchmark registry");
    let config = DecoderConfig::default();
    let decoder = CompactBlockDecoder::new(&registry, &config);
    let block = compact_block(&node_stream(4096));

    c.bench_function("compact_block_4096_nodes", |b| {
        b.iter(|| {
            decoder
                .decode(0, black_box(&block))
                .expect("Benchmark block should decode")
        });
    });
}

criterion_group!(benches, bench_node_stream, bench_compact_block);
criterion_main!(benches);
