//! Benchmarks for the hot paths of the bridge.
//!
//! Run with: `cargo bench -p siphon-core`

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use siphon_core::blob::{BlobStore, SessionId, UnnamedBlob};
use siphon_core::handler::handle_patch;
use siphon_core::message::PatchRequest;
use siphon_core::{PathResolver, ProcessingContext, Processor};
use serde_json::json;
use tempfile::TempDir;
use tokio::runtime::Runtime;

const BASE: &str = "/var/containers/Bundle/Application/X/Bench.app";

// ============================================================================
// Chunk-copy assembly
// ============================================================================

fn bench_unnamed_assembly(c: &mut Criterion) {
    let mut group = c.benchmark_group("unnamed_assembly");
    let session = SessionId::from("bench");

    for chunk_size in [4 * 1024usize, 64 * 1024, 1024 * 1024] {
        let chunks = 16u64;
        let total = chunk_size as u64 * chunks;
        group.throughput(Throughput::Bytes(total));
        group.bench_with_input(
            BenchmarkId::new("chunk_size", chunk_size),
            &chunk_size,
            |b, &size| {
                let chunk = vec![0xA5u8; size];
                b.iter(|| {
                    let mut blob = UnnamedBlob::new(total);
                    for index in 1..=chunks {
                        blob.accept_chunk(&session, index, Some(chunk.clone())).unwrap();
                    }
                    black_box(blob.assemble().len())
                });
            },
        );
    }

    group.finish();
}

// ============================================================================
// Patching
// ============================================================================

fn bench_patch(c: &mut Criterion) {
    let mut group = c.benchmark_group("patch");
    let rt = Runtime::new().unwrap();
    let dir = TempDir::new().unwrap();
    let resolver = PathResolver::new(BASE, dir.path());
    let target = dir.path().join("Bench");
    std::fs::write(&target, vec![0u8; 4 * 1024 * 1024]).unwrap();

    for size in [4 * 1024u64, 256 * 1024, 1024 * 1024] {
        let mut store = BlobStore::new();
        let session = SessionId::from("src");
        store.begin_unnamed(session.clone(), size).unwrap();
        store
            .unnamed_mut(&session)
            .unwrap()
            .accept_chunk(&session, 1, Some(vec![0x5Au8; size as usize]))
            .unwrap();

        let from_blob = PatchRequest {
            filename: format!("{BASE}/Bench"),
            offset: 4096,
            blob: Some(session),
            size: Some(size),
        };
        let zero_fill = PatchRequest {
            filename: format!("{BASE}/Bench"),
            offset: 4096,
            blob: None,
            size: Some(size),
        };

        group.throughput(Throughput::Bytes(size));
        group.bench_with_input(BenchmarkId::new("blob", size), &from_blob, |b, request| {
            b.iter(|| rt.block_on(handle_patch(&resolver, &store, request)).unwrap());
        });
        group.bench_with_input(BenchmarkId::new("zeroes", size), &zero_fill, |b, request| {
            b.iter(|| rt.block_on(handle_patch(&resolver, &store, request)).unwrap());
        });
    }

    group.finish();
}

// ============================================================================
// Message routing
// ============================================================================

fn bench_process_memcpy_stream(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let dir = TempDir::new().unwrap();
    let context = ProcessingContext::new("bench", BASE, dir.path());
    let chunk = vec![1u8; 16 * 1024];

    c.bench_function("process_memcpy_64_chunks", |b| {
        b.iter(|| {
            rt.block_on(async {
                let mut processor = Processor::new(&context);
                processor
                    .process(
                        &json!({"type": "send", "payload": {"subject": "memcpy", "event": "begin", "session": "s", "size": 64 * 16 * 1024}}),
                        None,
                    )
                    .await
                    .unwrap();
                for index in 1..=64u64 {
                    processor
                        .process(
                            &json!({"type": "send", "payload": {"subject": "memcpy", "event": "data", "session": "s", "index": index}}),
                            Some(chunk.clone()),
                        )
                        .await
                        .unwrap();
                }
                black_box(processor.teardown().await.released_blobs)
            })
        });
    });
}

criterion_group!(
    benches,
    bench_unnamed_assembly,
    bench_patch,
    bench_process_memcpy_stream
);
criterion_main!(benches);
