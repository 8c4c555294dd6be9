//! Benchmarks for handle reference counting and registry lookups.

use std::io::Write;
use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use ember_assets::prelude::*;

#[derive(Default)]
struct Blob(Vec<u8>);

impl AssetPayload for Blob {
    const ASSET_TYPE: AssetType = AssetType::from_u128(0xB10B);
}

struct BlobHandler;

impl PayloadHandler for BlobHandler {
    type Payload = Blob;

    fn load(&self, stream: &mut AssetStream, _ctx: &LoadContext<'_>) -> AssetResult<Blob> {
        Ok(Blob(stream.read_to_vec()?))
    }

    fn save(&self, payload: &Blob, writer: &mut dyn Write) -> AssetResult<()> {
        writer.write_all(&payload.0)?;
        Ok(())
    }
}

fn manager() -> AssetManager {
    let manager = AssetManager::new(
        AssetManagerDescriptor::default()
            .with_max_worker_threads(2)
            .with_streamer(Arc::new(MemoryStreamer::new())),
    )
    .unwrap();
    manager.register_handler(Arc::new(TypedHandler::new(BlobHandler)), Blob::ASSET_TYPE);
    manager
}

fn bench_handle_clone(c: &mut Criterion) {
    let manager = manager();
    let asset = manager.create_asset::<Blob>(AssetId::from_u128(1, 0));

    c.bench_function("handle_clone_drop", |b| {
        b.iter(|| black_box(asset.clone()));
    });
}

fn bench_find(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_asset");

    for size in [100u128, 1000, 10000] {
        let manager = manager();
        let handles: Vec<Asset<Blob>> = (0..size)
            .map(|i| manager.create_asset(AssetId::from_u128(i + 1, 0)))
            .collect();
        group.throughput(Throughput::Elements(1));

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, size| {
            let mut i = 0;
            b.iter(|| {
                i = (i + 1) % size;
                black_box(manager.find_asset::<Blob>(AssetId::from_u128(i + 1, 0)))
            });
        });
        drop(handles);
    }

    group.finish();
}

fn bench_create_release(c: &mut Criterion) {
    let manager = manager();

    c.bench_function("create_release_dispatch", |b| {
        let mut i = 0u128;
        b.iter(|| {
            i += 1;
            drop(manager.create_asset::<Blob>(AssetId::from_u128(i, 0)));
            manager.dispatch_events();
        });
    });
}

criterion_group!(benches, bench_handle_clone, bench_find, bench_create_release);
criterion_main!(benches);
