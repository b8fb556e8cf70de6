//! # Tick Pipeline Benchmark
//!
//! Region merging over large active sets, and spatial re-indexing on moves.

#![allow(missing_docs)]

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tessera_core::{ObjectTypeRegistry, TypeDef};
use tessera_server::{merge_adjacent, RegionKey, RegionManager, ServerConfig, TilePos, WorldState};

fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge_adjacent");

    for side in [8i32, 32, 64] {
        // Checkerboard of 2×2 blocks: many small groups.
        let active: Vec<RegionKey> = (0..side)
            .flat_map(|y| (0..side).map(move |x| RegionKey::new(x, y, 0)))
            .filter(|k| (k.x / 2 + k.y / 2) % 2 == 0)
            .collect();
        group.bench_with_input(BenchmarkId::new("blocks", side), &active, |b, active| {
            b.iter(|| black_box(merge_adjacent(active, true, 2)));
        });
    }

    group.finish();
}

#[allow(clippy::cast_possible_wrap)]
fn bench_move(c: &mut Criterion) {
    let config = ServerConfig::default();
    let mut registry = ObjectTypeRegistry::new();
    registry.register(TypeDef::new("/mob")).unwrap();
    registry.finalize().unwrap();
    let mob = registry.get("/mob").unwrap();

    let world = WorldState::new(Arc::new(RegionManager::new(&config)));
    let entities: Vec<_> = (0..1_000)
        .map(|i| world.spawn(Arc::clone(&mob), TilePos::new(i % 1000, i / 10, 0)))
        .collect();

    let mut step = 0i32;
    c.bench_function("move_to_1k", |b| {
        b.iter(|| {
            step = (step + 37) % 900;
            for (i, &entity) in entities.iter().enumerate() {
                world.move_to(entity, TilePos::new((i as i32 + step) % 1000, step, 0));
            }
        });
    });
}

criterion_group!(benches, bench_merge, bench_move);
criterion_main!(benches);
