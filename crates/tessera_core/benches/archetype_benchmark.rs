//! # Archetype Transition Benchmark
//!
//! Measures structural changes through cached transition edges, structural
//! queries, and contended variable writes.

#![allow(missing_docs)]

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tessera_core::{
    ArchetypeManager, BuiltinVar, Component, ComponentType, EntityAllocator, VariableStore,
};

const ENTITY_COUNT: u64 = 10_000;

struct Position(f32, f32);
impl Component for Position {}

struct Velocity(f32, f32);
impl Component for Velocity {}

struct Frozen;
impl Component for Frozen {}

fn populated(count: u64) -> (ArchetypeManager, Vec<tessera_core::EntityId>) {
    let manager = ArchetypeManager::new();
    let ids = EntityAllocator::new();
    let entities: Vec<_> = (0..count)
        .map(|i| {
            let e = ids.allocate();
            manager.add_component(e, Arc::new(Position(i as f32, 0.0)));
            manager.add_component(e, Arc::new(Velocity(1.0, 1.0)));
            e
        })
        .collect();
    (manager, entities)
}

// =============================================================================
// TRANSITIONS
// =============================================================================

fn bench_add_remove_edge(c: &mut Criterion) {
    let (manager, entities) = populated(ENTITY_COUNT);

    c.bench_function("transition_add_remove_10k", |b| {
        b.iter(|| {
            for &e in &entities {
                manager.add_component(e, Arc::new(Frozen));
            }
            for &e in &entities {
                black_box(manager.remove_component::<Frozen>(e));
            }
        });
    });
}

fn bench_get_component(c: &mut Criterion) {
    let (manager, entities) = populated(ENTITY_COUNT);

    c.bench_function("get_component_10k", |b| {
        b.iter(|| {
            let mut sum = 0.0f32;
            for &e in &entities {
                if let Some(p) = manager.get_component::<Position>(e) {
                    sum += p.0 + p.1;
                }
            }
            black_box(sum)
        });
    });
}

// =============================================================================
// QUERIES
// =============================================================================

fn bench_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_entities");
    for count in [1_000u64, 10_000, 50_000] {
        let (manager, _) = populated(count);
        let types = [ComponentType::of::<Position>(), ComponentType::of::<Velocity>()];
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| black_box(manager.query_entities(&types).len()));
        });
    }
    group.finish();
}

// =============================================================================
// VARIABLES
// =============================================================================

fn bench_variable_writes(c: &mut Criterion) {
    let store = VariableStore::untyped();

    c.bench_function("variable_set_changed", |b| {
        let mut x = 0i32;
        b.iter(|| {
            x = x.wrapping_add(1);
            black_box(store.set_builtin(BuiltinVar::X, x))
        });
    });

    c.bench_function("variable_get_builtin", |b| {
        b.iter(|| black_box(store.get_builtin(BuiltinVar::X)));
    });
}

criterion_group!(
    benches,
    bench_add_remove_edge,
    bench_get_component,
    bench_query,
    bench_variable_writes,
);

criterion_main!(benches);
