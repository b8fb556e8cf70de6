//! # Archetype Invariant Tests
//!
//! Random add/remove/despawn sequences checked against a plain model.
//!
//! Run with: cargo test -p tessera_core --test archetype_invariants

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use proptest::prelude::*;
use tessera_core::{ArchetypeManager, Component, ComponentType, EntityId};

struct A;
impl Component for A {}
struct B;
impl Component for B {}
struct C;
impl Component for C {}

#[derive(Clone, Copy, Debug)]
enum Op {
    Add(u8),
    Remove(u8),
    Despawn,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0u8..3).prop_map(Op::Add),
        2 => (0u8..3).prop_map(Op::Remove),
        1 => Just(Op::Despawn),
    ]
}

fn type_of(kind: u8) -> ComponentType {
    match kind {
        0 => ComponentType::of::<A>(),
        1 => ComponentType::of::<B>(),
        _ => ComponentType::of::<C>(),
    }
}

fn apply(manager: &ArchetypeManager, entity: EntityId, op: Op) {
    match op {
        Op::Add(0) => {
            let _ = manager.add_component(entity, Arc::new(A));
        }
        Op::Add(1) => {
            let _ = manager.add_component(entity, Arc::new(B));
        }
        Op::Add(_) => {
            let _ = manager.add_component(entity, Arc::new(C));
        }
        Op::Remove(0) => {
            let _ = manager.remove_component::<A>(entity);
        }
        Op::Remove(1) => {
            let _ = manager.remove_component::<B>(entity);
        }
        Op::Remove(_) => {
            let _ = manager.remove_component::<C>(entity);
        }
        Op::Despawn => {
            let _ = manager.despawn(entity);
        }
    }
}

proptest! {
    #[test]
    fn prop_manager_matches_model(ops in prop::collection::vec((1u64..16, op()), 1..200)) {
        let manager = ArchetypeManager::new();
        let mut model: HashMap<u64, BTreeSet<u8>> = HashMap::new();

        for (raw, op) in ops {
            let entity = EntityId::from_raw(raw).unwrap();
            apply(&manager, entity, op);
            let set = model.entry(raw).or_default();
            match op {
                Op::Add(k) => { set.insert(k.min(2)); }
                Op::Remove(k) => { set.remove(&k.min(2)); }
                Op::Despawn => set.clear(),
            }
        }

        let live = model.values().filter(|s| !s.is_empty()).count();
        prop_assert_eq!(manager.tracked_entity_count(), live);
        prop_assert_eq!(manager.total_archetype_entities(), live);
        prop_assert!(manager.is_consistent());

        for (raw, kinds) in &model {
            let entity = EntityId::from_raw(*raw).unwrap();
            let mut expected: Vec<ComponentType> = kinds.iter().map(|&k| type_of(k)).collect();
            expected.sort();
            prop_assert_eq!(manager.component_types(entity), expected.clone());

            match manager.archetype_of(entity) {
                Some(arch) => {
                    let signature = manager.signature_of(arch).unwrap();
                    prop_assert_eq!(signature.types(), expected.as_slice());
                }
                None => prop_assert!(expected.is_empty()),
            }
        }
    }

    #[test]
    fn prop_round_trip_restores_signature(base in prop::collection::btree_set(0u8..2, 1..=2)) {
        let manager = ArchetypeManager::new();
        let entity = EntityId::from_raw(1).unwrap();
        for &k in &base {
            apply(&manager, entity, Op::Add(k));
        }
        let before = manager.signature_of(manager.archetype_of(entity).unwrap()).unwrap();

        apply(&manager, entity, Op::Add(2));
        apply(&manager, entity, Op::Remove(2));

        let after = manager.signature_of(manager.archetype_of(entity).unwrap()).unwrap();
        prop_assert_eq!(before, after);
    }
}

#[test]
fn query_scales_with_archetypes_not_entities() {
    let manager = ArchetypeManager::new();
    for raw in 1..=500u64 {
        let e = EntityId::from_raw(raw).unwrap();
        manager.add_component(e, Arc::new(A));
        if raw % 2 == 0 {
            manager.add_component(e, Arc::new(B));
        }
    }

    assert_eq!(manager.archetype_count(), 2);
    assert_eq!(manager.query(&[ComponentType::of::<A>()]).len(), 2);
    assert_eq!(manager.query(&[ComponentType::of::<B>()]).len(), 1);
    assert_eq!(manager.query_entities(&[ComponentType::of::<B>()]).len(), 250);
    assert!(manager.query(&[ComponentType::of::<C>()]).is_empty());
}
