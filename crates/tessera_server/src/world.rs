//! # World State
//!
//! The concrete [`GameState`]: entities carry a [`VariableStore`] component
//! whose `x`/`y`/`z` built-ins are their tile position. A spatial index
//! `region → entities` is kept current by the spawn, despawn and move hooks.
//!
//! ## Locking
//!
//! ```text
//! structure lock (RwLock<()>)   bulk: tick collection reads, world edits write
//! spatial index (RwLock)        short critical sections only
//! per-entity variables          VariableStore's own write lock
//! ```
//!
//! Position changes write the variables, the `located` map and the index
//! under one spatial write lock, so concurrent moves of the same entity
//! leave it in exactly one region. Lock order: structure, spatial, variables.
//!
//! `spawn` and `despawn` take the structure lock themselves; do not call them
//! while holding [`GameState::write_lock`].

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tessera_core::{
    ArchetypeManager, BuiltinVar, ComponentManager, EntityAllocator, EntityId, ObjectType,
    VariableStore,
};

use crate::region::{RegionKey, RegionManager, TilePos};
use crate::traits::GameState;

/// Live world: entities, positions, observers.
pub struct WorldState {
    ids: EntityAllocator,
    components: Arc<ComponentManager>,
    regions: Arc<RegionManager>,
    structure: RwLock<()>,
    spatial: RwLock<HashMap<RegionKey, BTreeSet<EntityId>>>,
    located: DashMap<EntityId, RegionKey>,
    live: DashSet<EntityId>,
    observers: RwLock<BTreeSet<EntityId>>,
}

impl WorldState {
    /// Empty world over `regions`.
    #[must_use]
    pub fn new(regions: Arc<RegionManager>) -> Self {
        Self {
            ids: EntityAllocator::new(),
            components: Arc::new(ComponentManager::new(Arc::new(ArchetypeManager::new()))),
            regions,
            structure: RwLock::new(()),
            spatial: RwLock::new(HashMap::new()),
            located: DashMap::new(),
            live: DashSet::new(),
            observers: RwLock::new(BTreeSet::new()),
        }
    }

    /// Shared component manager.
    #[must_use]
    pub fn components(&self) -> &Arc<ComponentManager> {
        &self.components
    }

    /// Region grid.
    #[must_use]
    pub fn regions(&self) -> &Arc<RegionManager> {
        &self.regions
    }

    // =========================================================================
    // HOOKS
    // =========================================================================

    /// Creates an entity of type `ty` at `pos`.
    pub fn spawn(&self, ty: Arc<ObjectType>, pos: TilePos) -> EntityId {
        let _structure = self.structure.write();
        let entity = self.ids.allocate();
        let vars = Arc::new(VariableStore::new(ty));
        write_position(&vars, pos);
        self.components.add(entity, vars);
        self.live.insert(entity);
        self.reindex(&mut self.spatial.write(), entity, Some(pos));
        tracing::trace!(%entity, ?pos, "spawned");
        entity
    }

    /// Removes an entity and everything attached to it. Returns `false` if it
    /// was not live.
    pub fn despawn(&self, entity: EntityId) -> bool {
        let _structure = self.structure.write();
        if self.live.remove(&entity).is_none() {
            return false;
        }
        self.reindex(&mut self.spatial.write(), entity, None);
        self.observers.write().remove(&entity);
        self.components.despawn(entity);
        true
    }

    /// Moves `entity` to `pos`. Returns `false` if it is not live.
    pub fn move_to(&self, entity: EntityId, pos: TilePos) -> bool {
        let Some(vars) = self.vars(entity) else {
            return false;
        };
        let mut spatial = self.spatial.write();
        if !self.live.contains(&entity) {
            return false;
        }
        write_position(&vars, pos);
        self.reindex(&mut spatial, entity, Some(pos));
        true
    }

    /// Re-reads the position variables of `entity` and updates the index.
    /// Call after scripts write `x`/`y`/`z` directly.
    pub fn refresh_position(&self, entity: EntityId) {
        let mut spatial = self.spatial.write();
        if self.live.contains(&entity) {
            let pos = self.position_of(entity);
            self.reindex(&mut spatial, entity, pos);
        }
    }

    /// Marks `entity` as an observer.
    pub fn add_observer(&self, entity: EntityId) {
        self.observers.write().insert(entity);
    }

    /// Clears the observer mark.
    pub fn remove_observer(&self, entity: EntityId) -> bool {
        self.observers.write().remove(&entity)
    }

    // =========================================================================
    // READS
    // =========================================================================

    /// Variables of `entity`.
    #[must_use]
    pub fn vars(&self, entity: EntityId) -> Option<Arc<VariableStore>> {
        self.components.get::<VariableStore>(entity)
    }

    /// Region `entity` is indexed in.
    #[must_use]
    pub fn region_of_entity(&self, entity: EntityId) -> Option<RegionKey> {
        self.located.get(&entity).map(|r| *r)
    }

    /// Number of live entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.live.len()
    }

    /// Caller holds the spatial write lock for the whole update.
    fn reindex(
        &self,
        spatial: &mut HashMap<RegionKey, BTreeSet<EntityId>>,
        entity: EntityId,
        pos: Option<TilePos>,
    ) {
        let next = pos.and_then(|p| self.regions.region_of(p));
        let prev = match next {
            Some(region) => self.located.insert(entity, region),
            None => self.located.remove(&entity).map(|(_, r)| r),
        };
        if prev == next {
            return;
        }

        if let Some(prev) = prev {
            if let Some(set) = spatial.get_mut(&prev) {
                set.remove(&entity);
                if set.is_empty() {
                    spatial.remove(&prev);
                }
            }
        }
        if let Some(next) = next {
            spatial.entry(next).or_default().insert(entity);
        }
    }
}

fn write_position(vars: &VariableStore, pos: TilePos) {
    vars.set_builtin(BuiltinVar::X, f64::from(pos.x));
    vars.set_builtin(BuiltinVar::Y, f64::from(pos.y));
    vars.set_builtin(BuiltinVar::Z, f64::from(pos.z));
}

#[allow(clippy::cast_possible_truncation)]
fn read_coord(vars: &VariableStore, var: BuiltinVar) -> Option<i32> {
    vars.get_builtin(var).as_num().map(|n| n.floor() as i32)
}

impl GameState for WorldState {
    fn live_entities(&self) -> Vec<EntityId> {
        let mut entities: Vec<_> = self.live.iter().map(|e| *e).collect();
        entities.sort_unstable();
        entities
    }

    fn read_lock(&self) -> RwLockReadGuard<'_, ()> {
        self.structure.read()
    }

    fn write_lock(&self) -> RwLockWriteGuard<'_, ()> {
        self.structure.write()
    }

    fn entities_in_region(&self, region: RegionKey) -> Vec<EntityId> {
        self.spatial
            .read()
            .get(&region)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    fn observers(&self) -> Vec<EntityId> {
        self.observers.read().iter().copied().collect()
    }

    fn position_of(&self, entity: EntityId) -> Option<TilePos> {
        let vars = self.vars(entity)?;
        Some(TilePos::new(
            read_coord(&vars, BuiltinVar::X)?,
            read_coord(&vars, BuiltinVar::Y)?,
            read_coord(&vars, BuiltinVar::Z)?,
        ))
    }
}

impl std::fmt::Debug for WorldState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorldState")
            .field("entities", &self.entity_count())
            .field("observers", &self.observers.read().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use tessera_core::{ObjectTypeRegistry, TypeDef};

    fn world() -> (WorldState, Arc<ObjectType>) {
        let regions = Arc::new(RegionManager::new(&ServerConfig::default()));
        let mut reg = ObjectTypeRegistry::new();
        reg.register(TypeDef::new("/mob")).unwrap();
        reg.finalize().unwrap();
        (WorldState::new(regions), reg.get("/mob").unwrap())
    }

    #[test]
    fn test_spawn_indexes_by_region() {
        let (world, mob) = world();
        let a = world.spawn(Arc::clone(&mob), TilePos::new(10, 10, 0));
        let b = world.spawn(mob, TilePos::new(70, 10, 0));

        assert_eq!(world.entities_in_region(RegionKey::new(0, 0, 0)), vec![a]);
        assert_eq!(world.entities_in_region(RegionKey::new(1, 0, 0)), vec![b]);
        assert_eq!(world.position_of(b), Some(TilePos::new(70, 10, 0)));
        assert_eq!(world.live_entities(), vec![a, b]);
    }

    #[test]
    fn test_move_and_despawn_update_index() {
        let (world, mob) = world();
        let a = world.spawn(mob, TilePos::new(10, 10, 0));
        world.add_observer(a);

        assert!(world.move_to(a, TilePos::new(130, 10, 0)));
        assert!(world.entities_in_region(RegionKey::new(0, 0, 0)).is_empty());
        assert_eq!(world.region_of_entity(a), Some(RegionKey::new(2, 0, 0)));

        assert!(world.despawn(a));
        assert!(!world.despawn(a));
        assert!(world.entities_in_region(RegionKey::new(2, 0, 0)).is_empty());
        assert!(world.observers().is_empty());
        assert!(world.vars(a).is_none());
    }

    #[test]
    fn test_refresh_after_direct_variable_write() {
        let (world, mob) = world();
        let a = world.spawn(mob, TilePos::new(0, 0, 0));
        world.vars(a).unwrap().set_builtin(BuiltinVar::Y, 64);
        world.refresh_position(a);
        assert_eq!(world.region_of_entity(a), Some(RegionKey::new(0, 1, 0)));
    }

    #[test]
    fn test_off_map_entities_are_unindexed() {
        let (world, mob) = world();
        let a = world.spawn(mob, TilePos::new(-5, 0, 0));
        assert_eq!(world.region_of_entity(a), None);
        assert_eq!(world.entity_count(), 1);
    }

    #[test]
    fn test_concurrent_moves_keep_one_region() {
        let (world, mob) = world();
        let world = Arc::new(world);
        let a = world.spawn(mob, TilePos::new(0, 0, 0));

        let handles: Vec<_> = (0..8)
            .map(|t: i32| {
                let world = Arc::clone(&world);
                std::thread::spawn(move || {
                    for round in 0..2000 {
                        // Eight regions along x, 64 tiles each.
                        let x = ((t + round) % 8) * 64 + 1;
                        assert!(world.move_to(a, TilePos::new(x, 0, 0)));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let holding: Vec<_> = (0..8)
            .map(|x| RegionKey::new(x, 0, 0))
            .filter(|&key| world.entities_in_region(key).contains(&a))
            .collect();
        assert_eq!(holding.len(), 1, "indexed in {holding:?}");
        // Variables, located map and index agree.
        let pos = world.position_of(a).unwrap();
        assert_eq!(world.region_of_entity(a), Some(holding[0]));
        assert_eq!(world.regions().region_of(pos), Some(holding[0]));
    }

    #[test]
    fn test_move_racing_despawn_leaves_no_stale_entry() {
        let (world, mob) = world();
        let world = Arc::new(world);
        for _ in 0..200 {
            let a = world.spawn(Arc::clone(&mob), TilePos::new(0, 0, 0));
            let mover = {
                let world = Arc::clone(&world);
                std::thread::spawn(move || {
                    for x in 0..50 {
                        world.move_to(a, TilePos::new((x % 8) * 64, 0, 0));
                    }
                })
            };
            world.despawn(a);
            mover.join().unwrap();
            assert_eq!(world.region_of_entity(a), None);
            assert!((0..8).all(|x| !world.entities_in_region(RegionKey::new(x, 0, 0)).contains(&a)));
        }
    }
}
