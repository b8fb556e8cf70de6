//! # Archetype Manager
//!
//! Owns every archetype and routes entities between them as components are
//! added and removed.
//!
//! ## Locking
//!
//! ```text
//! entity id --hash--> shard mutex (1 of 64)      serializes one entity's structure
//!                       │
//!                       ├── entity_components    (dashmap, authoritative)
//!                       ├── entity_archetype     (dashmap)
//!                       └── archetype table      (per-archetype mutex, one at a time)
//! ```
//!
//! There is no global lock: unrelated entities only contend when they hash to
//! the same shard or touch the same archetype table at the same instant.
//!
//! ## Transition Edges
//!
//! The first move of an entity out of archetype `A` because of component type
//! `T` computes the destination signature the slow way. The result is cached
//! as the edge `(A, T) -> B`; later moves through the same edge skip the
//! signature computation entirely. Adding and removing the same `T` from one
//! source can never collide, because `A` either has `T` or it doesn't.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};

use super::archetype::{Archetype, ArchetypeId, ArchetypeSignature};
use super::component::{Component, ComponentRef, ComponentType};
use super::entity::EntityId;

/// Number of entity shard locks.
pub const SHARD_COUNT: usize = 64;

type ComponentMap = HashMap<ComponentType, ComponentRef>;

struct ArchetypeSlot {
    signature: ArchetypeSignature,
    table: Mutex<Archetype>,
}

/// Transition-edge cache statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EdgeStats {
    /// Moves resolved through a cached edge.
    pub hits: u64,
    /// Moves that had to compute the destination signature.
    pub misses: u64,
}

/// Archetype storage for every entity in the process.
pub struct ArchetypeManager {
    shards: Box<[Mutex<()>]>,
    archetypes: RwLock<Vec<Arc<ArchetypeSlot>>>,
    by_signature: RwLock<HashMap<ArchetypeSignature, ArchetypeId>>,
    entity_archetype: DashMap<EntityId, ArchetypeId>,
    entity_components: DashMap<EntityId, ComponentMap>,
    edges: DashMap<(ArchetypeId, ComponentType), ArchetypeId>,
    type_index: RwLock<HashMap<ComponentType, HashSet<ArchetypeId>>>,
    edge_hits: AtomicU64,
    edge_misses: AtomicU64,
}

impl ArchetypeManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shards: (0..SHARD_COUNT).map(|_| Mutex::new(())).collect(),
            archetypes: RwLock::new(Vec::new()),
            by_signature: RwLock::new(HashMap::new()),
            entity_archetype: DashMap::new(),
            entity_components: DashMap::new(),
            edges: DashMap::new(),
            type_index: RwLock::new(HashMap::new()),
            edge_hits: AtomicU64::new(0),
            edge_misses: AtomicU64::new(0),
        }
    }

    #[inline]
    fn shard(&self, entity: EntityId) -> &Mutex<()> {
        // Fibonacci hashing; top bits pick the shard.
        let hash = entity.raw().wrapping_mul(0x9E37_79B9_7F4A_7C15);
        &self.shards[(hash >> 58) as usize % SHARD_COUNT]
    }

    fn slot(&self, id: ArchetypeId) -> Arc<ArchetypeSlot> {
        Arc::clone(&self.archetypes.read()[id.index()])
    }

    // =========================================================================
    // STRUCTURAL CHANGES
    // =========================================================================

    /// Attaches `component` to `entity`.
    ///
    /// If the entity already has a component of type `T`, the old instance is
    /// detached and returned; the entity stays in its archetype.
    pub fn add_component<T: Component>(&self, entity: EntityId, component: Arc<T>) -> Option<Arc<T>> {
        let _guard = self.shard(entity).lock();

        let added = ComponentRef::new(component);
        let ty = added.component_type();

        let (previous, snapshot) = {
            let mut components = self.entity_components.entry(entity).or_default();
            let previous = components.insert(ty, added.clone());
            (previous, components.clone())
        };

        if let Some(previous) = &previous {
            previous.detach(entity);
        }
        added.attach(entity);

        if let Some(previous) = previous {
            if let Some(current) = self.archetype_of(entity) {
                self.slot(current).table.lock().replace(entity, added);
            }
            return previous.downcast::<T>();
        }

        let source = self.archetype_of(entity);
        let destination = self.destination(source, ty, &snapshot);
        self.move_entity(entity, source, destination, &snapshot);
        None
    }

    /// Detaches and returns the component of type `T`, if present.
    ///
    /// Removing the last component drops the entity from archetype tracking.
    pub fn remove_component<T: Component>(&self, entity: EntityId) -> Option<Arc<T>> {
        let _guard = self.shard(entity).lock();
        let ty = ComponentType::of::<T>();

        let (removed, snapshot) = {
            let mut components = self.entity_components.get_mut(&entity)?;
            let removed = components.remove(&ty)?;
            (removed, components.clone())
        };
        if snapshot.is_empty() {
            self.entity_components.remove_if(&entity, |_, c| c.is_empty());
        }

        removed.detach(entity);

        let source = self.archetype_of(entity);
        let destination = self.destination(source, ty, &snapshot);
        self.move_entity(entity, source, destination, &snapshot);

        removed.downcast::<T>()
    }

    /// Detaches every component and forgets the entity.
    ///
    /// Returns the number of components that were detached.
    pub fn despawn(&self, entity: EntityId) -> usize {
        let _guard = self.shard(entity).lock();

        let Some((_, components)) = self.entity_components.remove(&entity) else {
            return 0;
        };
        for component in components.values() {
            component.detach(entity);
        }
        if let Some((_, current)) = self.entity_archetype.remove(&entity) {
            self.slot(current).table.lock().remove(entity);
        }
        components.len()
    }

    fn destination(&self, source: Option<ArchetypeId>, changed: ComponentType, components: &ComponentMap) -> Option<ArchetypeId> {
        if components.is_empty() {
            return None;
        }

        if let Some(source) = source {
            if let Some(cached) = self.edges.get(&(source, changed)) {
                self.edge_hits.fetch_add(1, Ordering::Relaxed);
                return Some(*cached);
            }
        }

        self.edge_misses.fetch_add(1, Ordering::Relaxed);
        let signature = ArchetypeSignature::new(components.keys().copied().collect());
        let destination = self.find_or_create(signature);
        if let Some(source) = source {
            self.edges.insert((source, changed), destination);
        }
        Some(destination)
    }

    fn move_entity(&self, entity: EntityId, from: Option<ArchetypeId>, to: Option<ArchetypeId>, components: &ComponentMap) {
        // Remove before add: the entity is never a member of two archetypes.
        if let Some(from) = from {
            self.slot(from).table.lock().remove(entity);
        }
        match to {
            Some(to) => {
                let inserted = self.slot(to).table.lock().insert(entity, components);
                debug_assert!(inserted, "entity {entity} already present in destination archetype");
                self.entity_archetype.insert(entity, to);
            }
            None => {
                self.entity_archetype.remove(&entity);
            }
        }
    }

    fn find_or_create(&self, signature: ArchetypeSignature) -> ArchetypeId {
        if let Some(id) = self.by_signature.read().get(&signature) {
            return *id;
        }

        let mut by_signature = self.by_signature.write();
        if let Some(id) = by_signature.get(&signature) {
            return *id;
        }

        let mut archetypes = self.archetypes.write();
        let id = ArchetypeId(archetypes.len());
        archetypes.push(Arc::new(ArchetypeSlot {
            signature: signature.clone(),
            table: Mutex::new(Archetype::new(id, signature.clone())),
        }));
        drop(archetypes);

        let mut index = self.type_index.write();
        for &ty in signature.types() {
            index.entry(ty).or_default().insert(id);
        }
        drop(index);

        tracing::debug!(archetype = id.index(), components = signature.len(), "created archetype");
        by_signature.insert(signature, id);
        id
    }

    // =========================================================================
    // LOOKUPS
    // =========================================================================

    /// The reference-identical component of type `T` on `entity`.
    #[must_use]
    pub fn get_component<T: Component>(&self, entity: EntityId) -> Option<Arc<T>> {
        self.entity_components
            .get(&entity)?
            .get(&ComponentType::of::<T>())?
            .downcast::<T>()
    }

    /// Whether `entity` has a component of type `T`.
    #[must_use]
    pub fn has_component<T: Component>(&self, entity: EntityId) -> bool {
        self.entity_components
            .get(&entity)
            .is_some_and(|c| c.contains_key(&ComponentType::of::<T>()))
    }

    /// Component types currently attached to `entity`, in canonical order.
    #[must_use]
    pub fn component_types(&self, entity: EntityId) -> Vec<ComponentType> {
        let mut types: Vec<_> = self
            .entity_components
            .get(&entity)
            .map(|c| c.keys().copied().collect())
            .unwrap_or_default();
        types.sort();
        types
    }

    /// Archetype currently holding `entity`.
    #[must_use]
    pub fn archetype_of(&self, entity: EntityId) -> Option<ArchetypeId> {
        self.entity_archetype.get(&entity).map(|a| *a)
    }

    /// Signature of an archetype.
    #[must_use]
    pub fn signature_of(&self, archetype: ArchetypeId) -> Option<ArchetypeSignature> {
        self.archetypes
            .read()
            .get(archetype.index())
            .map(|slot| slot.signature.clone())
    }

    /// Number of entities stored in one archetype.
    #[must_use]
    pub fn archetype_len(&self, archetype: ArchetypeId) -> usize {
        self.archetypes
            .read()
            .get(archetype.index())
            .map_or(0, |slot| slot.table.lock().len())
    }

    /// Entity ids stored in one archetype, in row order.
    #[must_use]
    pub fn archetype_entities(&self, archetype: ArchetypeId) -> Vec<EntityId> {
        self.archetypes
            .read()
            .get(archetype.index())
            .map(|slot| slot.table.lock().entities().to_vec())
            .unwrap_or_default()
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    /// Archetypes holding a column for every requested type.
    ///
    /// Structural filter: cost scales with archetype count, not entity count.
    /// An empty request or any never-seen type yields nothing.
    #[must_use]
    pub fn query(&self, types: &[ComponentType]) -> Vec<ArchetypeId> {
        let index = self.type_index.read();
        let mut sets = Vec::with_capacity(types.len());
        for ty in types {
            match index.get(ty) {
                Some(set) => sets.push(set),
                None => return Vec::new(),
            }
        }
        sets.sort_by_key(|s| s.len());

        let Some((smallest, rest)) = sets.split_first() else {
            return Vec::new();
        };
        let mut result: Vec<ArchetypeId> = smallest
            .iter()
            .filter(|id| rest.iter().all(|s| s.contains(id)))
            .copied()
            .collect();
        result.sort();
        result
    }

    /// Entities whose archetype matches `types`.
    #[must_use]
    pub fn query_entities(&self, types: &[ComponentType]) -> Vec<EntityId> {
        self.query(types)
            .into_iter()
            .flat_map(|id| self.archetype_entities(id))
            .collect()
    }

    /// `(entity, component)` pairs for every entity having `T` plus `with`.
    #[must_use]
    pub fn query_components<T: Component>(&self, with: &[ComponentType]) -> Vec<(EntityId, Arc<T>)> {
        let ty = ComponentType::of::<T>();
        let mut types = with.to_vec();
        types.push(ty);

        let mut out = Vec::new();
        for id in self.query(&types) {
            let slot = self.slot(id);
            let table = slot.table.lock();
            if let Some(column) = table.column(ty) {
                out.extend(
                    table
                        .entities()
                        .iter()
                        .zip(column)
                        .filter_map(|(&e, c)| c.downcast::<T>().map(|c| (e, c))),
                );
            }
        }
        out
    }

    // =========================================================================
    // INTROSPECTION
    // =========================================================================

    /// Number of materialized archetypes.
    #[must_use]
    pub fn archetype_count(&self) -> usize {
        self.archetypes.read().len()
    }

    /// Number of entities with at least one component.
    #[must_use]
    pub fn tracked_entity_count(&self) -> usize {
        self.entity_archetype.len()
    }

    /// Sum of every archetype's length.
    ///
    /// Equals [`tracked_entity_count`](Self::tracked_entity_count) at any
    /// quiescent point.
    #[must_use]
    pub fn total_archetype_entities(&self) -> usize {
        self.archetypes
            .read()
            .iter()
            .map(|slot| slot.table.lock().len())
            .sum()
    }

    /// Number of cached transition edges.
    #[must_use]
    pub fn transition_edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Edge cache hit/miss counters.
    #[must_use]
    pub fn edge_stats(&self) -> EdgeStats {
        EdgeStats {
            hits: self.edge_hits.load(Ordering::Relaxed),
            misses: self.edge_misses.load(Ordering::Relaxed),
        }
    }

    /// Checks every archetype's row invariant.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.archetypes
            .read()
            .iter()
            .all(|slot| slot.table.lock().is_consistent())
    }
}

impl Default for ArchetypeManager {
    fn default() -> Self {
        Self::new()
    }
}
