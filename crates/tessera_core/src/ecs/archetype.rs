//! # Archetype Storage
//!
//! An archetype stores every entity that shares one exact component-type
//! signature.
//!
//! ## Layout
//!
//! ```text
//! Archetype { signature: [Health, Position] }
//!
//! entities: [e4,  e9,  e2 ]
//! Health:   [h4,  h9,  h2 ]   <- column 0
//! Position: [p4,  p9,  p2 ]   <- column 1
//! ```
//!
//! Row `i` refers to the same entity in every column. Removal swaps the last
//! row into the hole and truncates, which reorders rows but never changes
//! membership.

use std::collections::HashMap;

use super::component::{ComponentRef, ComponentType};
use super::entity::EntityId;

/// Stable index of an archetype inside the manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArchetypeId(pub(crate) usize);

impl ArchetypeId {
    /// Raw index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Signature of an archetype: which component types it stores.
///
/// Sorted and deduplicated, so insertion order never matters.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct ArchetypeSignature {
    components: Vec<ComponentType>,
}

impl ArchetypeSignature {
    /// Builds the canonical signature for a set of types.
    #[must_use]
    pub fn new(mut components: Vec<ComponentType>) -> Self {
        components.sort();
        components.dedup();
        Self { components }
    }

    /// Signature with `ty` added.
    #[must_use]
    pub fn with(&self, ty: ComponentType) -> Self {
        let mut components = self.components.clone();
        components.push(ty);
        Self::new(components)
    }

    /// Signature with `ty` removed.
    #[must_use]
    pub fn without(&self, ty: ComponentType) -> Self {
        Self {
            components: self.components.iter().copied().filter(|c| *c != ty).collect(),
        }
    }

    /// Checks if this signature contains a component type.
    #[must_use]
    pub fn contains(&self, ty: ComponentType) -> bool {
        self.components.binary_search(&ty).is_ok()
    }

    /// Component types in canonical order.
    #[must_use]
    pub fn types(&self) -> &[ComponentType] {
        &self.components
    }

    /// Returns the number of component types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Checks if empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

/// One column: every instance of a single component type, row-aligned with
/// the archetype's entity list.
#[derive(Debug)]
struct Column {
    ty: ComponentType,
    items: Vec<ComponentRef>,
}

/// A single archetype table.
#[derive(Debug)]
pub struct Archetype {
    id: ArchetypeId,
    signature: ArchetypeSignature,
    /// Entity IDs in row order.
    entities: Vec<EntityId>,
    /// One column per signature entry, same order as the signature.
    columns: Vec<Column>,
    /// Reverse lookup: entity -> row.
    rows: HashMap<EntityId, usize>,
}

impl Archetype {
    /// Creates an empty archetype for `signature`.
    #[must_use]
    pub fn new(id: ArchetypeId, signature: ArchetypeSignature) -> Self {
        let columns = signature
            .types()
            .iter()
            .map(|&ty| Column {
                ty,
                items: Vec::new(),
            })
            .collect();

        Self {
            id,
            signature,
            entities: Vec::new(),
            columns,
            rows: HashMap::new(),
        }
    }

    /// Identifier of this archetype.
    #[must_use]
    pub fn id(&self) -> ArchetypeId {
        self.id
    }

    /// Returns the signature of this archetype.
    #[must_use]
    pub fn signature(&self) -> &ArchetypeSignature {
        &self.signature
    }

    /// Returns the number of entities in this archetype.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Checks if empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Entity IDs in row order.
    #[must_use]
    pub fn entities(&self) -> &[EntityId] {
        &self.entities
    }

    /// Whether `entity` has a row here.
    #[must_use]
    pub fn contains(&self, entity: EntityId) -> bool {
        self.rows.contains_key(&entity)
    }

    /// Row index of `entity`, if present.
    #[must_use]
    pub fn row_of(&self, entity: EntityId) -> Option<usize> {
        self.rows.get(&entity).copied()
    }

    /// Component of type `ty` for `entity`.
    #[must_use]
    pub fn get(&self, entity: EntityId, ty: ComponentType) -> Option<&ComponentRef> {
        let row = self.row_of(entity)?;
        let col = self.column_index(ty)?;
        self.columns[col].items.get(row)
    }

    /// Every instance in the column of `ty`, in row order.
    #[must_use]
    pub fn column(&self, ty: ComponentType) -> Option<&[ComponentRef]> {
        self.column_index(ty).map(|i| self.columns[i].items.as_slice())
    }

    fn column_index(&self, ty: ComponentType) -> Option<usize> {
        self.signature.types().binary_search(&ty).ok()
    }

    /// Appends a row for `entity`, taking one component per column from
    /// `components`.
    ///
    /// Returns `false` (and stores nothing) if the entity already has a row or
    /// a column has no matching component.
    pub fn insert(&mut self, entity: EntityId, components: &HashMap<ComponentType, ComponentRef>) -> bool {
        if self.rows.contains_key(&entity) {
            return false;
        }
        if !self.columns.iter().all(|c| components.contains_key(&c.ty)) {
            return false;
        }

        let row = self.entities.len();
        self.entities.push(entity);
        for column in &mut self.columns {
            column.items.push(components[&column.ty].clone());
        }
        self.rows.insert(entity, row);
        true
    }

    /// Overwrites the component of `ty` in `entity`'s row.
    pub fn replace(&mut self, entity: EntityId, component: ComponentRef) -> bool {
        let (Some(row), Some(col)) = (self.row_of(entity), self.column_index(component.component_type())) else {
            return false;
        };
        self.columns[col].items[row] = component;
        true
    }

    /// Removes `entity`'s row using swap-with-last-then-truncate.
    ///
    /// Returns `true` if the entity was present.
    pub fn remove(&mut self, entity: EntityId) -> bool {
        let Some(row) = self.rows.remove(&entity) else {
            return false;
        };

        let last = self.entities.len() - 1;
        self.entities.swap_remove(row);
        for column in &mut self.columns {
            column.items.swap_remove(row);
        }

        if row != last {
            let moved = self.entities[row];
            self.rows.insert(moved, row);
        }

        debug_assert!(self.is_consistent());
        true
    }

    /// Checks the parallel-sequence invariant.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let len = self.entities.len();
        self.rows.len() == len
            && self.columns.iter().all(|c| c.items.len() == len)
            && self
                .entities
                .iter()
                .enumerate()
                .all(|(row, e)| self.rows.get(e) == Some(&row))
    }
}
