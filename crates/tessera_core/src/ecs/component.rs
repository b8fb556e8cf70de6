//! # Component System
//!
//! Components are data-and-behavior units attached to exactly one entity at a
//! time. They are stored behind `Arc` so every lookup hands back the very
//! instance that was attached.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::entity::EntityId;

/// Trait implemented by every component type.
///
/// The hooks are invoked exactly once per attach / detach, while the owning
/// entity's shard lock is held. A hook must not add or remove components on
/// its own owner.
///
/// # Example
///
/// ```rust
/// use tessera_core::{Component, EntityId, OwnerSlot};
///
/// #[derive(Default)]
/// struct Health {
///     owner: OwnerSlot,
///     points: u32,
/// }
///
/// impl Component for Health {
///     fn on_attach(&self, owner: EntityId) {
///         self.owner.set(Some(owner));
///     }
///
///     fn on_detach(&self, _owner: EntityId) {
///         self.owner.set(None);
///     }
/// }
/// ```
pub trait Component: Any + Send + Sync {
    /// Called after the component is recorded on `owner`.
    fn on_attach(&self, owner: EntityId) {
        let _ = owner;
    }

    /// Called after the component is removed from `owner`.
    fn on_detach(&self, owner: EntityId) {
        let _ = owner;
    }
}

/// Runtime descriptor of a component type.
///
/// Ordering and equality use the `TypeId` only; the name is for diagnostics.
#[derive(Clone, Copy)]
pub struct ComponentType {
    id: TypeId,
    name: &'static str,
}

impl ComponentType {
    /// Descriptor for `T`.
    #[inline]
    #[must_use]
    pub fn of<T: Component>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// The underlying `TypeId`.
    #[inline]
    #[must_use]
    pub const fn type_id(self) -> TypeId {
        self.id
    }

    /// Fully qualified type name.
    #[inline]
    #[must_use]
    pub const fn name(self) -> &'static str {
        self.name
    }
}

impl PartialEq for ComponentType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ComponentType {}

impl std::hash::Hash for ComponentType {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for ComponentType {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ComponentType {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id.cmp(&other.id)
    }
}

impl fmt::Debug for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Type-erased, shared handle to an attached component.
#[derive(Clone)]
pub struct ComponentRef {
    ty: ComponentType,
    value: Arc<dyn Any + Send + Sync>,
    hooks: Arc<dyn Component>,
}

impl ComponentRef {
    /// Erases a concrete component.
    #[must_use]
    pub fn new<T: Component>(component: Arc<T>) -> Self {
        let value: Arc<dyn Any + Send + Sync> = component.clone();
        Self {
            ty: ComponentType::of::<T>(),
            value,
            hooks: component,
        }
    }

    /// Type of the stored component.
    #[inline]
    #[must_use]
    pub fn component_type(&self) -> ComponentType {
        self.ty
    }

    /// Recovers the concrete `Arc<T>`, or `None` if the type does not match.
    #[must_use]
    pub fn downcast<T: Component>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.value).downcast::<T>().ok()
    }

    /// True when both handles point at the same instance.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.value, &other.value)
    }

    pub(crate) fn attach(&self, owner: EntityId) {
        self.hooks.on_attach(owner);
    }

    pub(crate) fn detach(&self, owner: EntityId) {
        self.hooks.on_detach(owner);
    }
}

impl fmt::Debug for ComponentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRef").field("type", &self.ty).finish()
    }
}

/// Non-owning back-reference from a component to its entity.
///
/// Holds only the id; resolving it goes through the manager. Zero means
/// "not attached".
#[derive(Debug, Default)]
pub struct OwnerSlot(AtomicU64);

impl OwnerSlot {
    /// Creates an empty slot.
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Records (or clears) the owner.
    #[inline]
    pub fn set(&self, owner: Option<EntityId>) {
        self.0
            .store(owner.map_or(0, EntityId::raw), Ordering::Release);
    }

    /// Current owner, if attached.
    #[inline]
    #[must_use]
    pub fn get(&self) -> Option<EntityId> {
        EntityId::from_raw(self.0.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Marker;
    impl Component for Marker {}

    struct Other;
    impl Component for Other {}

    #[test]
    fn test_component_ref_downcast() {
        let marker = Arc::new(Marker);
        let erased = ComponentRef::new(Arc::clone(&marker));

        let back = erased.downcast::<Marker>().unwrap();
        assert!(Arc::ptr_eq(&back, &marker));
        assert!(erased.downcast::<Other>().is_none());
    }

    #[test]
    fn test_component_type_identity() {
        assert_eq!(ComponentType::of::<Marker>(), ComponentType::of::<Marker>());
        assert_ne!(ComponentType::of::<Marker>(), ComponentType::of::<Other>());
    }

    #[test]
    fn test_owner_slot() {
        let slot = OwnerSlot::new();
        assert!(slot.get().is_none());
        let id = EntityId::from_raw(9).unwrap();
        slot.set(Some(id));
        assert_eq!(slot.get(), Some(id));
        slot.set(None);
        assert!(slot.get().is_none());
    }
}
