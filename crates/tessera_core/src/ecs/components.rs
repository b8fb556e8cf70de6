//! # Component Manager
//!
//! Thin façade over [`ArchetypeManager`] that raises add/remove
//! notifications.
//!
//! Subscribers live in a copy-on-write [`Published`] list: dispatch loads the
//! current snapshot and walks it without holding any lock, so a subscriber may
//! itself subscribe or unsubscribe while being notified.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::component::{Component, ComponentType};
use super::entity::EntityId;
use super::manager::ArchetypeManager;
use crate::sync::Published;

/// Structural change notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComponentEvent {
    /// A component was attached (or replaced) on an entity.
    Added {
        /// Owning entity.
        entity: EntityId,
        /// Type of the component.
        component: ComponentType,
    },
    /// A component was detached from an entity.
    Removed {
        /// Former owner.
        entity: EntityId,
        /// Type of the component.
        component: ComponentType,
    },
}

impl ComponentEvent {
    /// Entity the event concerns.
    #[must_use]
    pub fn entity(&self) -> EntityId {
        match *self {
            Self::Added { entity, .. } | Self::Removed { entity, .. } => entity,
        }
    }
}

/// Handle returned by [`ComponentManager::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn(&ComponentEvent) + Send + Sync>;

/// Component add/remove with event fan-out.
pub struct ComponentManager {
    archetypes: Arc<ArchetypeManager>,
    subscribers: Published<Vec<(SubscriptionId, Listener)>>,
    next_subscription: AtomicU64,
}

impl ComponentManager {
    /// Wraps an archetype manager.
    #[must_use]
    pub fn new(archetypes: Arc<ArchetypeManager>) -> Self {
        Self {
            archetypes,
            subscribers: Published::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
        }
    }

    /// The underlying archetype manager.
    #[must_use]
    pub fn archetypes(&self) -> &Arc<ArchetypeManager> {
        &self.archetypes
    }

    /// Registers `listener` for every subsequent event.
    pub fn subscribe(&self, listener: impl Fn(&ComponentEvent) + Send + Sync + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        let listener: Listener = Arc::new(listener);
        self.subscribers.update(|current| {
            let mut next = current.clone();
            next.push((id, Arc::clone(&listener)));
            next
        });
        id
    }

    /// Removes a subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let guard = self.subscribers.write();
        let current = guard.current();
        if !current.iter().any(|(sid, _)| *sid == id) {
            return false;
        }
        guard.publish(current.iter().filter(|(sid, _)| *sid != id).cloned().collect());
        true
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.load().len()
    }

    /// Attaches `component` and notifies subscribers.
    pub fn add<T: Component>(&self, entity: EntityId, component: Arc<T>) -> Option<Arc<T>> {
        let previous = self.archetypes.add_component(entity, component);
        self.dispatch(&ComponentEvent::Added {
            entity,
            component: ComponentType::of::<T>(),
        });
        previous
    }

    /// Detaches the `T` component, notifying subscribers if one was present.
    pub fn remove<T: Component>(&self, entity: EntityId) -> Option<Arc<T>> {
        let removed = self.archetypes.remove_component::<T>(entity)?;
        self.dispatch(&ComponentEvent::Removed {
            entity,
            component: ComponentType::of::<T>(),
        });
        Some(removed)
    }

    /// Detaches everything from `entity`, emitting one `Removed` per type.
    pub fn despawn(&self, entity: EntityId) -> usize {
        let types = self.archetypes.component_types(entity);
        let count = self.archetypes.despawn(entity);
        for component in types {
            self.dispatch(&ComponentEvent::Removed { entity, component });
        }
        count
    }

    /// See [`ArchetypeManager::get_component`].
    #[must_use]
    pub fn get<T: Component>(&self, entity: EntityId) -> Option<Arc<T>> {
        self.archetypes.get_component::<T>(entity)
    }

    /// See [`ArchetypeManager::has_component`].
    #[must_use]
    pub fn has<T: Component>(&self, entity: EntityId) -> bool {
        self.archetypes.has_component::<T>(entity)
    }

    fn dispatch(&self, event: &ComponentEvent) {
        let subscribers = self.subscribers.load();
        for (_, listener) in subscribers.iter() {
            listener(event);
        }
    }
}
