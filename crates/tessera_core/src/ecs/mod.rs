//! # Entity Component System
//!
//! Entities are bare ids; components are shared `Arc` instances grouped into
//! archetypes by their exact type signature.
//!
//! ## Layers
//!
//! ```text
//! ComponentManager      add/remove + event fan-out
//!        │
//! ArchetypeManager      shard locks, transition edges, queries
//!        │
//! Archetype             columnar rows for one signature
//! ```

pub mod archetype;
mod component;
mod components;
mod entity;
mod manager;

pub use archetype::{Archetype, ArchetypeId, ArchetypeSignature};
pub use component::{Component, ComponentRef, ComponentType, OwnerSlot};
pub use components::{ComponentEvent, ComponentManager, SubscriptionId};
pub use entity::{EntityAllocator, EntityId};
pub use manager::{ArchetypeManager, EdgeStats, SHARD_COUNT};
