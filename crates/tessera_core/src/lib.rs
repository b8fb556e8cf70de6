//! # Tessera Core
//!
//! Shared-state storage for the simulation server:
//! - Archetype-organized entity/component storage with cached transition edges
//! - Per-entity versioned variable arrays with snapshot reads
//! - Worker scratch arenas and the copy-on-write [`Published`] cell
//!
//! ## Architecture Rules
//!
//! 1. **No global lock on structural changes** - entities hash into 64 shard locks
//! 2. **Readers never wait on copy work** - writers publish whole new snapshots
//! 3. **Ids are never recycled** - an [`EntityId`] names one entity forever
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use tessera_core::{ArchetypeManager, Component, EntityAllocator};
//!
//! struct Health(u32);
//! impl Component for Health {}
//!
//! let ids = EntityAllocator::new();
//! let manager = ArchetypeManager::new();
//!
//! let hero = ids.allocate();
//! let hp = Arc::new(Health(100));
//! manager.add_component(hero, Arc::clone(&hp));
//!
//! assert!(Arc::ptr_eq(&manager.get_component::<Health>(hero).unwrap(), &hp));
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod ecs;
pub mod error;
pub mod memory;
pub mod sync;
pub mod vars;

pub use ecs::{
    Archetype, ArchetypeId, ArchetypeManager, ArchetypeSignature, Component, ComponentEvent,
    ComponentManager, ComponentRef, ComponentType, EdgeStats, EntityAllocator, EntityId,
    OwnerSlot, SubscriptionId,
};
pub use error::{CoreError, CoreResult};
pub use memory::{Arena, ArenaSlice, Scratch};
pub use sync::{CancellationToken, PublishGuard, Published};
pub use vars::{BuiltinVar, ObjectType, ObjectTypeRegistry, TypeDef, Value, VariableStore};
