//! # Entity Identity
//!
//! Entities are opaque, positive, never-recycled integer identifiers.
//!
//! Unlike index+generation schemes, an id is handed out exactly once for the
//! lifetime of the process. Storage objects behind an entity may be pooled and
//! reused, but the id they carry is always fresh.

use std::fmt;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for an entity.
///
/// Backed by a `NonZeroU64` so `Option<EntityId>` costs nothing extra.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct EntityId(NonZeroU64);

impl EntityId {
    /// Wraps a raw id. Returns `None` for zero.
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u64) -> Option<Self> {
        match NonZeroU64::new(raw) {
            Some(id) => Some(Self(id)),
            None => None,
        }
    }

    /// Returns the raw integer value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Monotonic entity id allocator.
///
/// Thread-safe; ids start at 1 and are never reused.
#[derive(Debug)]
pub struct EntityAllocator {
    next: AtomicU64,
}

impl EntityAllocator {
    /// Creates an allocator whose first id is 1.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Allocates a fresh id.
    ///
    /// # Panics
    ///
    /// Panics if the 64-bit id space is exhausted.
    #[inline]
    pub fn allocate(&self) -> EntityId {
        let raw = self.next.fetch_add(1, Ordering::Relaxed);
        EntityId::from_raw(raw).expect("entity id space exhausted")
    }

    /// Number of ids handed out so far.
    #[inline]
    #[must_use]
    pub fn allocated(&self) -> u64 {
        self.next.load(Ordering::Relaxed) - 1
    }
}

impl Default for EntityAllocator {
    fn default() -> Self {
        Self::new()
    }
}
