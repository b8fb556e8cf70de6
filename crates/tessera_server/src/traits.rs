//! # Collaborator Traits
//!
//! The tick pipeline reaches the rest of the game only through these traits.
//!
//! ```text
//! tessera_server defines:      the game implements:
//! ┌──────────────────┐         ┌──────────────────┐
//! │ trait GameState  │ ←────── │ WorldState       │
//! │ trait Snapshot…  │ ←────── │ network encoder  │
//! │ trait TimerSvc   │ ←────── │ TimerQueue       │
//! └──────────────────┘         └──────────────────┘
//! ```

use std::time::Instant;

use parking_lot::{Mutex, RwLockReadGuard, RwLockWriteGuard};
use tessera_core::EntityId;

use crate::error::ServerResult;
use crate::region::{MergedRegion, RegionKey, TilePos};

// ============================================================================
// GAME STATE
// ============================================================================

/// Read access to the world for activation and batching.
pub trait GameState: Send + Sync {
    /// Every live entity.
    fn live_entities(&self) -> Vec<EntityId>;

    /// Bulk read lock; held while the tick collects region contents.
    fn read_lock(&self) -> RwLockReadGuard<'_, ()>;

    /// Bulk write lock; held by structural changes to the world.
    fn write_lock(&self) -> RwLockWriteGuard<'_, ()>;

    /// Entities currently indexed in `region`.
    fn entities_in_region(&self, region: RegionKey) -> Vec<EntityId>;

    /// Entities that keep regions around them active.
    fn observers(&self) -> Vec<EntityId>;

    /// Tile position of `entity`, or `None` if it has none.
    fn position_of(&self, entity: EntityId) -> Option<TilePos>;
}

// ============================================================================
// SNAPSHOTS
// ============================================================================

/// Receives per-region state after each tick.
///
/// Called from worker threads, one call per merged region, not awaited by
/// the tick.
pub trait SnapshotSink: Send + Sync {
    /// Publishes `entities` of `region` for `tick`.
    ///
    /// # Errors
    ///
    /// Any error is logged by the scheduler and otherwise ignored.
    fn send_region(&self, tick: u64, region: &MergedRegion, entities: &[EntityId]) -> ServerResult<()>;
}

// ============================================================================
// TIMERS
// ============================================================================

/// Callback run when a timer fires.
pub type TimerCallback = Box<dyn FnOnce() + Send>;

/// Deferred callbacks keyed by wall-clock deadline.
pub trait TimerService: Send + Sync {
    /// Runs `callback` once `at` has passed.
    fn add_timer(&self, at: Instant, callback: TimerCallback);
}

// ============================================================================
// MOCK IMPLEMENTATIONS (For Testing)
// ============================================================================

/// One recorded [`SnapshotSink::send_region`] call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnapshotRecord {
    /// Tick number.
    pub tick: u64,
    /// Group id of the region.
    pub region: RegionKey,
    /// Entities sent, sorted.
    pub entities: Vec<EntityId>,
}

/// Sink that keeps every snapshot in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    records: Mutex<Vec<SnapshotRecord>>,
}

impl RecordingSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes every record collected so far.
    pub fn drain(&self) -> Vec<SnapshotRecord> {
        std::mem::take(&mut *self.records.lock())
    }

    /// Number of records held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Checks if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SnapshotSink for RecordingSink {
    fn send_region(&self, tick: u64, region: &MergedRegion, entities: &[EntityId]) -> ServerResult<()> {
        let mut entities = entities.to_vec();
        entities.sort_unstable();
        self.records.lock().push(SnapshotRecord {
            tick,
            region: region.id(),
            entities,
        });
        Ok(())
    }
}
