//! # Tessera Server
//!
//! Region-parallel tick pipeline on top of `tessera_core` and
//! `tessera_jobs`.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         TickDriver                           │
//! │  TickLoop ──> TimerQueue::fire_due ──> RegionalTickStrategy  │
//! └───────────────────────────────┬──────────────────────────────┘
//!                                 │
//!        ┌────────────────────────┼─────────────────────────┐
//!        ▼                        ▼                         ▼
//!  RegionActivation        ScriptScheduler            SnapshotSink
//!  (observers → regions)   (slices + budget)          (untracked jobs)
//!        │                        │
//!        ▼                        ▼
//!  RegionManager::merge     JobScheduler (tessera_jobs)
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tessera_jobs::JobScheduler;
//! use tessera_server::{
//!     RecordingSink, RegionManager, RegionalTickStrategy, ServerConfig, TickDriver, TimerQueue,
//!     WorldState,
//! };
//!
//! let config = ServerConfig::default();
//! let jobs = Arc::new(JobScheduler::new(config.scheduler_config()).unwrap());
//! let regions = Arc::new(RegionManager::new(&config));
//! let world = Arc::new(WorldState::new(Arc::clone(&regions)));
//! let timer = Arc::new(TimerQueue::new());
//!
//! let strategy = RegionalTickStrategy::new(
//!     &config,
//!     jobs,
//!     timer.clone(),
//!     regions,
//!     world,
//!     Arc::new(RecordingSink::new()),
//! );
//! let mut driver = TickDriver::new(&config, strategy, timer);
//! driver.run_ticks(20);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod error;
pub mod region;
pub mod script;
pub mod tick;
pub mod timer;
pub mod traits;
pub mod world;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use region::{
    merge_adjacent, ChunkKey, MergedRegion, ObserverActivation, Region, RegionActivation,
    RegionKey, RegionManager, TilePos,
};
pub use script::{
    BatchReport, BoxedThread, ScheduleOutcome, ScriptScheduler, ScriptThread, ThreadPriority,
    ThreadState,
};
pub use tick::{RegionalTickStrategy, TickDriver, TickLoop, TickReport, TickStats};
pub use timer::TimerQueue;
pub use traits::{GameState, RecordingSink, SnapshotRecord, SnapshotSink, TimerCallback, TimerService};
pub use world::WorldState;
