//! # Tessera Jobs
//!
//! Work-stealing job scheduler with a dynamically sized worker pool.
//!
//! ## Architecture
//!
//! ```text
//! JobScheduler ──place──> Worker 0 [High|Normal|Low] ──┐
//!      │                  Worker 1 [High|Normal|Low] <─┘ steal (tail, try_lock)
//!      │                  Worker 2 ...
//!      └── maintenance thread: grow / shrink, publish new worker array
//! ```
//!
//! Job bodies receive a [`WorkerContext`] carrying the executing worker's
//! scratch arena. Failures and panics are captured on the [`JobHandle`];
//! untracked failures also go to [`JobScheduler::errors`].

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod error;
pub mod job;
pub mod scheduler;
pub mod worker;

pub use error::{JobError, JobResult};
pub use job::{wait_all, JobHandle, JobId, JobOptions, JobPriority, JobStatus};
pub use scheduler::{
    JobFailure, JobScheduler, Resize, SchedulerConfig, SchedulerStats, WorkerStats,
    DEFAULT_SHUTDOWN_TIMEOUT, GROW_PENDING_FACTOR,
};
pub use worker::WorkerContext;
