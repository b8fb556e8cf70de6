//! # Synchronization Primitives
//!
//! ## The Problem
//!
//! ```text
//! Worker threads:  READ entity variables, worker arrays, subscriber lists
//! Writers:         occasionally REPLACE one of them
//!
//! In-place mutation under a shared lock: readers stall behind the copy.
//! ```
//!
//! ## The Solution: Copy-on-Write Publication
//!
//! ```text
//! Writer:  lock writer mutex -> clone current -> mutate clone -> publish (pointer swap)
//! Reader:  load current snapshot (Arc clone) -> read freely
//! ```
//!
//! Readers only ever see a fully-formed value. The expensive copy happens
//! under the writer mutex, which readers never touch.

mod cancel;
mod published;

pub use cancel::CancellationToken;
pub use published::{PublishGuard, Published};
