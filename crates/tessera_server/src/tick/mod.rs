//! # Tick Pipeline
//!
//! ```text
//! TickDriver ──> TickLoop (fixed timestep, stats)
//!     │
//!     ├──> TimerQueue::fire_due          (wake sleeping scripts)
//!     └──> RegionalTickStrategy::tick    (globals, regions, snapshots)
//! ```

mod driver;
mod strategy;
mod tick_loop;

pub use driver::{TickDriver, MAX_CATCH_UP_TICKS};
pub use strategy::{RegionalTickStrategy, TickReport};
pub use tick_loop::{TickLoop, TickStats};
