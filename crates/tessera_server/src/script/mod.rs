//! # Script Threads
//!
//! A script thread is a resumable VM context. The scheduler grants it an
//! instruction slice per tick; the VM runs until the slice is used up, the
//! script sleeps, or it finishes.
//!
//! ```text
//!              run(slice)
//!   Running ─────────────> Running      (slice used up, resume next tick)
//!      │                 > Sleeping     (sleep_until() set, timer wakes it)
//!      │                 > Terminated   (dropped)
//!      └── deferred ─────> Running      (budget exhausted, wait_ticks += 1)
//! ```

mod scheduler;
mod slice;

pub use scheduler::{BatchReport, ScheduleOutcome, ScriptScheduler};
pub use slice::{instruction_slice, next_balance};

use std::time::Instant;

use tessera_core::EntityId;
use tessera_jobs::JobPriority;

/// State a thread reports after a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreadState {
    /// Still has work; schedule again next tick.
    Running,
    /// Waiting for [`ScriptThread::sleep_until`].
    Sleeping,
    /// Finished.
    Terminated,
}

/// Scheduling priority of a thread.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ThreadPriority {
    /// Half slice.
    Low,
    /// Base slice.
    #[default]
    Normal,
    /// Double slice.
    High,
}

impl ThreadPriority {
    /// Job priority the thread is dispatched with.
    #[must_use]
    pub const fn job_priority(self) -> JobPriority {
        match self {
            Self::Low => JobPriority::Low,
            Self::Normal => JobPriority::Normal,
            Self::High => JobPriority::High,
        }
    }
}

/// Contract between the scheduler and a VM context.
pub trait ScriptThread: Send {
    /// Executes up to `slice` instructions.
    fn run(&mut self, slice: u64) -> ThreadState;

    /// Entity the thread belongs to; `None` for global threads.
    fn associated_object(&self) -> Option<EntityId>;

    /// Scheduling priority.
    fn priority(&self) -> ThreadPriority;

    /// Consecutive ticks this thread was deferred.
    fn wait_ticks(&self) -> u32;

    /// Sets the deferral counter.
    fn set_wait_ticks(&mut self, ticks: u32);

    /// Instructions carried over from the previous run, positive for unused
    /// quota, negative for overrun.
    fn quota_balance(&self) -> i64;

    /// Sets the carried balance.
    fn set_quota_balance(&mut self, balance: i64);

    /// Instructions executed over the thread's lifetime.
    fn total_instructions(&self) -> u64;

    /// Wake-up deadline while sleeping.
    fn sleep_until(&self) -> Option<Instant>;

    /// Clears the sleep state; the next run resumes after the sleep.
    fn wake_up(&mut self);
}

/// Owned, type-erased thread.
pub type BoxedThread = Box<dyn ScriptThread>;
