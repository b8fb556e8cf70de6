//! # Timer Queue
//!
//! Deadline-ordered callbacks, fired by the tick driver at the start of each
//! tick. Callbacks run on the firing thread with the queue lock released, so a
//! callback may add further timers.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;

use crate::traits::{TimerCallback, TimerService};

/// [`TimerService`] backed by an ordered map.
///
/// Timers with equal deadlines fire in insertion order.
#[derive(Default)]
pub struct TimerQueue {
    timers: Mutex<BTreeMap<(Instant, u64), TimerCallback>>,
    seq: AtomicU64,
}

impl TimerQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs and removes every timer due at or before `now`, in deadline
    /// order. Returns how many fired.
    pub fn fire_due(&self, now: Instant) -> usize {
        let due = {
            let mut timers = self.timers.lock();
            let later = timers.split_off(&(now, u64::MAX));
            std::mem::replace(&mut *timers, later)
        };

        let fired = due.len();
        for (_, callback) in due {
            callback();
        }
        if fired > 0 {
            tracing::debug!(fired, "timers fired");
        }
        fired
    }

    /// Earliest pending deadline.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.lock().keys().next().map(|&(at, _)| at)
    }

    /// Number of pending timers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.timers.lock().len()
    }

    /// Checks if no timers are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TimerService for TimerQueue {
    fn add_timer(&self, at: Instant, callback: TimerCallback) {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        self.timers.lock().insert((at, seq), callback);
    }
}

impl std::fmt::Debug for TimerQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerQueue").field("pending", &self.len()).finish()
    }
}
