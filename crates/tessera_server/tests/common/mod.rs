//! Shared test scripts.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tessera_core::EntityId;
use tessera_server::{ScriptThread, ThreadPriority, ThreadState};

/// Run log shared by scripts: `(script id, start instant)`.
pub type RunLog = Arc<Mutex<Vec<(u32, Instant)>>>;

/// Configurable script thread that records every run.
pub struct TestScript {
    pub id: u32,
    pub entity: Option<EntityId>,
    pub priority: ThreadPriority,
    /// Wall time burned per run.
    pub busy: Duration,
    /// Sleep this long after the next run.
    pub nap: Option<Duration>,
    pub sleeping_until: Option<Instant>,
    pub runs: u32,
    pub total: u64,
    pub balance: i64,
    pub waited: u32,
    pub log: RunLog,
}

impl TestScript {
    pub fn new(id: u32, entity: Option<EntityId>, log: &RunLog) -> Self {
        Self {
            id,
            entity,
            priority: ThreadPriority::Normal,
            busy: Duration::ZERO,
            nap: None,
            sleeping_until: None,
            runs: 0,
            total: 0,
            balance: 0,
            waited: 0,
            log: Arc::clone(log),
        }
    }

    pub fn busy(mut self, busy: Duration) -> Self {
        self.busy = busy;
        self
    }

    pub fn nap(mut self, nap: Duration) -> Self {
        self.nap = Some(nap);
        self
    }
}

pub fn new_log() -> RunLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn spin(d: Duration) {
    let start = Instant::now();
    while start.elapsed() < d {
        std::hint::spin_loop();
    }
}

impl ScriptThread for TestScript {
    fn run(&mut self, slice: u64) -> ThreadState {
        self.log.lock().push((self.id, Instant::now()));
        spin(self.busy);
        self.runs += 1;
        self.total += slice;
        match self.nap.take() {
            Some(nap) => {
                self.sleeping_until = Some(Instant::now() + nap);
                ThreadState::Sleeping
            }
            None => ThreadState::Running,
        }
    }

    fn associated_object(&self) -> Option<EntityId> {
        self.entity
    }

    fn priority(&self) -> ThreadPriority {
        self.priority
    }

    fn wait_ticks(&self) -> u32 {
        self.waited
    }

    fn set_wait_ticks(&mut self, ticks: u32) {
        self.waited = ticks;
    }

    fn quota_balance(&self) -> i64 {
        self.balance
    }

    fn set_quota_balance(&mut self, balance: i64) {
        self.balance = balance;
    }

    fn total_instructions(&self) -> u64 {
        self.total
    }

    fn sleep_until(&self) -> Option<Instant> {
        self.sleeping_until
    }

    fn wake_up(&mut self) {
        self.sleeping_until = None;
    }
}
