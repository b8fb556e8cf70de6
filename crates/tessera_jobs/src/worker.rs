//! # Worker Runtime
//!
//! One OS thread per worker, each owning a priority-partitioned local queue
//! and a scratch arena.
//!
//! ## Worker Loop
//!
//! ```text
//! loop {
//!     stop requested?           -> exit (queued jobs are abandoned)
//!     tick epoch advanced?      -> reset arena
//!     pop local (High→Low, front) -> run
//!     retiring and drained?     -> exit
//!     steal (two-choice victim, tail, try_lock) -> run
//!     idle-wait on condvar (short timeout)
//! }
//! ```
//!
//! Every job runs inside `catch_unwind`, so a panicking body is recorded on
//! its handle and the loop keeps going.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytemuck::Pod;
use parking_lot::{Condvar, Mutex};
use rand::Rng;
use tessera_core::{Arena, Scratch};

use crate::error::JobError;
use crate::job::{Job, JobPriority};
use crate::scheduler::Shared;

/// How long an idle worker sleeps before re-checking for steal targets.
pub(crate) const IDLE_WAIT: Duration = Duration::from_millis(1);

/// Per-worker resources handed to every job body.
///
/// Owned by the worker thread; never shared.
pub struct WorkerContext {
    worker_id: usize,
    arena: Arena,
    epoch: u64,
}

impl WorkerContext {
    pub(crate) fn new(worker_id: usize, arena_block_size: usize, epoch: u64) -> Self {
        Self {
            worker_id,
            arena: Arena::new(arena_block_size),
            epoch,
        }
    }

    /// Stable id of the executing worker.
    #[must_use]
    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    /// Tick epoch the arena was last reset for.
    #[must_use]
    pub fn tick_epoch(&self) -> u64 {
        self.epoch
    }

    /// This worker's arena. Contents live until the next tick begins.
    pub fn arena(&mut self) -> &mut Arena {
        &mut self.arena
    }

    /// Zeroed scratch slice from the arena.
    pub fn scratch<T: Pod>(&mut self, len: usize) -> Scratch<'_, T> {
        Scratch::Arena(self.arena.alloc_slice(len))
    }

    pub(crate) fn sync_epoch(&mut self, epoch: u64) {
        if epoch != self.epoch {
            self.arena.reset();
            self.epoch = epoch;
        }
    }
}

/// Local queues, one per priority class.
#[derive(Default)]
struct Queues {
    lanes: [VecDeque<Job>; JobPriority::COUNT],
    /// Set once the worker is evicted; pushes are refused from then on.
    retiring: bool,
}

impl Queues {
    fn pop_front(&mut self) -> Option<Job> {
        self.lanes.iter_mut().rev().find_map(VecDeque::pop_front)
    }

    fn pop_back(&mut self) -> Option<Job> {
        self.lanes.iter_mut().find_map(VecDeque::pop_back)
    }

    fn drain(&mut self) -> Vec<Job> {
        self.lanes.iter_mut().flat_map(std::mem::take).collect()
    }
}

/// Shared side of a worker: queue, load counters and statistics.
pub(crate) struct Worker {
    id: usize,
    queues: Mutex<Queues>,
    available: Condvar,
    pending: AtomicUsize,
    pending_weight: AtomicU64,
    busy: AtomicBool,
    stop: AtomicBool,
    completed: AtomicU64,
    stolen: AtomicU64,
    /// Nanoseconds since scheduler start at which this worker last went idle.
    idle_since_ns: AtomicU64,
}

impl Worker {
    pub(crate) fn new(id: usize, now_ns: u64) -> Self {
        Self {
            id,
            queues: Mutex::new(Queues::default()),
            available: Condvar::new(),
            pending: AtomicUsize::new(0),
            pending_weight: AtomicU64::new(0),
            busy: AtomicBool::new(false),
            stop: AtomicBool::new(false),
            completed: AtomicU64::new(0),
            stolen: AtomicU64::new(0),
            idle_since_ns: AtomicU64::new(now_ns),
        }
    }

    pub(crate) fn id(&self) -> usize {
        self.id
    }

    /// Approximate pending weight; a cheap load proxy.
    #[inline]
    pub(crate) fn pending_weight(&self) -> u64 {
        self.pending_weight.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn pending(&self) -> usize {
        self.pending.load(Ordering::Relaxed)
    }

    pub(crate) fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Relaxed)
    }

    pub(crate) fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub(crate) fn stolen(&self) -> u64 {
        self.stolen.load(Ordering::Relaxed)
    }

    pub(crate) fn idle_since_ns(&self) -> u64 {
        self.idle_since_ns.load(Ordering::Relaxed)
    }

    /// Queues `job`. Hands it back if the worker is retiring.
    pub(crate) fn push(&self, job: Job) -> Result<(), Job> {
        let mut queues = self.queues.lock();
        if queues.retiring {
            return Err(job);
        }
        self.pending.fetch_add(1, Ordering::Relaxed);
        self.pending_weight.fetch_add(job.weight(), Ordering::Relaxed);
        queues.lanes[job.options.priority.slot()].push_back(job);
        drop(queues);
        self.available.notify_one();
        Ok(())
    }

    fn take(&self, job: Option<Job>) -> Option<Job> {
        let job = job?;
        self.pending.fetch_sub(1, Ordering::Relaxed);
        self.pending_weight.fetch_sub(job.weight(), Ordering::Relaxed);
        Some(job)
    }

    fn pop_local(&self) -> Option<Job> {
        let job = self.queues.lock().pop_front();
        self.take(job)
    }

    /// Non-blocking steal from the tail, lowest priority first.
    fn try_steal(&self) -> Option<Job> {
        let job = self.queues.try_lock()?.pop_back();
        self.take(job)
    }

    fn idle_wait(&self) {
        let mut queues = self.queues.lock();
        if queues.lanes.iter().all(VecDeque::is_empty) && !self.stop.load(Ordering::Acquire) {
            self.available.wait_for(&mut queues, IDLE_WAIT);
        }
    }

    fn is_retiring(&self) -> bool {
        self.queues.lock().retiring
    }

    /// Refuses further pushes; the loop exits once the queue is drained.
    pub(crate) fn retire(&self) {
        self.queues.lock().retiring = true;
        self.available.notify_all();
    }

    /// Makes the loop exit at the next iteration without draining.
    pub(crate) fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
        let _queues = self.queues.lock();
        self.available.notify_all();
    }

    /// Removes every queued job. Used at shutdown; the jobs are dropped
    /// without running and their handles stay incomplete.
    pub(crate) fn abandon_queued(&self) -> usize {
        let abandoned = self.queues.lock().drain();
        self.pending.store(0, Ordering::Relaxed);
        self.pending_weight.store(0, Ordering::Relaxed);
        abandoned.len()
    }
}

/// Thread entry point.
pub(crate) fn run_worker(worker: &Arc<Worker>, shared: &Arc<Shared>, mut ctx: WorkerContext) {
    tracing::debug!(worker = worker.id, "worker started");

    loop {
        if worker.stop.load(Ordering::Acquire) {
            break;
        }
        ctx.sync_epoch(shared.tick_epoch());

        if let Some(job) = worker.pop_local() {
            execute(worker, shared, &mut ctx, job);
            continue;
        }

        if worker.is_retiring() {
            break;
        }

        if let Some(job) = steal(worker, shared) {
            worker.stolen.fetch_add(1, Ordering::Relaxed);
            execute(worker, shared, &mut ctx, job);
            continue;
        }

        worker.idle_wait();
    }

    tracing::debug!(
        worker = worker.id,
        completed = worker.completed(),
        stolen = worker.stolen(),
        "worker exited"
    );
}

/// Two-choice victim selection from the stealer's side: sample two other
/// workers, prefer the heavier, fall back to the other if its lock is busy.
fn steal(me: &Worker, shared: &Shared) -> Option<Job> {
    let workers = shared.workers();
    let others: Vec<&Arc<Worker>> = workers
        .iter()
        .filter(|w| w.id != me.id && w.pending() > 0)
        .collect();

    match others.len() {
        0 => None,
        1 => others[0].try_steal(),
        n => {
            let mut rng = rand::thread_rng();
            let a = rng.gen_range(0..n);
            let mut b = rng.gen_range(0..n - 1);
            if b >= a {
                b += 1;
            }
            let (first, second) = if others[a].pending_weight() >= others[b].pending_weight() {
                (others[a], others[b])
            } else {
                (others[b], others[a])
            };
            first.try_steal().or_else(|| second.try_steal())
        }
    }
}

fn execute(worker: &Worker, shared: &Shared, ctx: &mut WorkerContext, job: Job) {
    worker.busy.store(true, Ordering::Relaxed);

    let Job {
        options,
        body,
        state,
        tracked,
    } = job;
    state.set_running();

    let result = match panic::catch_unwind(AssertUnwindSafe(|| body(ctx))) {
        Ok(result) => result,
        Err(payload) => Err(JobError::Panicked(panic_message(payload.as_ref()))),
    };

    worker.completed.fetch_add(1, Ordering::Relaxed);
    if let Err(error) = &result {
        shared.record_failure(state.id(), options.label, error, tracked);
    }

    // Continuations may schedule more work; run them after the accounting.
    state.finish(result);

    worker.idle_since_ns.store(shared.now_ns(), Ordering::Relaxed);
    worker.busy.store(false, Ordering::Relaxed);
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
