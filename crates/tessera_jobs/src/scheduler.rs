//! # Job Scheduler
//!
//! Load-aware placement over a resizable worker pool.
//!
//! ## Placement
//!
//! ```text
//! schedule(job)
//!   ├─ affinity = Some(i)  -> workers[i % len]
//!   └─ affinity = None     -> sample two workers, pick the lower pending weight
//!
//! push refused (worker retiring)  -> reload the worker array and place again
//! ```
//!
//! ## Resizing
//!
//! The worker array is a [`Published`] snapshot. Growing or shrinking builds a
//! new vector and publishes it; submitters holding the old snapshot either
//! land on a still-live worker or get their job handed back by the evicted
//! one and retry.
//!
//! ```text
//! maintain() every interval:
//!   all busy && pending > 10 × len && len < max  -> spawn one worker
//!   some worker idle > idle_shrink_after && len > min -> retire it
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use rand::Rng;
use tessera_core::Published;

use crate::error::{JobError, JobResult};
use crate::job::{Job, JobBody, JobHandle, JobId, JobOptions, JobState};
use crate::worker::{run_worker, Worker, WorkerContext};

/// Pending jobs per worker above which a fully busy pool grows.
pub const GROW_PENDING_FACTOR: usize = 10;

/// Default join timeout used when the scheduler is dropped.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Scheduler configuration.
#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    /// Lower pool bound.
    pub min_workers: usize,
    /// Upper pool bound.
    pub max_workers: usize,
    /// Workers started up front; clamped into `[min, max]`.
    pub initial_workers: usize,
    /// Period of the maintenance pass. `None` disables the background thread;
    /// `maintain()` can still be called by hand.
    pub maintenance_interval: Option<Duration>,
    /// Idle time after which a worker becomes a shrink candidate.
    pub idle_shrink_after: Duration,
    /// Arena block size per worker, in bytes.
    pub arena_block_size: usize,
    /// Capacity of the untracked-failure channel.
    pub error_channel_capacity: usize,
}

impl SchedulerConfig {
    /// Fixed-size pool of `n` workers with no background maintenance.
    #[must_use]
    pub fn fixed(n: usize) -> Self {
        Self {
            min_workers: n,
            max_workers: n,
            initial_workers: n,
            maintenance_interval: None,
            ..Self::default()
        }
    }

    /// Checks the pool bounds.
    ///
    /// # Errors
    ///
    /// `InvalidPoolBounds` if `min` is zero or exceeds `max`.
    pub fn validate(&self) -> JobResult<()> {
        if self.min_workers == 0 || self.min_workers > self.max_workers {
            return Err(JobError::InvalidPoolBounds {
                min: self.min_workers,
                max: self.max_workers,
            });
        }
        Ok(())
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        let cores = num_cpus::get().max(1);
        Self {
            min_workers: (cores / 2).max(1),
            max_workers: cores * 4,
            initial_workers: cores,
            maintenance_interval: Some(Duration::from_secs(1)),
            idle_shrink_after: Duration::from_secs(5),
            arena_block_size: tessera_core::memory::DEFAULT_BLOCK_SIZE,
            error_channel_capacity: 1024,
        }
    }
}

// =============================================================================
// STATS
// =============================================================================

/// Snapshot of one worker's counters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Stable worker id.
    pub id: usize,
    /// Jobs executed, including stolen ones.
    pub completed: u64,
    /// Jobs taken from other workers.
    pub stolen: u64,
    /// Jobs waiting in the local queue.
    pub pending: usize,
    /// Sum of the waiting jobs' weights.
    pub pending_weight: u64,
    /// Whether a job is running right now.
    pub busy: bool,
}

/// Scheduler-wide statistics.
#[derive(Clone, Debug, Default)]
pub struct SchedulerStats {
    /// Live workers, in array order.
    pub workers: Vec<WorkerStats>,
    /// Jobs waiting across all live workers.
    pub pending_jobs: usize,
    /// Workers currently running a job.
    pub busy_workers: usize,
    /// Jobs executed, including by workers since retired.
    pub completed_jobs: u64,
    /// Jobs whose body failed or panicked.
    pub failed_jobs: u64,
    /// Grow steps taken by maintenance.
    pub grow_count: u64,
    /// Shrink steps taken by maintenance.
    pub shrink_count: u64,
    /// Current tick epoch.
    pub tick_epoch: u64,
}

/// A failure from an untracked job, delivered on [`JobScheduler::errors`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobFailure {
    /// Failed job.
    pub job: JobId,
    /// Its label.
    pub label: &'static str,
    /// What went wrong.
    pub error: JobError,
}

/// Outcome of one maintenance pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resize {
    /// Pool size unchanged.
    Unchanged,
    /// A worker was added.
    Grew,
    /// A worker was retired.
    Shrank,
}

// =============================================================================
// SHARED STATE
// =============================================================================

struct WorkerThread {
    worker: Arc<Worker>,
    handle: JoinHandle<()>,
}

/// State shared by the scheduler facade, worker threads and continuations.
pub(crate) struct Shared {
    config: SchedulerConfig,
    workers: Published<Vec<Arc<Worker>>>,
    threads: Mutex<Vec<WorkerThread>>,
    started: Instant,
    epoch: AtomicU64,
    next_worker_id: AtomicUsize,
    next_job_id: AtomicU64,
    errors_tx: Sender<JobFailure>,
    shutting_down: AtomicBool,
    failed: AtomicU64,
    retired_completed: AtomicU64,
    grow_count: AtomicU64,
    shrink_count: AtomicU64,
}

impl Shared {
    pub(crate) fn workers(&self) -> Arc<Vec<Arc<Worker>>> {
        self.workers.load()
    }

    pub(crate) fn tick_epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    pub(crate) fn now_ns(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    fn next_job_id(&self) -> JobId {
        JobId(self.next_job_id.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn record_failure(&self, job: JobId, label: &'static str, error: &JobError, tracked: bool) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        if tracked {
            tracing::debug!(%job, label, %error, "tracked job failed");
            return;
        }

        tracing::error!(%job, label, %error, "untracked job failed");
        let failure = JobFailure {
            job,
            label,
            error: error.clone(),
        };
        if let Err(TrySendError::Full(_)) = self.errors_tx.try_send(failure) {
            tracing::warn!(%job, "error channel full, failure dropped");
        }
    }

    /// Starts one worker thread and returns its shared half.
    fn spawn_worker(self: &Arc<Self>) -> JobResult<Arc<Worker>> {
        let id = self.next_worker_id.fetch_add(1, Ordering::Relaxed);
        let worker = Arc::new(Worker::new(id, self.now_ns()));
        let ctx = WorkerContext::new(id, self.config.arena_block_size, self.tick_epoch());

        let handle = std::thread::Builder::new()
            .name(format!("tessera-worker-{id}"))
            .spawn({
                let worker = Arc::clone(&worker);
                let shared = Arc::clone(self);
                move || run_worker(&worker, &shared, ctx)
            })
            .map_err(|e| JobError::Spawn(e.to_string()))?;

        self.threads.lock().push(WorkerThread {
            worker: Arc::clone(&worker),
            handle,
        });
        Ok(worker)
    }

    /// Places `job` on a live worker.
    fn submit(&self, mut job: Job) {
        if self.shutting_down.load(Ordering::Acquire) {
            job.state.finish(Err(JobError::ShutDown));
            return;
        }

        loop {
            let workers = self.workers();
            if workers.is_empty() {
                job.state.finish(Err(JobError::ShutDown));
                return;
            }

            let target = match job.options.affinity {
                Some(index) => &workers[index % workers.len()],
                None => two_choice(&workers),
            };

            match target.push(job) {
                Ok(()) => return,
                // Evicted between our load and the push; the next load
                // no longer contains it.
                Err(returned) => job = returned,
            }
        }
    }

    fn maintain(self: &Arc<Self>) -> Resize {
        self.reap_finished();
        if self.shutting_down.load(Ordering::Acquire) {
            return Resize::Unchanged;
        }

        let guard = self.workers.write();
        // Shutdown takes the writer lock before collecting threads; seen
        // under the lock, the flag rules out spawning one it would miss.
        if self.shutting_down.load(Ordering::Acquire) {
            return Resize::Unchanged;
        }
        let workers = guard.current();
        let len = workers.len();
        let pending: usize = workers.iter().map(|w| w.pending()).sum();
        let all_busy = workers.iter().all(|w| w.is_busy());

        if all_busy && pending > GROW_PENDING_FACTOR * len && len < self.config.max_workers {
            match self.spawn_worker() {
                Ok(worker) => {
                    let mut next = Vec::clone(&workers);
                    next.push(worker);
                    guard.publish(next);
                    self.grow_count.fetch_add(1, Ordering::Relaxed);
                    tracing::info!(workers = len + 1, pending, "worker pool grew");
                    return Resize::Grew;
                }
                Err(error) => {
                    tracing::warn!(%error, "could not grow worker pool");
                    return Resize::Unchanged;
                }
            }
        }

        if len > self.config.min_workers {
            let now = self.now_ns();
            let threshold = u64::try_from(self.config.idle_shrink_after.as_nanos()).unwrap_or(u64::MAX);
            let idle = workers.iter().position(|w| {
                !w.is_busy() && w.pending() == 0 && now.saturating_sub(w.idle_since_ns()) > threshold
            });

            if let Some(index) = idle {
                let evicted = Arc::clone(&workers[index]);
                let next: Vec<_> = workers
                    .iter()
                    .filter(|w| w.id() != evicted.id())
                    .cloned()
                    .collect();
                // Publish first so retries never pick the evicted worker again.
                guard.publish(next);
                evicted.retire();
                self.shrink_count.fetch_add(1, Ordering::Relaxed);
                tracing::info!(worker = evicted.id(), workers = len - 1, "worker pool shrank");
                return Resize::Shrank;
            }
        }

        Resize::Unchanged
    }

    /// Joins retired worker threads that have exited.
    fn reap_finished(&self) {
        let live: Vec<usize> = self.workers().iter().map(|w| w.id()).collect();
        let mut threads = self.threads.lock();
        let mut index = 0;
        while index < threads.len() {
            let thread = &threads[index];
            if !live.contains(&thread.worker.id()) && thread.handle.is_finished() {
                let thread = threads.swap_remove(index);
                self.retired_completed
                    .fetch_add(thread.worker.completed(), Ordering::Relaxed);
                if thread.handle.join().is_err() {
                    tracing::error!(worker = thread.worker.id(), "retired worker thread panicked");
                }
            } else {
                index += 1;
            }
        }
    }
}

/// Power-of-two-choices: two distinct random workers, lower pending weight wins.
fn two_choice(workers: &[Arc<Worker>]) -> &Arc<Worker> {
    let n = workers.len();
    if n == 1 {
        return &workers[0];
    }
    let mut rng = rand::thread_rng();
    let a = rng.gen_range(0..n);
    let mut b = rng.gen_range(0..n - 1);
    if b >= a {
        b += 1;
    }
    if workers[a].pending_weight() <= workers[b].pending_weight() {
        &workers[a]
    } else {
        &workers[b]
    }
}

// =============================================================================
// SCHEDULER
// =============================================================================

/// Work-stealing job scheduler with a dynamically sized worker pool.
///
/// # Example
///
/// ```rust
/// use tessera_jobs::{JobOptions, JobScheduler, SchedulerConfig};
///
/// let scheduler = JobScheduler::new(SchedulerConfig::fixed(2)).unwrap();
/// let first = scheduler.schedule(JobOptions::new(), |_ctx| Ok(()));
/// let second = scheduler.schedule_after(&first, JobOptions::new(), |ctx| {
///     let mut buf = ctx.scratch::<u32>(64);
///     buf[0] = 1;
///     Ok(())
/// });
/// second.wait();
/// assert!(first.is_complete());
/// ```
pub struct JobScheduler {
    shared: Arc<Shared>,
    errors_rx: Receiver<JobFailure>,
    maintenance: Mutex<Option<(Sender<()>, JoinHandle<()>)>>,
}

impl JobScheduler {
    /// Starts the pool and, if configured, the maintenance thread.
    ///
    /// # Errors
    ///
    /// `InvalidPoolBounds` for bad bounds, `Spawn` if a thread cannot start.
    pub fn new(config: SchedulerConfig) -> JobResult<Self> {
        config.validate()?;
        let initial = config.initial_workers.clamp(config.min_workers, config.max_workers);
        let (errors_tx, errors_rx) = crossbeam_channel::bounded(config.error_channel_capacity.max(1));

        let shared = Arc::new(Shared {
            config,
            workers: Published::new(Vec::new()),
            threads: Mutex::new(Vec::new()),
            started: Instant::now(),
            epoch: AtomicU64::new(0),
            next_worker_id: AtomicUsize::new(0),
            next_job_id: AtomicU64::new(1),
            errors_tx,
            shutting_down: AtomicBool::new(false),
            failed: AtomicU64::new(0),
            retired_completed: AtomicU64::new(0),
            grow_count: AtomicU64::new(0),
            shrink_count: AtomicU64::new(0),
        });

        let mut workers = Vec::with_capacity(initial);
        for _ in 0..initial {
            workers.push(shared.spawn_worker()?);
        }
        shared.workers.write().publish(workers);

        let maintenance = match shared.config.maintenance_interval {
            Some(interval) => Some(spawn_maintenance(&shared, interval)?),
            None => None,
        };

        tracing::info!(
            workers = initial,
            min = shared.config.min_workers,
            max = shared.config.max_workers,
            "job scheduler started"
        );

        Ok(Self {
            shared,
            errors_rx,
            maintenance: Mutex::new(maintenance),
        })
    }

    fn make_job(
        &self,
        options: JobOptions,
        body: impl FnOnce(&mut WorkerContext) -> JobResult<()> + Send + 'static,
        tracked: bool,
    ) -> Job {
        let body: JobBody = Box::new(body);
        Job {
            options,
            body,
            state: JobState::new(self.shared.next_job_id()),
            tracked,
        }
    }

    /// Schedules a tracked job.
    pub fn schedule(
        &self,
        options: JobOptions,
        body: impl FnOnce(&mut WorkerContext) -> JobResult<()> + Send + 'static,
    ) -> JobHandle {
        let job = self.make_job(options, body, true);
        let handle = JobHandle::from_state(Arc::clone(&job.state));
        self.shared.submit(job);
        handle
    }

    /// Schedules a fire-and-forget job. Failures are logged and sent to
    /// [`errors`](Self::errors).
    pub fn spawn(
        &self,
        options: JobOptions,
        body: impl FnOnce(&mut WorkerContext) -> JobResult<()> + Send + 'static,
    ) {
        let job = self.make_job(options, body, false);
        self.shared.submit(job);
    }

    /// Schedules `body` to run once `dependency` completes successfully.
    ///
    /// Never blocks. If the dependency fails, the returned handle fails with
    /// `DependencyFailed` and `body` is dropped unrun.
    pub fn schedule_after(
        &self,
        dependency: &JobHandle,
        options: JobOptions,
        body: impl FnOnce(&mut WorkerContext) -> JobResult<()> + Send + 'static,
    ) -> JobHandle {
        let job = self.make_job(options, body, true);
        let handle = JobHandle::from_state(Arc::clone(&job.state));
        let shared: Weak<Shared> = Arc::downgrade(&self.shared);

        dependency.on_complete(move |outcome| match outcome {
            Ok(()) => match shared.upgrade() {
                Some(shared) => shared.submit(job),
                // Scheduler gone: the dependent is abandoned, not failed.
                None => drop(job),
            },
            Err(error) => job.state.finish(Err(JobError::DependencyFailed(error.to_string()))),
        });

        handle
    }

    /// Advances the tick epoch. Each worker resets its arena before running
    /// its next job.
    pub fn begin_tick(&self) -> u64 {
        self.shared.epoch.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Current tick epoch.
    #[must_use]
    pub fn tick_epoch(&self) -> u64 {
        self.shared.tick_epoch()
    }

    /// Receiver for untracked job failures.
    #[must_use]
    pub fn errors(&self) -> &Receiver<JobFailure> {
        &self.errors_rx
    }

    /// Number of live workers.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.shared.workers().len()
    }

    /// Runs one grow/shrink pass immediately.
    pub fn maintain(&self) -> Resize {
        self.shared.maintain()
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        let workers: Vec<WorkerStats> = self
            .shared
            .workers()
            .iter()
            .map(|w| WorkerStats {
                id: w.id(),
                completed: w.completed(),
                stolen: w.stolen(),
                pending: w.pending(),
                pending_weight: w.pending_weight(),
                busy: w.is_busy(),
            })
            .collect();

        // Retired but not yet reaped workers still count toward completions.
        let live: Vec<usize> = workers.iter().map(|w| w.id).collect();
        let retiring: u64 = self
            .shared
            .threads
            .lock()
            .iter()
            .filter(|t| !live.contains(&t.worker.id()))
            .map(|t| t.worker.completed())
            .sum();

        SchedulerStats {
            pending_jobs: workers.iter().map(|w| w.pending).sum(),
            busy_workers: workers.iter().filter(|w| w.busy).count(),
            completed_jobs: workers.iter().map(|w| w.completed).sum::<u64>()
                + retiring
                + self.shared.retired_completed.load(Ordering::Relaxed),
            failed_jobs: self.shared.failed.load(Ordering::Relaxed),
            grow_count: self.shared.grow_count.load(Ordering::Relaxed),
            shrink_count: self.shared.shrink_count.load(Ordering::Relaxed),
            tick_epoch: self.shared.tick_epoch(),
            workers,
        }
    }

    /// Whether [`shutdown`](Self::shutdown) has started.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shared.shutting_down.load(Ordering::Acquire)
    }

    /// Stops maintenance, signals every worker and joins them within
    /// `timeout`.
    ///
    /// Jobs still queued are abandoned: their handles never complete. Returns
    /// `true` if every worker thread exited in time.
    pub fn shutdown(&self, timeout: Duration) -> bool {
        if self.shared.shutting_down.swap(true, Ordering::AcqRel) {
            return true;
        }
        let deadline = Instant::now() + timeout;

        if let Some((stop, handle)) = self.maintenance.lock().take() {
            drop(stop);
            if handle.join().is_err() {
                tracing::error!("maintenance thread panicked");
            }
        }

        // Waits out a manual `maintain()` already past its flag check.
        let threads = {
            let _resize = self.shared.workers.write();
            std::mem::take(&mut *self.shared.threads.lock())
        };
        for thread in &threads {
            thread.worker.request_stop();
        }

        let mut clean = true;
        for thread in threads {
            while !thread.handle.is_finished() && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(1));
            }
            if thread.handle.is_finished() {
                if thread.handle.join().is_err() {
                    tracing::error!(worker = thread.worker.id(), "worker thread panicked");
                }
            } else {
                tracing::warn!(worker = thread.worker.id(), "worker did not stop in time, detaching");
                clean = false;
            }
        }

        let abandoned: usize = self.shared.workers().iter().map(|w| w.abandon_queued()).sum();
        self.shared.workers.write().publish(Vec::new());

        tracing::info!(abandoned, clean, "job scheduler stopped");
        clean
    }
}

impl Drop for JobScheduler {
    fn drop(&mut self) {
        self.shutdown(DEFAULT_SHUTDOWN_TIMEOUT);
    }
}

fn spawn_maintenance(shared: &Arc<Shared>, interval: Duration) -> JobResult<(Sender<()>, JoinHandle<()>)> {
    let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
    let shared = Arc::downgrade(shared);

    let handle = std::thread::Builder::new()
        .name("tessera-maintenance".to_owned())
        .spawn(move || loop {
            match stop_rx.recv_timeout(interval) {
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                    let Some(shared) = shared.upgrade() else { break };
                    shared.maintain();
                }
                _ => break,
            }
        })
        .map_err(|e| JobError::Spawn(e.to_string()))?;

    Ok((stop_tx, handle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_config_validation() {
        assert!(SchedulerConfig::fixed(2).validate().is_ok());
        assert!(SchedulerConfig::fixed(0).validate().is_err());
        let bad = SchedulerConfig {
            min_workers: 4,
            max_workers: 2,
            ..SchedulerConfig::default()
        };
        assert_eq!(
            bad.validate(),
            Err(JobError::InvalidPoolBounds { min: 4, max: 2 })
        );
    }

    #[test]
    fn test_schedule_and_wait() {
        let scheduler = JobScheduler::new(SchedulerConfig::fixed(2)).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..100)
            .map(|_| {
                let counter = Arc::clone(&counter);
                scheduler.schedule(JobOptions::new(), move |_| {
                    counter.fetch_add(1, Ordering::Relaxed);
                    Ok(())
                })
            })
            .collect();

        assert!(crate::wait_all(&handles, Duration::from_secs(5)));
        assert_eq!(counter.load(Ordering::Relaxed), 100);
        assert_eq!(scheduler.stats().completed_jobs, 100);
    }

    #[test]
    fn test_affinity_wraps_modulo_pool() {
        let scheduler = JobScheduler::new(SchedulerConfig::fixed(2)).unwrap();
        let ran_on = Arc::new(AtomicUsize::new(usize::MAX));
        let r = Arc::clone(&ran_on);
        let handle = scheduler.schedule(JobOptions::new().affinity(3), move |ctx| {
            r.store(ctx.worker_id(), Ordering::Relaxed);
            Ok(())
        });
        handle.wait();

        // Index 3 maps to slot 1. The job may still be stolen, so only check
        // it ran on a live worker.
        let ran_on = ran_on.load(Ordering::Relaxed);
        assert!(scheduler.stats().workers.iter().any(|w| w.id == ran_on));
    }

    #[test]
    fn test_failures_captured_and_worker_survives() {
        let scheduler = JobScheduler::new(SchedulerConfig::fixed(1)).unwrap();
        let err = scheduler.schedule(JobOptions::new(), |_| Err(JobError::failed("nope")));
        let panicked = scheduler.schedule(JobOptions::new(), |_| panic!("boom"));
        let fine = scheduler.schedule(JobOptions::new(), |_| Ok(()));

        assert!(crate::wait_all(&[err.clone(), panicked.clone(), fine.clone()], Duration::from_secs(5)));
        assert_eq!(err.error(), Some(JobError::Failed("nope".into())));
        assert_eq!(panicked.error(), Some(JobError::Panicked("boom".into())));
        assert_eq!(fine.result(), Some(Ok(())));
        assert_eq!(scheduler.stats().failed_jobs, 2);
    }

    #[test]
    fn test_untracked_failures_reach_error_channel() {
        let scheduler = JobScheduler::new(SchedulerConfig::fixed(1)).unwrap();
        scheduler.spawn(JobOptions::new().label("snapshot"), |_| Err(JobError::failed("socket closed")));

        let failure = scheduler.errors().recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(failure.label, "snapshot");
        assert_eq!(failure.error, JobError::Failed("socket closed".into()));
    }

    #[test]
    fn test_schedule_after_shutdown_fails_fast() {
        let scheduler = JobScheduler::new(SchedulerConfig::fixed(1)).unwrap();
        assert!(scheduler.shutdown(Duration::from_secs(1)));
        let handle = scheduler.schedule(JobOptions::new(), |_| Ok(()));
        assert_eq!(handle.error(), Some(JobError::ShutDown));
        assert_eq!(scheduler.worker_count(), 0);
    }

    #[test]
    fn test_manual_maintain_racing_shutdown_leaves_no_threads() {
        for _ in 0..20 {
            let config = SchedulerConfig {
                min_workers: 1,
                max_workers: 8,
                initial_workers: 1,
                maintenance_interval: None,
                ..SchedulerConfig::default()
            };
            let scheduler = Arc::new(JobScheduler::new(config).unwrap());
            // Keep the pool busy with a backlog so every pass wants to grow.
            let _backlog: Vec<_> = (0..200)
                .map(|_| {
                    scheduler.schedule(JobOptions::new(), |_| {
                        std::thread::sleep(Duration::from_micros(200));
                        Ok(())
                    })
                })
                .collect();

            let resizer = {
                let scheduler = Arc::clone(&scheduler);
                std::thread::spawn(move || {
                    while !scheduler.is_shut_down() {
                        scheduler.maintain();
                    }
                    scheduler.maintain()
                })
            };
            scheduler.shutdown(Duration::from_secs(5));
            assert_eq!(resizer.join().unwrap(), Resize::Unchanged);

            assert!(scheduler.shared.threads.lock().is_empty());
            assert_eq!(scheduler.worker_count(), 0);
        }
    }

    #[test]
    fn test_begin_tick_advances_epoch() {
        let scheduler = JobScheduler::new(SchedulerConfig::fixed(1)).unwrap();
        assert_eq!(scheduler.begin_tick(), 1);
        let handle = scheduler.schedule(JobOptions::new(), |ctx| {
            assert_eq!(ctx.tick_epoch(), 1);
            Ok(())
        });
        handle.wait();
        assert_eq!(handle.result(), Some(Ok(())));
    }
}
