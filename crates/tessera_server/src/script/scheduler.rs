//! # Script Scheduler
//!
//! Runs script threads with instruction slices under a per-batch wall-clock
//! budget.
//!
//! ## Budget
//!
//! Every batch (one merged region) starts a stopwatch when its first job
//! reaches a worker, so time spent queued behind other batches is not charged
//! to it. Before a thread runs, its job checks:
//!
//! ```text
//! exceeded flag set?                         ──> defer
//! elapsed + mean run time so far >= budget?  ──> set flag, defer
//! otherwise                                  ──> run
//! ```
//!
//! Deferred threads come back untouched apart from `wait_ticks += 1`.
//! Running past the budget is never an error.
//!
//! ## Ordering
//!
//! Batches are submitted longest-waiting first (by the largest `wait_ticks`
//! among their threads), and so are the threads within each batch.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use tessera_jobs::{wait_all, JobHandle, JobOptions, JobScheduler, JobStatus};

use super::{instruction_slice, next_balance, BoxedThread, ThreadState};
use crate::config::ServerConfig;
use crate::traits::TimerService;

/// How long the tick blocks on batch jobs before re-checking for shutdown.
const BATCH_POLL: Duration = Duration::from_millis(100);

/// Counters for one batch, or the sum over several.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Threads that ran.
    pub ran: usize,
    /// Threads deferred by the budget.
    pub deferred: usize,
    /// Threads that went to sleep.
    pub slept: usize,
    /// Threads that finished and were dropped.
    pub terminated: usize,
    /// Threads lost to a panic or error in their job.
    pub failed: usize,
    /// Instructions executed.
    pub instructions: u64,
    /// Whether the budget cut the batch short.
    pub budget_exceeded: bool,
}

impl BatchReport {
    /// Adds `other` into `self`.
    pub fn absorb(&mut self, other: &Self) {
        self.ran += other.ran;
        self.deferred += other.deferred;
        self.slept += other.slept;
        self.terminated += other.terminated;
        self.failed += other.failed;
        self.instructions += other.instructions;
        self.budget_exceeded |= other.budget_exceeded;
    }
}

/// Result of running a set of threads.
pub struct ScheduleOutcome {
    /// Threads to run again next tick: still running or deferred.
    pub ready: Vec<BoxedThread>,
    /// Totals over all batches.
    pub report: BatchReport,
    /// One report per batch, in the order the batches were passed in.
    pub batches: Vec<BatchReport>,
}

impl std::fmt::Debug for ScheduleOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduleOutcome")
            .field("ready", &self.ready.len())
            .field("report", &self.report)
            .field("batches", &self.batches.len())
            .finish()
    }
}

// ============================================================================
// BATCH CLOCK
// ============================================================================

struct BatchClock {
    started: OnceLock<Instant>,
    budget: Duration,
    exceeded: AtomicBool,
    runs: AtomicU64,
    run_nanos: AtomicU64,
}

impl BatchClock {
    fn new(budget: Duration) -> Self {
        Self {
            started: OnceLock::new(),
            budget,
            exceeded: AtomicBool::new(false),
            runs: AtomicU64::new(0),
            run_nanos: AtomicU64::new(0),
        }
    }

    fn admit(&self) -> bool {
        if self.exceeded.load(Ordering::Acquire) {
            return false;
        }
        let runs = self.runs.load(Ordering::Acquire);
        let mean = match runs {
            0 => Duration::ZERO,
            n => Duration::from_nanos(self.run_nanos.load(Ordering::Acquire) / n),
        };
        let started = *self.started.get_or_init(Instant::now);
        if started.elapsed() + mean >= self.budget {
            self.exceeded.store(true, Ordering::Release);
            return false;
        }
        true
    }

    #[allow(clippy::cast_possible_truncation)]
    fn record(&self, took: Duration) {
        self.run_nanos.fetch_add(took.as_nanos() as u64, Ordering::AcqRel);
        self.runs.fetch_add(1, Ordering::AcqRel);
    }
}

enum RunOutcome {
    Ran {
        thread: BoxedThread,
        state: ThreadState,
        executed: u64,
    },
    Deferred(BoxedThread),
}

// ============================================================================
// SCHEDULER
// ============================================================================

/// Dispatches script threads onto the job scheduler.
pub struct ScriptScheduler {
    jobs: Arc<JobScheduler>,
    timer: Arc<dyn TimerService>,
    base_slice: u64,
    budget: Duration,
    woken_tx: Sender<BoxedThread>,
    woken_rx: Receiver<BoxedThread>,
}

impl ScriptScheduler {
    /// Creates a scheduler using the slice and budget from `config`.
    #[must_use]
    pub fn new(jobs: Arc<JobScheduler>, timer: Arc<dyn TimerService>, config: &ServerConfig) -> Self {
        Self::with_budget(jobs, timer, config.base_instruction_slice, config.script_budget())
    }

    /// Creates a scheduler with explicit limits.
    #[must_use]
    pub fn with_budget(
        jobs: Arc<JobScheduler>,
        timer: Arc<dyn TimerService>,
        base_slice: u64,
        budget: Duration,
    ) -> Self {
        let (woken_tx, woken_rx) = crossbeam_channel::unbounded();
        Self {
            jobs,
            timer,
            base_slice,
            budget,
            woken_tx,
            woken_rx,
        }
    }

    /// Per-batch wall-clock budget.
    #[must_use]
    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Normal-priority slice.
    #[must_use]
    pub fn base_slice(&self) -> u64 {
        self.base_slice
    }

    /// Takes every thread whose sleep timer has fired since the last call.
    pub fn drain_woken(&self) -> Vec<BoxedThread> {
        self.woken_rx.try_iter().collect()
    }

    /// Runs global threads one after another on the calling thread.
    ///
    /// Globals are not subject to the budget.
    pub fn run_globals(&self, threads: Vec<BoxedThread>) -> ScheduleOutcome {
        let mut ready = Vec::new();
        let mut report = BatchReport::default();
        for mut thread in threads {
            let (state, executed) = run_sliced(&mut thread, self.base_slice);
            report.ran += 1;
            report.instructions += executed;
            self.dispose(thread, state, &mut ready, &mut report);
        }
        ScheduleOutcome {
            ready,
            report,
            batches: vec![report],
        }
    }

    /// Runs each batch as parallel jobs, one job per thread, and waits for
    /// all of them.
    ///
    /// Batches holding the longest-deferred threads are submitted first, and
    /// within a batch so are those threads. Reports stay in input order.
    pub fn run_batches(&self, batches: Vec<Vec<BoxedThread>>) -> ScheduleOutcome {
        let (tx, rx) = crossbeam_channel::unbounded::<(usize, RunOutcome)>();
        let clocks: Vec<Arc<BatchClock>> = (0..batches.len())
            .map(|_| Arc::new(BatchClock::new(self.budget)))
            .collect();
        let mut handles: Vec<JobHandle> = Vec::new();

        let mut order: Vec<(usize, Vec<BoxedThread>)> = batches.into_iter().enumerate().collect();
        for (_, batch) in &mut order {
            batch.sort_by_key(|t| std::cmp::Reverse(t.wait_ticks()));
        }
        // Stable sort: ties keep input order.
        order.sort_by_key(|(_, batch)| {
            std::cmp::Reverse(batch.first().map_or(0, |t| t.wait_ticks()))
        });

        for (index, batch) in order {
            let clock = &clocks[index];
            for thread in batch {
                let tx = tx.clone();
                let clock = Arc::clone(clock);
                let base = self.base_slice;
                let options = JobOptions::new()
                    .priority(thread.priority().job_priority())
                    .label("script");
                handles.push(self.jobs.schedule(options, move |_ctx| {
                    let outcome = run_in_batch(thread, base, &clock);
                    // The receiver lives until every handle is complete.
                    let _ = tx.send((index, outcome));
                    Ok(())
                }));
            }
        }
        drop(tx);

        while !wait_all(&handles, BATCH_POLL) {
            if self.jobs.is_shut_down() {
                tracing::warn!("job scheduler shut down with script batches outstanding");
                break;
            }
        }

        let mut batches: Vec<BatchReport> = clocks
            .iter()
            .map(|clock| BatchReport {
                budget_exceeded: clock.exceeded.load(Ordering::Acquire),
                ..BatchReport::default()
            })
            .collect();
        let mut ready = Vec::new();

        for (index, outcome) in rx.try_iter() {
            let report = &mut batches[index];
            match outcome {
                RunOutcome::Ran {
                    thread,
                    state,
                    executed,
                } => {
                    report.ran += 1;
                    report.instructions += executed;
                    self.dispose(thread, state, &mut ready, report);
                }
                RunOutcome::Deferred(thread) => {
                    report.deferred += 1;
                    ready.push(thread);
                }
            }
        }

        let mut total = BatchReport::default();
        for report in &batches {
            total.absorb(report);
        }
        total.failed = handles
            .iter()
            .filter(|h| h.status() == JobStatus::Failed)
            .inspect(|h| {
                if let Some(error) = h.error() {
                    tracing::warn!(job = %h.id(), %error, "script thread lost");
                }
            })
            .count();

        if total.budget_exceeded {
            tracing::debug!(deferred = total.deferred, "script budget exceeded");
        }

        ScheduleOutcome {
            ready,
            report: total,
            batches,
        }
    }

    fn dispose(
        &self,
        mut thread: BoxedThread,
        state: ThreadState,
        ready: &mut Vec<BoxedThread>,
        report: &mut BatchReport,
    ) {
        match state {
            ThreadState::Running => ready.push(thread),
            ThreadState::Sleeping => {
                report.slept += 1;
                match thread.sleep_until() {
                    Some(at) => {
                        let woken = self.woken_tx.clone();
                        self.timer.add_timer(
                            at,
                            Box::new(move || {
                                thread.wake_up();
                                let _ = woken.send(thread);
                            }),
                        );
                    }
                    None => {
                        thread.wake_up();
                        ready.push(thread);
                    }
                }
            }
            ThreadState::Terminated => report.terminated += 1,
        }
    }
}

impl std::fmt::Debug for ScriptScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptScheduler")
            .field("base_slice", &self.base_slice)
            .field("budget", &self.budget)
            .finish_non_exhaustive()
    }
}

fn run_sliced(thread: &mut BoxedThread, base: u64) -> (ThreadState, u64) {
    let slice = instruction_slice(base, thread.priority(), thread.quota_balance());
    let before = thread.total_instructions();
    let state = thread.run(slice);
    let executed = thread.total_instructions().saturating_sub(before);
    thread.set_quota_balance(next_balance(base, slice, executed));
    thread.set_wait_ticks(0);
    (state, executed)
}

fn run_in_batch(mut thread: BoxedThread, base: u64, clock: &BatchClock) -> RunOutcome {
    if !clock.admit() {
        let waited = thread.wait_ticks().saturating_add(1);
        thread.set_wait_ticks(waited);
        return RunOutcome::Deferred(thread);
    }
    let started = Instant::now();
    let (state, executed) = run_sliced(&mut thread, base);
    clock.record(started.elapsed());
    RunOutcome::Ran {
        thread,
        state,
        executed,
    }
}
