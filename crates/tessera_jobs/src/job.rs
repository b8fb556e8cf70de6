//! # Jobs and Handles
//!
//! A job is a boxed closure plus scheduling metadata. Its completion is
//! observed through a [`JobHandle`], which can be waited on, polled, or given
//! continuations.
//!
//! ## Lifecycle
//!
//! ```text
//! Pending ──> Running ──> Completed
//!    │                 └─> Failed (error or panic)
//!    └──────────────────> Failed (dependency failed, body never ran)
//!
//! abandoned at shutdown: stays Pending/Running forever (inconclusive)
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{JobError, JobResult};
use crate::worker::WorkerContext;

/// Scheduling priority. Higher priorities are popped first.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum JobPriority {
    /// Background work; stolen first.
    Low = 0,
    /// Default.
    #[default]
    Normal = 1,
    /// Latency sensitive.
    High = 2,
}

impl JobPriority {
    /// Number of priority classes.
    pub const COUNT: usize = 3;

    #[inline]
    pub(crate) const fn slot(self) -> usize {
        self as usize
    }
}

/// Placement and accounting metadata for one job.
#[derive(Clone, Copy, Debug)]
pub struct JobOptions {
    /// Queue class.
    pub priority: JobPriority,
    /// Relative cost, used by load-aware placement. Not a unit count.
    pub weight: u32,
    /// Preferred worker index (taken modulo the pool size).
    pub affinity: Option<usize>,
    /// Static label for logs and error reports.
    pub label: &'static str,
}

impl JobOptions {
    /// Normal priority, weight 1, no affinity.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            priority: JobPriority::Normal,
            weight: 1,
            affinity: None,
            label: "job",
        }
    }

    /// Sets the priority.
    #[must_use]
    pub const fn priority(mut self, priority: JobPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the weight (minimum 1).
    #[must_use]
    pub const fn weight(mut self, weight: u32) -> Self {
        self.weight = if weight == 0 { 1 } else { weight };
        self
    }

    /// Pins the job to a worker index.
    #[must_use]
    pub const fn affinity(mut self, worker: usize) -> Self {
        self.affinity = Some(worker);
        self
    }

    /// Sets the diagnostic label.
    #[must_use]
    pub const fn label(mut self, label: &'static str) -> Self {
        self.label = label;
        self
    }
}

impl Default for JobOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-unique job identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(pub(crate) u64);

impl JobId {
    /// Raw value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// Observable job status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum JobStatus {
    /// Queued or waiting on a dependency.
    Pending = 0,
    /// Body is executing.
    Running = 1,
    /// Body returned `Ok`.
    Completed = 2,
    /// Body failed, panicked, or a dependency failed.
    Failed = 3,
}

impl JobStatus {
    const fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Pending,
            1 => Self::Running,
            2 => Self::Completed,
            _ => Self::Failed,
        }
    }

    /// Whether the job reached a terminal state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

type Continuation = Box<dyn FnOnce(JobResult<()>) + Send>;

/// Shared completion state behind a handle.
pub(crate) struct JobState {
    id: JobId,
    status: AtomicU8,
    done: AtomicBool,
    error: Mutex<Option<JobError>>,
    continuations: Mutex<Vec<Continuation>>,
    mutex: Mutex<()>,
    condvar: Condvar,
}

impl JobState {
    pub(crate) fn new(id: JobId) -> Arc<Self> {
        Arc::new(Self {
            id,
            status: AtomicU8::new(JobStatus::Pending as u8),
            done: AtomicBool::new(false),
            error: Mutex::new(None),
            continuations: Mutex::new(Vec::new()),
            mutex: Mutex::new(()),
            condvar: Condvar::new(),
        })
    }

    pub(crate) fn id(&self) -> JobId {
        self.id
    }

    pub(crate) fn set_running(&self) {
        self.status.store(JobStatus::Running as u8, Ordering::Release);
    }

    fn result(&self) -> JobResult<()> {
        match self.error.lock().clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Records the outcome, wakes waiters, then runs continuations on the
    /// calling thread.
    pub(crate) fn finish(&self, result: JobResult<()>) {
        let status = if result.is_ok() {
            JobStatus::Completed
        } else {
            JobStatus::Failed
        };
        if let Err(e) = &result {
            *self.error.lock() = Some(e.clone());
        }
        self.status.store(status as u8, Ordering::Release);

        let continuations = {
            let mut pending = self.continuations.lock();
            {
                let _guard = self.mutex.lock();
                self.done.store(true, Ordering::Release);
            }
            self.condvar.notify_all();
            std::mem::take(&mut *pending)
        };

        for continuation in continuations {
            continuation(result.clone());
        }
    }

    fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    fn wait(&self) {
        if self.is_done() {
            return;
        }
        let mut guard = self.mutex.lock();
        while !self.is_done() {
            self.condvar.wait(&mut guard);
        }
    }

    fn wait_until(&self, deadline: Instant) -> bool {
        if self.is_done() {
            return true;
        }
        let mut guard = self.mutex.lock();
        while !self.is_done() {
            if self.condvar.wait_until(&mut guard, deadline).timed_out() {
                return self.is_done();
            }
        }
        true
    }

    fn on_complete(&self, continuation: Continuation) {
        let mut pending = self.continuations.lock();
        if self.is_done() {
            drop(pending);
            continuation(self.result());
            return;
        }
        pending.push(continuation);
    }
}

/// Awaitable completion handle.
///
/// Cloning is cheap; every clone observes the same job.
#[derive(Clone)]
pub struct JobHandle {
    pub(crate) state: Arc<JobState>,
}

impl JobHandle {
    pub(crate) fn from_state(state: Arc<JobState>) -> Self {
        Self { state }
    }

    /// A handle that is already complete. Useful as a no-op dependency.
    #[must_use]
    pub fn completed() -> Self {
        let state = JobState::new(JobId(0));
        state.finish(Ok(()));
        Self { state }
    }

    /// A handle that has already failed with `error`.
    #[must_use]
    pub fn failed(error: JobError) -> Self {
        let state = JobState::new(JobId(0));
        state.finish(Err(error));
        Self { state }
    }

    /// Job identifier; `0` for synthetic handles.
    #[must_use]
    pub fn id(&self) -> JobId {
        self.state.id()
    }

    /// Blocks until the job completes.
    ///
    /// Never returns for a job abandoned at shutdown; use
    /// [`wait_timeout`](Self::wait_timeout) on shutdown paths.
    pub fn wait(&self) {
        self.state.wait();
    }

    /// Waits with timeout. Returns true if completed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.state.wait_until(Instant::now() + timeout)
    }

    /// Returns true if completed (successfully or not).
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.state.is_done()
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> JobStatus {
        JobStatus::from_u8(self.state.status.load(Ordering::Acquire))
    }

    /// Captured failure, if the job failed.
    #[must_use]
    pub fn error(&self) -> Option<JobError> {
        self.state.error.lock().clone()
    }

    /// Outcome, or `None` while still pending.
    #[must_use]
    pub fn result(&self) -> Option<JobResult<()>> {
        self.is_complete().then(|| self.state.result())
    }

    /// Runs `f` once the job completes.
    ///
    /// If the job is already complete, `f` runs immediately on the calling
    /// thread; otherwise on the thread that completes the job.
    pub fn on_complete(&self, f: impl FnOnce(JobResult<()>) + Send + 'static) {
        self.state.on_complete(Box::new(f));
    }
}

impl fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobHandle")
            .field("id", &self.id())
            .field("status", &self.status())
            .finish()
    }
}

/// Waits for every handle or until `timeout` elapses.
///
/// Returns true if all handles completed in time.
pub fn wait_all(handles: &[JobHandle], timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    handles.iter().all(|h| h.state.wait_until(deadline))
}

/// Body of a job.
pub type JobBody = Box<dyn FnOnce(&mut WorkerContext) -> JobResult<()> + Send>;

/// A queued unit of work.
pub(crate) struct Job {
    pub(crate) options: JobOptions,
    pub(crate) body: JobBody,
    pub(crate) state: Arc<JobState>,
    pub(crate) tracked: bool,
}

impl Job {
    #[inline]
    pub(crate) fn weight(&self) -> u64 {
        u64::from(self.options.weight)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_completed_handle() {
        let handle = JobHandle::completed();
        assert!(handle.is_complete());
        assert_eq!(handle.status(), JobStatus::Completed);
        assert!(handle.wait_timeout(Duration::ZERO));
        assert_eq!(handle.result(), Some(Ok(())));
    }

    #[test]
    fn test_failed_handle_reports_error() {
        let handle = JobHandle::failed(JobError::failed("boom"));
        assert_eq!(handle.status(), JobStatus::Failed);
        assert_eq!(handle.error(), Some(JobError::Failed("boom".into())));
    }

    #[test]
    fn test_on_complete_after_and_before_finish() {
        let hits = Arc::new(AtomicUsize::new(0));

        let state = JobState::new(JobId(1));
        let handle = JobHandle::from_state(Arc::clone(&state));
        let h = Arc::clone(&hits);
        handle.on_complete(move |r| {
            assert!(r.is_ok());
            h.fetch_add(1, Ordering::Relaxed);
        });
        assert_eq!(hits.load(Ordering::Relaxed), 0);

        state.finish(Ok(()));
        assert_eq!(hits.load(Ordering::Relaxed), 1);

        // Late registration runs immediately.
        let h = Arc::clone(&hits);
        handle.on_complete(move |_| {
            h.fetch_add(1, Ordering::Relaxed);
        });
        assert_eq!(hits.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_wait_timeout_on_pending() {
        let handle = JobHandle::from_state(JobState::new(JobId(2)));
        assert!(!handle.wait_timeout(Duration::from_millis(5)));
        assert_eq!(handle.status(), JobStatus::Pending);
        assert!(!wait_all(&[handle, JobHandle::completed()], Duration::from_millis(1)));
    }

    #[test]
    fn test_wait_wakes_from_other_thread() {
        let state = JobState::new(JobId(3));
        let handle = JobHandle::from_state(Arc::clone(&state));
        let finisher = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            state.finish(Err(JobError::Panicked("x".into())));
        });
        handle.wait();
        finisher.join().unwrap();
        assert!(matches!(handle.error(), Some(JobError::Panicked(_))));
    }

    #[test]
    fn test_options_builder() {
        let opts = JobOptions::new().priority(JobPriority::High).weight(0).affinity(3).label("x");
        assert_eq!(opts.priority, JobPriority::High);
        assert_eq!(opts.weight, 1);
        assert_eq!(opts.affinity, Some(3));
        assert!(JobPriority::High > JobPriority::Low);
    }
}
