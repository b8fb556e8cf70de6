//! # Regional Tick Strategy
//!
//! One tick:
//!
//! ```text
//! 1. globals         run synchronously on the tick thread
//! 2. activation      observers ──> active regions
//! 3. merge           4-neighbour flood fill ──> groups
//! 4. collect         group ──> entities ──> their script threads
//! 5. dispatch        one batch per group, parallel, awaited
//! 6. snapshots       one untracked job per group, not awaited
//! ```
//!
//! Threads whose object sits outside every active region are parked and
//! retried next tick without counting as deferred.

use std::collections::HashMap;
use std::sync::Arc;

use tessera_core::EntityId;
use tessera_jobs::{JobError, JobOptions, JobPriority, JobScheduler};

use crate::config::ServerConfig;
use crate::region::{ObserverActivation, RegionActivation, RegionManager};
use crate::script::{BatchReport, BoxedThread, ScriptScheduler};
use crate::traits::{GameState, SnapshotSink, TimerService};

/// What one tick did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Tick number, starting at 1.
    pub tick: u64,
    /// Global thread counters.
    pub globals: BatchReport,
    /// Regional thread counters, summed over batches.
    pub regions: BatchReport,
    /// Active regions before merging.
    pub active_regions: usize,
    /// Groups dispatched.
    pub merged_regions: usize,
    /// Threads skipped because their object is not in an active region.
    pub parked: usize,
    /// Snapshot jobs spawned.
    pub snapshots: usize,
}

/// Per-tick orchestration over regions.
pub struct RegionalTickStrategy {
    jobs: Arc<JobScheduler>,
    scripts: ScriptScheduler,
    regions: Arc<RegionManager>,
    state: Arc<dyn GameState>,
    activation: Box<dyn RegionActivation>,
    sink: Arc<dyn SnapshotSink>,
    threads: Vec<BoxedThread>,
    tick: u64,
}

impl RegionalTickStrategy {
    /// Creates the strategy with observer-range activation from `config`.
    #[must_use]
    pub fn new(
        config: &ServerConfig,
        jobs: Arc<JobScheduler>,
        timer: Arc<dyn TimerService>,
        regions: Arc<RegionManager>,
        state: Arc<dyn GameState>,
        sink: Arc<dyn SnapshotSink>,
    ) -> Self {
        Self {
            scripts: ScriptScheduler::new(Arc::clone(&jobs), timer, config),
            jobs,
            regions,
            state,
            activation: Box::new(ObserverActivation::new(
                config.region_activation_range,
                config.z_activation_range,
            )),
            sink,
            threads: Vec::new(),
            tick: 0,
        }
    }

    /// Replaces the activation strategy.
    #[must_use]
    pub fn with_activation(mut self, activation: impl RegionActivation + 'static) -> Self {
        self.activation = Box::new(activation);
        self
    }

    /// Replaces the script scheduler, e.g. to change the budget.
    #[must_use]
    pub fn with_scripts(mut self, scripts: ScriptScheduler) -> Self {
        self.scripts = scripts;
        self
    }

    /// Hands a new thread to the scheduler; it first runs next tick.
    pub fn add_thread(&mut self, thread: BoxedThread) {
        self.threads.push(thread);
    }

    /// Threads held between ticks. Sleeping threads are held by the timer
    /// and not counted.
    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    /// Threads held between ticks.
    #[must_use]
    pub fn threads(&self) -> &[BoxedThread] {
        &self.threads
    }

    /// Ticks run so far.
    #[must_use]
    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Script scheduler.
    #[must_use]
    pub fn scripts(&self) -> &ScriptScheduler {
        &self.scripts
    }

    /// Job scheduler.
    #[must_use]
    pub fn jobs(&self) -> &Arc<JobScheduler> {
        &self.jobs
    }

    /// Runs one tick.
    pub fn tick(&mut self) -> TickReport {
        self.tick += 1;
        self.jobs.begin_tick();

        let mut threads = std::mem::take(&mut self.threads);
        threads.extend(self.scripts.drain_woken());
        let (globals, regional): (Vec<_>, Vec<_>) = threads
            .into_iter()
            .partition(|t| t.associated_object().is_none());

        let globals = self.scripts.run_globals(globals);
        self.threads = globals.ready;

        let active = self.activation.active_regions(&self.regions, &*self.state);
        let groups = self.regions.merge(&active);

        let mut members: Vec<Vec<EntityId>> = Vec::with_capacity(groups.len());
        let mut batches: Vec<Vec<BoxedThread>> = (0..groups.len()).map(|_| Vec::new()).collect();
        let mut parked = 0;
        {
            let _read = self.state.read_lock();
            let mut owner: HashMap<EntityId, usize> = HashMap::new();
            for (index, group) in groups.iter().enumerate() {
                let mut entities = Vec::new();
                for &key in group.members() {
                    entities.extend(self.state.entities_in_region(key));
                }
                owner.extend(entities.iter().map(|&e| (e, index)));
                members.push(entities);
            }
            for thread in regional {
                match thread.associated_object().and_then(|e| owner.get(&e)) {
                    Some(&index) => batches[index].push(thread),
                    None => {
                        parked += 1;
                        self.threads.push(thread);
                    }
                }
            }
        }

        let regions = self.scripts.run_batches(batches);
        self.threads.extend(regions.ready);

        let snapshots = groups.len();
        for (group, entities) in groups.into_iter().zip(members) {
            let sink = Arc::clone(&self.sink);
            let tick = self.tick;
            let options = JobOptions::new().priority(JobPriority::Low).label("snapshot");
            self.jobs.spawn(options, move |_ctx| {
                sink.send_region(tick, &group, &entities).map_err(JobError::failed)
            });
        }

        let report = TickReport {
            tick: self.tick,
            globals: globals.report,
            regions: regions.report,
            active_regions: active.len(),
            merged_regions: snapshots,
            parked,
            snapshots,
        };
        tracing::debug!(
            tick = report.tick,
            active = report.active_regions,
            groups = report.merged_regions,
            ran = report.globals.ran + report.regions.ran,
            deferred = report.regions.deferred,
            parked,
            "tick complete"
        );
        report
    }
}

impl std::fmt::Debug for RegionalTickStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionalTickStrategy")
            .field("tick", &self.tick)
            .field("threads", &self.threads.len())
            .finish_non_exhaustive()
    }
}
