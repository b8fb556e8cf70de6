//! # Regional Tick Tests
//!
//! Full pipeline over a real `WorldState`: activation, merging, dispatch,
//! parking, snapshots and timer wake-ups.
//!
//! Run with: cargo test -p tessera_server --test regional_tick

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{new_log, RunLog, TestScript};
use tessera_core::{EntityId, ObjectType, ObjectTypeRegistry, TypeDef};
use tessera_jobs::JobScheduler;
use tessera_server::{
    RecordingSink, RegionKey, RegionManager, RegionalTickStrategy, ServerConfig, TickDriver,
    TilePos, TimerQueue, WorldState,
};

struct Harness {
    world: Arc<WorldState>,
    sink: Arc<RecordingSink>,
    mob: Arc<ObjectType>,
    log: RunLog,
    driver: TickDriver,
}

impl Harness {
    fn new(range: u32, merge_regions: bool) -> Self {
        let config = ServerConfig {
            chunk_size: 16,
            region_size: 1,
            map_width: 256,
            map_height: 256,
            region_activation_range: range,
            merge_regions,
            min_regions_to_merge: 2,
            min_workers: 2,
            max_workers: 2,
            ..ServerConfig::default()
        };
        let mut registry = ObjectTypeRegistry::new();
        registry.register(TypeDef::new("/mob")).unwrap();
        registry.finalize().unwrap();

        let jobs = Arc::new(JobScheduler::new(config.scheduler_config()).unwrap());
        let regions = Arc::new(RegionManager::new(&config));
        let world = Arc::new(WorldState::new(Arc::clone(&regions)));
        let timer = Arc::new(TimerQueue::new());
        let sink = Arc::new(RecordingSink::new());
        let strategy = RegionalTickStrategy::new(
            &config,
            jobs,
            timer.clone(),
            regions,
            world.clone(),
            sink.clone(),
        );

        Self {
            world,
            sink,
            mob: registry.get("/mob").unwrap(),
            log: new_log(),
            driver: TickDriver::new(&config, strategy, timer),
        }
    }

    fn spawn(&self, x: i32, y: i32) -> EntityId {
        self.world.spawn(Arc::clone(&self.mob), TilePos::new(x, y, 0))
    }

    fn observer(&self, x: i32, y: i32) -> EntityId {
        let entity = self.spawn(x, y);
        self.world.add_observer(entity);
        entity
    }

    fn add(&mut self, script: TestScript) {
        self.driver.strategy_mut().add_thread(Box::new(script));
    }

    fn runs_of(&self, id: u32) -> usize {
        self.log.lock().iter().filter(|(p, _)| *p == id).count()
    }

    fn wait_for_snapshots(&self, count: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while self.sink.len() < count && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
    }
}

#[test]
fn globals_run_before_regional_threads() {
    let mut h = Harness::new(0, true);
    let mob = h.observer(8, 8);
    let log = h.log.clone();
    h.add(TestScript::new(1, Some(mob), &log));
    h.add(TestScript::new(0, None, &log));

    let report = h.driver.step();
    assert_eq!(report.globals.ran, 1);
    assert_eq!(report.regions.ran, 1);

    let entries = h.log.lock().clone();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].0, 0, "global thread must run first");
    assert!(entries[0].1 <= entries[1].1);
}

#[test]
fn threads_outside_active_regions_are_parked() {
    let mut h = Harness::new(0, true);
    let observer = h.observer(8, 8);
    let near = h.spawn(10, 10);
    let far = h.spawn(200, 200);
    let log = h.log.clone();
    h.add(TestScript::new(1, Some(near), &log));
    h.add(TestScript::new(2, Some(far), &log));

    let report = h.driver.step();
    assert_eq!(report.active_regions, 1);
    assert_eq!(report.regions.ran, 1);
    assert_eq!(report.parked, 1);
    assert_eq!(report.regions.deferred, 0);
    assert_eq!(h.runs_of(2), 0);
    assert_eq!(h.driver.strategy().thread_count(), 2);

    assert!(h.world.move_to(observer, TilePos::new(200, 200, 0)));
    let report = h.driver.step();
    assert_eq!(report.regions.ran, 1);
    assert_eq!(h.runs_of(2), 1);
    assert_eq!(h.runs_of(1), 1);
}

#[test]
fn adjacent_active_regions_share_one_batch() {
    let mut merged = Harness::new(1, true);
    merged.observer(5 * 16 + 8, 5 * 16 + 8);
    let report = merged.driver.step();
    assert_eq!(report.active_regions, 9);
    assert_eq!(report.merged_regions, 1);

    let mut split = Harness::new(1, false);
    split.observer(5 * 16 + 8, 5 * 16 + 8);
    let report = split.driver.step();
    assert_eq!(report.active_regions, 9);
    assert_eq!(report.merged_regions, 9);
}

#[test]
fn activation_clips_at_the_map_edge() {
    let mut h = Harness::new(1, true);
    h.observer(0, 0);
    let report = h.driver.step();
    assert_eq!(report.active_regions, 4);
}

#[test]
fn snapshots_reach_the_sink() {
    let mut h = Harness::new(0, true);
    let observer = h.observer(8, 8);
    let mob = h.spawn(12, 3);
    let _far = h.spawn(100, 100);

    let report = h.driver.step();
    assert_eq!(report.snapshots, 1);
    h.wait_for_snapshots(1);

    let records = h.sink.drain();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].tick, 1);
    assert_eq!(records[0].region, RegionKey::new(0, 0, 0));
    let mut expected = vec![observer, mob];
    expected.sort();
    assert_eq!(records[0].entities, expected);
}

#[test]
fn sleeping_thread_wakes_through_the_timer() {
    let mut h = Harness::new(0, true);
    let log = h.log.clone();
    h.add(TestScript::new(7, None, &log).nap(Duration::from_millis(20)));

    let report = h.driver.step();
    assert_eq!(report.globals.slept, 1);
    assert_eq!(h.driver.strategy().thread_count(), 0);
    assert_eq!(h.driver.timer().len(), 1);

    std::thread::sleep(Duration::from_millis(30));
    let report = h.driver.step();
    assert_eq!(report.globals.ran, 1);
    assert_eq!(h.runs_of(7), 2);
    assert!(h.driver.timer().is_empty());
    assert_eq!(h.driver.strategy().thread_count(), 1);
}

#[test]
fn driver_stops_on_cancellation() {
    let mut h = Harness::new(0, true);
    let log = h.log.clone();
    h.add(TestScript::new(0, None, &log));
    let cancel = h.driver.cancellation_token();

    let stopper = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(200));
        cancel.cancel();
    });
    let stats = h.driver.run();
    stopper.join().unwrap();

    assert!(stats.total_ticks >= 1);
    assert_eq!(h.runs_of(0) as u64, stats.total_ticks);
}
