//! # Pool Resize Tests
//!
//! Drives `maintain()` by hand to exercise grow and shrink.
//!
//! Run with: cargo test -p tessera_jobs --test pool_resize

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tessera_jobs::{wait_all, JobOptions, JobScheduler, JobStatus, Resize, SchedulerConfig};

#[test]
fn grows_under_backlog_then_shrinks_when_idle() {
    let config = SchedulerConfig {
        min_workers: 1,
        max_workers: 3,
        initial_workers: 1,
        maintenance_interval: None,
        idle_shrink_after: Duration::from_millis(20),
        ..SchedulerConfig::default()
    };
    let scheduler = JobScheduler::new(config).unwrap();

    let (started_tx, started_rx) = crossbeam_channel::bounded::<()>(1);
    let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(1);
    let blocker = scheduler.schedule(JobOptions::new(), move |_| {
        let _ = started_tx.send(());
        let _ = release_rx.recv_timeout(Duration::from_secs(5));
        Ok(())
    });
    started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    let mut handles: Vec<_> = (0..20)
        .map(|_| scheduler.schedule(JobOptions::new(), |_| Ok(())))
        .collect();

    // One busy worker with 20 pending > 10 × 1.
    assert_eq!(scheduler.maintain(), Resize::Grew);
    assert_eq!(scheduler.worker_count(), 2);

    release_tx.send(()).unwrap();
    handles.push(blocker);
    assert!(wait_all(&handles, Duration::from_secs(5)));

    std::thread::sleep(Duration::from_millis(60));
    assert_eq!(scheduler.maintain(), Resize::Shrank);
    assert_eq!(scheduler.worker_count(), 1);

    // At the minimum: no further shrink.
    std::thread::sleep(Duration::from_millis(60));
    assert_eq!(scheduler.maintain(), Resize::Unchanged);

    let stats = scheduler.stats();
    assert_eq!(stats.grow_count, 1);
    assert_eq!(stats.shrink_count, 1);
    assert_eq!(stats.completed_jobs, 21);

    // The surviving pool still accepts work.
    let after = scheduler.schedule(JobOptions::new(), |_| Ok(()));
    assert!(after.wait_timeout(Duration::from_secs(5)));
}

#[test]
fn never_grows_past_max() {
    let scheduler = JobScheduler::new(SchedulerConfig::fixed(1)).unwrap();
    let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(1);
    let (started_tx, started_rx) = crossbeam_channel::bounded::<()>(1);
    let blocker = scheduler.schedule(JobOptions::new(), move |_| {
        let _ = started_tx.send(());
        let _ = release_rx.recv_timeout(Duration::from_secs(5));
        Ok(())
    });
    started_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    let backlog: Vec<_> = (0..50).map(|_| scheduler.schedule(JobOptions::new(), |_| Ok(()))).collect();

    assert_eq!(scheduler.maintain(), Resize::Unchanged);
    assert_eq!(scheduler.worker_count(), 1);

    release_tx.send(()).unwrap();
    assert!(blocker.wait_timeout(Duration::from_secs(5)));
    assert!(wait_all(&backlog, Duration::from_secs(5)));
}

#[test]
fn submissions_survive_concurrent_shrinking() {
    // Workers become shrink candidates the moment they go idle, so evictions
    // land between a submitter's array load and its push.
    let config = SchedulerConfig {
        min_workers: 1,
        max_workers: 4,
        initial_workers: 4,
        maintenance_interval: None,
        idle_shrink_after: Duration::ZERO,
        ..SchedulerConfig::default()
    };
    let scheduler = Arc::new(JobScheduler::new(config).unwrap());
    let done = Arc::new(AtomicUsize::new(0));

    let submitters: Vec<_> = (0..4)
        .map(|_| {
            let scheduler = Arc::clone(&scheduler);
            let done = Arc::clone(&done);
            std::thread::spawn(move || {
                (0..2_000)
                    .map(|_| {
                        let done = Arc::clone(&done);
                        scheduler.schedule(JobOptions::new(), move |_| {
                            done.fetch_add(1, Ordering::Relaxed);
                            Ok(())
                        })
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    while submitters.iter().any(|s| !s.is_finished()) {
        scheduler.maintain();
    }
    let handles: Vec<_> = submitters
        .into_iter()
        .flat_map(|s| s.join().unwrap())
        .collect();

    assert!(wait_all(&handles, Duration::from_secs(10)), "a job was lost to an evicted worker");
    assert_eq!(done.load(Ordering::Relaxed), 8_000);
    assert!(handles.iter().all(|h| h.status() == JobStatus::Completed));

    // Idle again: the pool settles at its minimum and still takes work.
    for _ in 0..10 {
        scheduler.maintain();
    }
    assert_eq!(scheduler.worker_count(), 1);
    let after = scheduler.schedule(JobOptions::new(), |_| Ok(()));
    assert!(after.wait_timeout(Duration::from_secs(5)));
}
