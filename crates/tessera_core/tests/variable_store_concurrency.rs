//! # Variable Store Concurrency Tests
//!
//! Writers on distinct indices of one entity, with a reader spinning on
//! snapshots the whole time.
//!
//! Run with: cargo test -p tessera_core --test variable_store_concurrency

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use tessera_core::{Value, VariableStore};

const WRITERS: usize = 8;
const WRITES_PER_THREAD: i32 = 2_000;

fn num(v: &Value) -> i32 {
    v.as_num().map_or(0, |n| n as i32)
}

#[test]
fn concurrent_sets_on_distinct_indices_never_tear() {
    let store = Arc::new(VariableStore::untyped());
    store.set(WRITERS - 1, 0);
    let stop = Arc::new(AtomicBool::new(false));

    let reader = {
        let store = Arc::clone(&store);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let mut last = vec![0i32; WRITERS];
            let mut last_sum = 0i64;
            let mut observed = 0usize;
            while !stop.load(Ordering::Acquire) {
                let snap = store.snapshot();
                assert!(snap.len() >= WRITERS);
                let current: Vec<i32> = snap.iter().take(WRITERS).map(num).collect();

                // Writes are serialized: every published array extends the
                // previous one, so no slot can ever go backwards.
                for (i, (&now, &before)) in current.iter().zip(&last).enumerate() {
                    assert!(now >= before, "slot {i} went from {before} to {now}");
                }
                let sum: i64 = current.iter().map(|&v| i64::from(v)).sum();
                assert!(sum >= last_sum);

                last = current;
                last_sum = sum;
                observed += 1;
            }
            observed
        })
    };

    let writers: Vec<_> = (0..WRITERS)
        .map(|slot| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for v in 1..=WRITES_PER_THREAD {
                    assert!(store.set(slot, v));
                }
            })
        })
        .collect();
    for w in writers {
        w.join().unwrap();
    }
    stop.store(true, Ordering::Release);
    assert!(reader.join().unwrap() > 0);

    // No lost updates, and one version bump per effective write.
    let final_values = store.snapshot();
    for slot in 0..WRITERS {
        assert_eq!(num(&final_values[slot]), WRITES_PER_THREAD);
    }
    let writes = WRITERS as u64 * WRITES_PER_THREAD as u64;
    // The initial set(WRITERS - 1, 0) grew the array: one extra bump.
    assert_eq!(store.version(), writes + 1);
}
