//! # Region Merge Tests
//!
//! Grouping of active regions on a 64×64 region grid.
//!
//! Run with: cargo test -p tessera_server --test region_merge

use std::collections::BTreeSet;

use proptest::prelude::*;
use tessera_server::{merge_adjacent, RegionKey, RegionManager, ServerConfig};

fn grid(merge_regions: bool, min_regions_to_merge: usize) -> RegionManager {
    let config = ServerConfig {
        chunk_size: 8,
        region_size: 2,
        map_width: 64 * 16,
        map_height: 64 * 16,
        map_levels: 2,
        merge_regions,
        min_regions_to_merge,
        ..ServerConfig::default()
    };
    RegionManager::new(&config)
}

fn l_shape() -> Vec<RegionKey> {
    vec![
        RegionKey::new(0, 0, 0),
        RegionKey::new(1, 0, 0),
        RegionKey::new(0, 1, 0),
    ]
}

#[test]
fn grid_is_64_by_64() {
    let regions = grid(true, 2);
    assert_eq!(regions.dimensions(), (64, 64, 2));
    assert_eq!(regions.len(), 64 * 64 * 2);
}

#[test]
fn l_shape_merges_into_one_group_at_threshold_two() {
    let groups = grid(true, 2).merge(&l_shape());
    assert_eq!(groups.len(), 1);
    let mut expected = l_shape();
    expected.sort();
    assert_eq!(groups[0].members(), expected.as_slice());
}

#[test]
fn l_shape_stays_split_at_threshold_four() {
    let groups = grid(true, 4).merge(&l_shape());
    assert_eq!(groups.len(), 3);
    assert!(groups.iter().all(|g| g.len() == 1));
}

#[test]
fn merging_disabled_keeps_singletons() {
    let groups = grid(false, 0).merge(&l_shape());
    assert_eq!(groups.len(), 3);
}

fn region() -> impl Strategy<Value = RegionKey> {
    (0..8i32, 0..8i32, 0..2i32).prop_map(|(x, y, z)| RegionKey::new(x, y, z))
}

proptest! {
    #[test]
    fn groups_partition_the_active_set(active in prop::collection::vec(region(), 0..40)) {
        let groups = merge_adjacent(&active, true, 0);
        let expected: BTreeSet<_> = active.iter().copied().collect();

        let mut seen = BTreeSet::new();
        for group in &groups {
            for &key in group.members() {
                prop_assert!(seen.insert(key), "{key} in two groups");
            }
        }
        prop_assert_eq!(seen, expected);
    }

    #[test]
    fn separate_groups_never_touch(active in prop::collection::vec(region(), 0..40)) {
        let groups = merge_adjacent(&active, true, 0);
        for (i, a) in groups.iter().enumerate() {
            for b in &groups[i + 1..] {
                for &key in a.members() {
                    prop_assert!(key.neighbours().iter().all(|n| !b.contains(*n)));
                }
            }
        }
    }

    #[test]
    fn groups_are_sorted_by_id(active in prop::collection::vec(region(), 0..40)) {
        let groups = merge_adjacent(&active, true, 0);
        prop_assert!(groups.windows(2).all(|w| w[0].id() < w[1].id()));
        for group in &groups {
            prop_assert!(group.members().windows(2).all(|w| w[0] < w[1]));
        }
    }
}
