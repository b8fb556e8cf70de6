//! Region activation strategies.

use std::collections::BTreeSet;

use super::{RegionKey, RegionManager};
use crate::traits::GameState;

/// Decides which regions run this tick.
pub trait RegionActivation: Send + Sync {
    /// Active region keys, sorted and on the grid.
    fn active_regions(&self, regions: &RegionManager, state: &dyn GameState) -> Vec<RegionKey>;
}

/// Keeps every region within range of an observer active.
///
/// Range is Chebyshev distance in regions on the observer's level, plus
/// `z_range` levels above and below.
#[derive(Clone, Copy, Debug)]
pub struct ObserverActivation {
    range: i32,
    z_range: i32,
}

impl ObserverActivation {
    /// Creates the strategy. Ranges past `i32::MAX` saturate.
    #[must_use]
    pub fn new(range: u32, z_range: u32) -> Self {
        Self {
            range: i32::try_from(range).unwrap_or(i32::MAX),
            z_range: i32::try_from(z_range).unwrap_or(i32::MAX),
        }
    }
}

impl RegionActivation for ObserverActivation {
    fn active_regions(&self, regions: &RegionManager, state: &dyn GameState) -> Vec<RegionKey> {
        let mut active = BTreeSet::new();
        for observer in state.observers() {
            let Some(center) = state.position_of(observer).and_then(|p| regions.region_of(p)) else {
                continue;
            };
            // Windows are clipped to the grid before iterating.
            let (width, height, levels) = regions.dimensions();
            let zs = window(center.z, self.z_range, levels);
            let ys = window(center.y, self.range, height);
            let xs = window(center.x, self.range, width);
            for z in zs {
                for y in ys.clone() {
                    for x in xs.clone() {
                        let key = RegionKey::new(x, y, z);
                        if regions.contains(key) {
                            active.insert(key);
                        }
                    }
                }
            }
        }
        active.into_iter().collect()
    }
}

/// `center ± range`, clipped to `0..len`.
fn window(center: i32, range: i32, len: i32) -> std::ops::RangeInclusive<i32> {
    center.saturating_sub(range).max(0)..=center.saturating_add(range).min(len - 1)
}
