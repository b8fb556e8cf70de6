//! Adjacent-region merging.
//!
//! Active regions that touch on a side (same z level) are fused into one
//! work unit by flood fill, so scripts that interact across a border land in
//! the same batch.

use std::collections::BTreeSet;

use super::RegionKey;

/// A group of active regions dispatched as one batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergedRegion {
    members: Vec<RegionKey>,
}

impl MergedRegion {
    /// Builds a group; members are sorted.
    #[must_use]
    pub fn new(mut members: Vec<RegionKey>) -> Self {
        members.sort();
        members.dedup();
        Self { members }
    }

    /// Smallest member key, used as the group id.
    ///
    /// # Panics
    ///
    /// Panics on an empty group; [`merge_adjacent`] never produces one.
    #[must_use]
    pub fn id(&self) -> RegionKey {
        self.members[0]
    }

    /// Member regions in key order.
    #[must_use]
    pub fn members(&self) -> &[RegionKey] {
        &self.members
    }

    /// Checks membership.
    #[must_use]
    pub fn contains(&self, key: RegionKey) -> bool {
        self.members.binary_search(&key).is_ok()
    }

    /// Number of member regions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Checks if the group has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Groups `active` regions.
///
/// With merging disabled, or fewer than `min_to_merge` active regions, every
/// region is its own group. Otherwise groups are the 4-connected components
/// of the active set within each level. Output is sorted by group id.
#[must_use]
pub fn merge_adjacent(active: &[RegionKey], enabled: bool, min_to_merge: usize) -> Vec<MergedRegion> {
    let mut remaining: BTreeSet<RegionKey> = active.iter().copied().collect();

    if !enabled || remaining.len() < min_to_merge {
        return remaining
            .into_iter()
            .map(|key| MergedRegion::new(vec![key]))
            .collect();
    }

    let mut groups = Vec::new();
    while let Some(seed) = remaining.pop_first() {
        let mut members = vec![seed];
        let mut frontier = vec![seed];
        while let Some(key) = frontier.pop() {
            for next in key.neighbours() {
                if remaining.remove(&next) {
                    members.push(next);
                    frontier.push(next);
                }
            }
        }
        groups.push(MergedRegion::new(members));
    }

    // Seeds come out of the set in order, so groups already are sorted by id.
    groups
}
