//! # Regions
//!
//! The map is cut into square regions of `region_size × region_size` chunks,
//! one layer per z level. A region is the unit of activation and of parallel
//! script dispatch.
//!
//! ```text
//!   tile (x, y, z) ──÷ chunk_size──> chunk ──÷ region_size──> region
//! ```

mod activation;
mod merge;

pub use activation::{ObserverActivation, RegionActivation};
pub use merge::{merge_adjacent, MergedRegion};

use std::collections::BTreeMap;
use std::fmt;

use crate::config::ServerConfig;

/// Tile coordinate on the map.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TilePos {
    /// Column.
    pub x: i32,
    /// Row.
    pub y: i32,
    /// Level.
    pub z: i32,
}

impl TilePos {
    /// Creates a tile position.
    #[must_use]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

/// Chunk coordinate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChunkKey {
    /// Column, in chunks.
    pub x: i32,
    /// Row, in chunks.
    pub y: i32,
    /// Level.
    pub z: i32,
}

/// Region coordinate. Ordered by `(z, y, x)` so sorted keys walk a level
/// row by row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RegionKey {
    /// Column, in regions.
    pub x: i32,
    /// Row, in regions.
    pub y: i32,
    /// Level.
    pub z: i32,
}

impl RegionKey {
    /// Creates a region key.
    #[must_use]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// The four same-level neighbours, in a fixed order.
    #[must_use]
    pub const fn neighbours(self) -> [Self; 4] {
        [
            Self::new(self.x - 1, self.y, self.z),
            Self::new(self.x + 1, self.y, self.z),
            Self::new(self.x, self.y - 1, self.z),
            Self::new(self.x, self.y + 1, self.z),
        ]
    }
}

impl Ord for RegionKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.z, self.y, self.x).cmp(&(other.z, other.y, other.x))
    }
}

impl PartialOrd for RegionKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for RegionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// One region and the chunks it covers.
#[derive(Clone, Debug)]
pub struct Region {
    key: RegionKey,
    chunks: Vec<ChunkKey>,
}

impl Region {
    /// Region coordinate.
    #[must_use]
    pub fn key(&self) -> RegionKey {
        self.key
    }

    /// Chunks inside the map that this region covers.
    #[must_use]
    pub fn chunks(&self) -> &[ChunkKey] {
        &self.chunks
    }
}

/// Fixed grid of regions built from the configuration at startup.
#[derive(Debug)]
pub struct RegionManager {
    chunk_size: i32,
    region_size: i32,
    map_width: i32,
    map_height: i32,
    regions_x: i32,
    regions_y: i32,
    levels: i32,
    merge_enabled: bool,
    min_to_merge: usize,
    regions: BTreeMap<RegionKey, Region>,
}

impl RegionManager {
    /// Builds the grid. Edge regions only list chunks inside the map.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub fn new(config: &ServerConfig) -> Self {
        let chunk_size = config.chunk_size as i32;
        let region_size = config.region_size as i32;
        let regions_x = config.regions_x() as i32;
        let regions_y = config.regions_y() as i32;
        let levels = config.map_levels as i32;
        let chunks_x = config.map_width.div_ceil(config.chunk_size) as i32;
        let chunks_y = config.map_height.div_ceil(config.chunk_size) as i32;

        let mut regions = BTreeMap::new();
        for z in 0..levels {
            for ry in 0..regions_y {
                for rx in 0..regions_x {
                    let key = RegionKey::new(rx, ry, z);
                    let mut chunks = Vec::new();
                    for cy in ry * region_size..((ry + 1) * region_size).min(chunks_y) {
                        for cx in rx * region_size..((rx + 1) * region_size).min(chunks_x) {
                            chunks.push(ChunkKey { x: cx, y: cy, z });
                        }
                    }
                    regions.insert(key, Region { key, chunks });
                }
            }
        }

        tracing::info!(
            regions = regions.len(),
            regions_x,
            regions_y,
            levels,
            "region grid built"
        );

        Self {
            chunk_size,
            region_size,
            map_width: config.map_width as i32,
            map_height: config.map_height as i32,
            regions_x,
            regions_y,
            levels,
            merge_enabled: config.merge_regions,
            min_to_merge: config.min_regions_to_merge,
            regions,
        }
    }

    /// Region containing `pos`, or `None` off the map.
    #[must_use]
    pub fn region_of(&self, pos: TilePos) -> Option<RegionKey> {
        let on_map = (0..self.map_width).contains(&pos.x)
            && (0..self.map_height).contains(&pos.y)
            && (0..self.levels).contains(&pos.z);
        if !on_map {
            return None;
        }
        let span = self.chunk_size * self.region_size;
        Some(RegionKey::new(pos.x / span, pos.y / span, pos.z))
    }

    /// Region by key.
    #[must_use]
    pub fn get(&self, key: RegionKey) -> Option<&Region> {
        self.regions.get(&key)
    }

    /// Checks if `key` lies on the grid.
    #[must_use]
    pub fn contains(&self, key: RegionKey) -> bool {
        self.regions.contains_key(&key)
    }

    /// All regions in key order.
    pub fn regions(&self) -> impl Iterator<Item = &Region> {
        self.regions.values()
    }

    /// Number of regions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Checks if the grid is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Grid dimensions `(x, y, levels)`.
    #[must_use]
    pub fn dimensions(&self) -> (i32, i32, i32) {
        (self.regions_x, self.regions_y, self.levels)
    }

    /// Groups `active` regions using the configured merge settings.
    #[must_use]
    pub fn merge(&self, active: &[RegionKey]) -> Vec<MergedRegion> {
        merge_adjacent(active, self.merge_enabled, self.min_to_merge)
    }
}
