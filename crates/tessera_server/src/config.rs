//! # Server Configuration
//!
//! Loaded once at startup from TOML. Every field has a default, so a config
//! file only needs the values it changes:
//!
//! ```toml
//! tick_rate_hz = 20
//! script_budget_fraction = 0.5
//! merge_regions = true
//! min_regions_to_merge = 2
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tessera_jobs::SchedulerConfig;

use crate::error::{ServerError, ServerResult};

/// Server tuning knobs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Ticks per second.
    pub tick_rate_hz: u32,
    /// Share of the tick interval scripts may use, in `(0, 1]`.
    pub script_budget_fraction: f64,
    /// VM instructions granted to a Normal-priority thread per tick.
    pub base_instruction_slice: u64,
    /// Region side length, in chunks.
    pub region_size: u32,
    /// Chunk side length, in tiles.
    pub chunk_size: u32,
    /// Map width, in tiles.
    pub map_width: u32,
    /// Map height, in tiles.
    pub map_height: u32,
    /// Number of z levels.
    pub map_levels: u32,
    /// Chebyshev distance, in regions, around an observer that stays active.
    pub region_activation_range: u32,
    /// Z levels above and below an observer that stay active.
    pub z_activation_range: u32,
    /// Whether adjacent active regions are merged into one work unit.
    pub merge_regions: bool,
    /// Merging only kicks in at this many active regions.
    pub min_regions_to_merge: usize,
    /// Worker pool lower bound.
    pub min_workers: usize,
    /// Worker pool upper bound.
    pub max_workers: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let cores = num_cpus::get().max(1);
        Self {
            tick_rate_hz: 20,
            script_budget_fraction: 0.5,
            base_instruction_slice: 10_000,
            region_size: 4,
            chunk_size: 16,
            map_width: 1024,
            map_height: 1024,
            map_levels: 1,
            region_activation_range: 1,
            z_activation_range: 0,
            merge_regions: true,
            min_regions_to_merge: 2,
            min_workers: (cores / 2).max(1),
            max_workers: cores * 4,
        }
    }
}

impl ServerConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// `ConfigParse` for malformed TOML or unknown keys, `InvalidConfig` for
    /// out-of-range values.
    pub fn from_toml_str(text: &str) -> ServerResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// `ConfigRead` if the file cannot be read, otherwise as
    /// [`from_toml_str`](Self::from_toml_str).
    pub fn load(path: impl AsRef<Path>) -> ServerResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ServerError::ConfigRead {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Checks every range constraint.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` naming the first offending field.
    pub fn validate(&self) -> ServerResult<()> {
        fn invalid(field: &'static str, reason: impl Into<String>) -> ServerResult<()> {
            Err(ServerError::InvalidConfig {
                field,
                reason: reason.into(),
            })
        }

        if self.tick_rate_hz == 0 || self.tick_rate_hz > 1000 {
            return invalid("tick_rate_hz", "must be in 1..=1000");
        }
        if !(self.script_budget_fraction > 0.0 && self.script_budget_fraction <= 1.0) {
            return invalid("script_budget_fraction", "must be in (0, 1]");
        }
        if self.base_instruction_slice == 0 {
            return invalid("base_instruction_slice", "must be positive");
        }
        if self.region_size == 0 || self.chunk_size == 0 {
            return invalid("region_size", "region and chunk sizes must be positive");
        }
        if self.map_width == 0 || self.map_height == 0 || self.map_levels == 0 {
            return invalid("map_width", "map dimensions must be positive");
        }
        let coord_max = i32::MAX.unsigned_abs();
        if self.map_width > coord_max || self.map_height > coord_max || self.map_levels > coord_max {
            return invalid("map_width", "map dimensions must fit signed tile coordinates");
        }
        if self.region_size.checked_mul(self.chunk_size).map_or(true, |t| t > coord_max) {
            return invalid("region_size", "region_size * chunk_size overflows tile coordinates");
        }
        let grid = self.regions_x().max(self.regions_y());
        if self.region_activation_range > grid {
            return invalid(
                "region_activation_range",
                format!("{} exceeds the {grid}-region grid", self.region_activation_range),
            );
        }
        if self.z_activation_range >= self.map_levels {
            return invalid(
                "z_activation_range",
                format!("must be below map_levels ({})", self.map_levels),
            );
        }
        if self.min_workers == 0 || self.min_workers > self.max_workers {
            return invalid(
                "min_workers",
                format!("need 1 <= min ({}) <= max ({})", self.min_workers, self.max_workers),
            );
        }
        Ok(())
    }

    /// Duration of one tick.
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(1) / self.tick_rate_hz.max(1)
    }

    /// Wall-clock budget for one batch of scripts.
    #[must_use]
    pub fn script_budget(&self) -> Duration {
        self.tick_interval().mul_f64(self.script_budget_fraction)
    }

    /// Region side length, in tiles.
    #[must_use]
    pub fn region_tiles(&self) -> u32 {
        self.region_size * self.chunk_size
    }

    /// Regions along x.
    #[must_use]
    pub fn regions_x(&self) -> u32 {
        self.map_width.div_ceil(self.region_tiles())
    }

    /// Regions along y.
    #[must_use]
    pub fn regions_y(&self) -> u32 {
        self.map_height.div_ceil(self.region_tiles())
    }

    /// Job scheduler settings derived from the worker bounds.
    #[must_use]
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            min_workers: self.min_workers,
            max_workers: self.max_workers,
            initial_workers: self.min_workers.max(num_cpus::get().min(self.max_workers)),
            ..SchedulerConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tick_interval(), Duration::from_millis(50));
        assert_eq!(config.script_budget(), Duration::from_millis(25));
        assert_eq!(config.region_tiles(), 64);
        assert_eq!(config.regions_x(), 16);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = ServerConfig::from_toml_str(
            "tick_rate_hz = 10\nmerge_regions = false\nmin_workers = 1\nmax_workers = 2\n",
        )
        .unwrap();
        assert_eq!(config.tick_rate_hz, 10);
        assert!(!config.merge_regions);
        assert_eq!(config.chunk_size, 16);
    }

    #[test]
    fn test_rejects_bad_values() {
        let err = ServerConfig::from_toml_str("script_budget_fraction = 1.5").unwrap_err();
        assert!(matches!(err, ServerError::InvalidConfig { field: "script_budget_fraction", .. }));

        let err = ServerConfig::from_toml_str("min_workers = 8\nmax_workers = 2").unwrap_err();
        assert!(matches!(err, ServerError::InvalidConfig { field: "min_workers", .. }));
    }

    #[test]
    fn test_rejects_activation_ranges_beyond_grid() {
        // Default map: 16 x 16 regions on one level.
        let err = ServerConfig::from_toml_str("region_activation_range = 17").unwrap_err();
        assert!(matches!(err, ServerError::InvalidConfig { field: "region_activation_range", .. }));

        let err = ServerConfig::from_toml_str("region_activation_range = 4294967295").unwrap_err();
        assert!(matches!(err, ServerError::InvalidConfig { field: "region_activation_range", .. }));

        let err = ServerConfig::from_toml_str("z_activation_range = 1").unwrap_err();
        assert!(matches!(err, ServerError::InvalidConfig { field: "z_activation_range", .. }));

        let config = ServerConfig::from_toml_str("region_activation_range = 16").unwrap();
        assert_eq!(config.region_activation_range, 16);
    }

    #[test]
    fn test_rejects_oversized_regions() {
        let err = ServerConfig::from_toml_str("region_size = 65536\nchunk_size = 65536").unwrap_err();
        assert!(matches!(err, ServerError::InvalidConfig { field: "region_size", .. }));
    }

    #[test]
    fn test_rejects_unknown_keys() {
        let err = ServerConfig::from_toml_str("tick_rate = 20").unwrap_err();
        assert!(matches!(err, ServerError::ConfigParse(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = ServerConfig::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ServerError::ConfigRead { .. }));
    }
}
