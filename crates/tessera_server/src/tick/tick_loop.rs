//! # Fixed-Timestep Loop
//!
//! Accumulator-driven: wall time is added on every
//! [`should_tick`](TickLoop::should_tick) and one tick interval is consumed
//! per [`begin_tick`](TickLoop::begin_tick), so a slow tick is followed by
//! catch-up ticks rather than a drifting rate.

use std::time::{Duration, Instant};

/// Below this, [`TickLoop::wait_for_next_tick`] spins instead of sleeping.
const SPIN_THRESHOLD: Duration = Duration::from_micros(1000);
/// Sleep undershoot left for the final spin.
const SPIN_MARGIN: Duration = Duration::from_micros(500);

/// Fixed-timestep tick loop controller.
#[derive(Debug)]
pub struct TickLoop {
    tick_duration: Duration,
    last_tick: Instant,
    accumulator: Duration,
    tick_count: u64,
    stats: TickStats,
}

/// Tick timing statistics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickStats {
    /// Shortest tick observed.
    pub min_tick_us: u64,
    /// Longest tick observed.
    pub max_tick_us: u64,
    /// Rolling average (1/16 weight per tick).
    pub avg_tick_us: u64,
    /// Ticks that took longer than the interval.
    pub late_ticks: u64,
    /// Ticks measured.
    pub total_ticks: u64,
}

impl TickStats {
    fn fresh(tick_duration: Duration) -> Self {
        Self {
            min_tick_us: u64::MAX,
            max_tick_us: 0,
            avg_tick_us: duration_us(tick_duration),
            late_ticks: 0,
            total_ticks: 0,
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn duration_us(d: Duration) -> u64 {
    d.as_micros() as u64
}

impl TickLoop {
    /// Creates a loop running at `tick_rate_hz`.
    ///
    /// # Panics
    ///
    /// Panics if `tick_rate_hz` is zero.
    #[must_use]
    pub fn new(tick_rate_hz: u32) -> Self {
        assert!(tick_rate_hz > 0, "tick rate must be positive");
        Self::with_interval(Duration::from_micros(1_000_000 / u64::from(tick_rate_hz)))
    }

    /// Creates a loop with an explicit interval.
    #[must_use]
    pub fn with_interval(tick_duration: Duration) -> Self {
        Self {
            tick_duration,
            last_tick: Instant::now(),
            accumulator: Duration::ZERO,
            tick_count: 0,
            stats: TickStats::fresh(tick_duration),
        }
    }

    /// Returns true if a tick is due. Call until it returns false.
    #[must_use]
    pub fn should_tick(&mut self) -> bool {
        let now = Instant::now();
        self.accumulator += now.duration_since(self.last_tick);
        self.last_tick = now;

        self.accumulator >= self.tick_duration
    }

    /// Marks the start of a tick and consumes one interval.
    #[must_use]
    pub fn begin_tick(&mut self) -> Instant {
        self.accumulator = self.accumulator.saturating_sub(self.tick_duration);
        self.tick_count += 1;
        Instant::now()
    }

    /// Marks the end of a tick started at `start`.
    pub fn end_tick(&mut self, start: Instant) {
        let duration = start.elapsed();
        let duration_us = duration_us(duration);

        self.stats.total_ticks += 1;
        self.stats.min_tick_us = self.stats.min_tick_us.min(duration_us);
        self.stats.max_tick_us = self.stats.max_tick_us.max(duration_us);
        self.stats.avg_tick_us = (self.stats.avg_tick_us * 15 + duration_us) / 16;

        if duration > self.tick_duration {
            self.stats.late_ticks += 1;
        }
    }

    /// Discards accumulated time. Used when catch-up falls too far behind.
    pub fn drop_backlog(&mut self) -> Duration {
        std::mem::take(&mut self.accumulator)
    }

    /// Blocks until the next tick is due: sleep, then spin the last stretch.
    pub fn wait_for_next_tick(&self) {
        let elapsed = self.last_tick.elapsed() + self.accumulator;

        if elapsed < self.tick_duration {
            let remaining = self.tick_duration - elapsed;
            if remaining > SPIN_THRESHOLD {
                std::thread::sleep(remaining - SPIN_MARGIN);
            }
            while self.last_tick.elapsed() + self.accumulator < self.tick_duration {
                std::hint::spin_loop();
            }
        }
    }

    /// Ticks begun so far.
    #[must_use]
    pub const fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Timing statistics.
    #[must_use]
    pub const fn stats(&self) -> &TickStats {
        &self.stats
    }

    /// Target interval.
    #[must_use]
    pub const fn tick_duration(&self) -> Duration {
        self.tick_duration
    }

    /// Clears statistics.
    pub fn reset_stats(&mut self) {
        self.stats = TickStats::fresh(self.tick_duration);
    }
}
