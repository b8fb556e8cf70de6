//! Tick driver: owns the loop, the timer queue and the strategy, and runs
//! until cancelled.

use std::sync::Arc;
use std::time::Instant;

use tessera_core::CancellationToken;

use super::strategy::{RegionalTickStrategy, TickReport};
use super::tick_loop::{TickLoop, TickStats};
use crate::config::ServerConfig;
use crate::timer::TimerQueue;

/// Catch-up ticks run back to back before the backlog is dropped.
pub const MAX_CATCH_UP_TICKS: u32 = 5;

/// Runs the tick pipeline on the calling thread.
#[derive(Debug)]
pub struct TickDriver {
    tick_loop: TickLoop,
    strategy: RegionalTickStrategy,
    timer: Arc<TimerQueue>,
    cancel: CancellationToken,
    last_report: Option<TickReport>,
}

impl TickDriver {
    /// Creates a driver ticking at `config.tick_rate_hz`.
    #[must_use]
    pub fn new(config: &ServerConfig, strategy: RegionalTickStrategy, timer: Arc<TimerQueue>) -> Self {
        Self {
            tick_loop: TickLoop::new(config.tick_rate_hz),
            strategy,
            timer,
            cancel: CancellationToken::new(),
            last_report: None,
        }
    }

    /// Handle that stops [`run`](Self::run) from any thread.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs one tick immediately: fire due timers, then the strategy.
    pub fn step(&mut self) -> TickReport {
        let start = self.tick_loop.begin_tick();
        self.timer.fire_due(Instant::now());
        let report = self.strategy.tick();
        self.tick_loop.end_tick(start);
        self.last_report = Some(report);
        report
    }

    /// Ticks on schedule until cancelled.
    pub fn run(&mut self) -> TickStats {
        self.run_until(|_| false)
    }

    /// Ticks on schedule until cancelled or `ticks` ticks have run.
    pub fn run_ticks(&mut self, ticks: u64) -> TickStats {
        let target = self.tick_loop.tick_count() + ticks;
        self.run_until(move |driver| driver.tick_loop.tick_count() >= target)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn run_until(&mut self, mut done: impl FnMut(&Self) -> bool) -> TickStats {
        tracing::info!(
            interval_us = self.tick_loop.tick_duration().as_micros() as u64,
            "tick driver started"
        );
        while !self.cancel.is_cancelled() && !done(self) {
            self.tick_loop.wait_for_next_tick();

            let mut burst = 0;
            while self.tick_loop.should_tick() {
                if burst == MAX_CATCH_UP_TICKS {
                    let dropped = self.tick_loop.drop_backlog();
                    tracing::warn!(dropped_ms = dropped.as_millis() as u64, "tick backlog dropped");
                    break;
                }
                self.step();
                burst += 1;
                if self.cancel.is_cancelled() || done(self) {
                    break;
                }
            }
        }
        let stats = *self.tick_loop.stats();
        tracing::info!(
            ticks = stats.total_ticks,
            late = stats.late_ticks,
            avg_us = stats.avg_tick_us,
            "tick driver stopped"
        );
        stats
    }

    /// Report of the most recent tick.
    #[must_use]
    pub fn last_report(&self) -> Option<&TickReport> {
        self.last_report.as_ref()
    }

    /// Timing statistics.
    #[must_use]
    pub fn stats(&self) -> &TickStats {
        self.tick_loop.stats()
    }

    /// The strategy.
    #[must_use]
    pub fn strategy(&self) -> &RegionalTickStrategy {
        &self.strategy
    }

    /// The strategy, for adding threads between runs.
    pub fn strategy_mut(&mut self) -> &mut RegionalTickStrategy {
        &mut self.strategy
    }

    /// The timer queue.
    #[must_use]
    pub fn timer(&self) -> &Arc<TimerQueue> {
        &self.timer
    }
}
