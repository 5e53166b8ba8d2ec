//! # Fixed Pulse
//!
//! Cadence keeping shared by the tick and render drivers.
//!
//! ## Design
//!
//! A pulse never catches up. If one pulse overruns its budget the next one
//! starts immediately, and at most one pulse runs per wake-up:
//!
//! ```text
//!  budget  |--------|--------|--------|
//!  work    |==|     |===========|=|   |
//!                    ^ late      ^ starts at once, no second pulse queued
//! ```

use std::time::{Duration, Instant};

/// Pulse timing statistics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickStats {
    /// Minimum pulse duration observed.
    pub min_tick_us: u64,
    /// Maximum pulse duration observed.
    pub max_tick_us: u64,
    /// Average pulse duration (rolling).
    pub avg_tick_us: u64,
    /// Number of late pulses (took longer than budget).
    pub late_ticks: u64,
    /// Total pulses measured.
    pub total_ticks: u64,
}

impl TickStats {
    fn new(budget: Duration) -> Self {
        Self {
            min_tick_us: u64::MAX,
            max_tick_us: 0,
            avg_tick_us: duration_us(budget),
            late_ticks: 0,
            total_ticks: 0,
        }
    }
}

fn duration_us(d: Duration) -> u64 {
    u64::try_from(d.as_micros()).unwrap_or(u64::MAX)
}

/// Fixed-interval pulse controller.
#[derive(Clone, Debug)]
pub struct Pulse {
    /// Target pulse duration.
    interval: Duration,
    /// Start of the current pulse.
    started: Instant,
    stats: TickStats,
}

impl Pulse {
    /// Creates a pulse with the given interval.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            started: Instant::now(),
            stats: TickStats::new(interval),
        }
    }

    /// Marks the start of a pulse.
    pub fn begin(&mut self) {
        self.started = Instant::now();
    }

    /// Marks the end of a pulse and records its duration.
    ///
    /// Returns the overrun if the pulse was late.
    pub fn end(&mut self) -> Option<Duration> {
        let elapsed = self.started.elapsed();
        let elapsed_us = duration_us(elapsed);

        self.stats.total_ticks += 1;
        self.stats.min_tick_us = self.stats.min_tick_us.min(elapsed_us);
        self.stats.max_tick_us = self.stats.max_tick_us.max(elapsed_us);
        // Rolling average
        self.stats.avg_tick_us = (self.stats.avg_tick_us * 15 + elapsed_us) / 16;

        if elapsed > self.interval {
            self.stats.late_ticks += 1;
            Some(elapsed - self.interval)
        } else {
            None
        }
    }

    /// Time left before the next pulse is due. Zero when late.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.interval.saturating_sub(self.started.elapsed())
    }

    /// Target pulse duration.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Timing statistics.
    #[must_use]
    pub const fn stats(&self) -> &TickStats {
        &self.stats
    }
}
