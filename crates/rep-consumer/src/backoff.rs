//! Restart/reconnect backoff schedule (spec.md §4.4, §4.5).
//!
//! The teacher's dependency tree carries `exponential-backoff` (via
//! `journal-client`/`estuary-flow`'s `retry` module), but its `Backoff`
//! only exposes `set_factor(u32)` — it cannot express this spec's default
//! `factor: 1.1`. Rather than drop the fractional factor, this is a small
//! hand-rolled calculator; see DESIGN.md for the substitution record.

use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffConfig {
    pub min: Duration,
    pub max: Duration,
    pub factor: f64,
    pub jitter: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        BackoffConfig {
            min: Duration::from_millis(200),
            max: Duration::from_secs(5),
            factor: 1.1,
            jitter: true,
        }
    }
}

/// Tracks the current attempt count and computes the next delay.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    attempt: i32,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Backoff { config, attempt: 0 }
    }

    /// Resets to the initial (min) delay. Called after a successful
    /// connection/handler invocation (spec.md §4.4).
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Returns the delay for the next attempt and advances the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let min = self.config.min.as_secs_f64();
        let max = self.config.max.as_secs_f64();
        let scaled = (min * self.config.factor.powi(self.attempt)).min(max);
        self.attempt += 1;
        let delay = if self.config.jitter {
            rand::thread_rng().gen_range(min..=scaled.max(min))
        } else {
            scaled
        };
        Duration::from_secs_f64(delay)
    }
}
