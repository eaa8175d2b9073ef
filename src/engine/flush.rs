//! When to report: a leaky bucket over flush checks and elapsed time.

use crate::config::FlushConfig;

/// Fires when too many checks have passed without a report, or too much
/// (event) time has elapsed since the last one.
#[derive(Debug, Clone)]
pub struct FlushPolicy {
    config: FlushConfig,
    checks: u32,
    last_report: Option<f64>,
}

impl FlushPolicy {
    pub fn new(config: FlushConfig) -> Self {
        Self {
            config,
            checks: 0,
            last_report: None,
        }
    }

    /// Count one flush point at `now` (ms); `true` means report now.
    pub fn check(&mut self, now: f64) -> bool {
        self.checks += 1;
        let stale = self
            .last_report
            .map_or(true, |last| now - last > self.config.max_interval_ms as f64);
        if stale || self.checks > self.config.max_checks {
            self.checks = 0;
            return true;
        }
        false
    }

    /// A report went out at `now`.
    pub fn reported(&mut self, now: f64) {
        self.last_report = Some(now);
    }

    pub fn last_report(&self) -> Option<f64> {
        self.last_report
    }
}
