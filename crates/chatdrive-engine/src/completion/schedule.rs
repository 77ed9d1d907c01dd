use crate::config::CompletionConfig;
use std::time::Duration;

/// Poll intervals used while waiting for a generation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollSchedule {
    /// Interval while pending, and the first interval while streaming.
    pub initial: Duration,
    /// Upper bound while streaming; base interval for stall re-checks.
    pub max: Duration,
    /// Growth factor applied per streaming poll.
    pub growth: f64,
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self::from_config(&CompletionConfig::default(), 1.0)
    }
}

impl PollSchedule {
    pub fn from_config(config: &CompletionConfig, scale: f64) -> Self {
        Self {
            initial: config.initial_poll(scale),
            max: config.max_poll(scale),
            growth: config.poll_growth.max(1.0),
        }
    }

    /// Interval after the `n`th streaming poll (1-based).
    pub fn streaming(&self, n: u32) -> Duration {
        let exp = n.saturating_sub(1).min(64) as i32;
        let factor = self.growth.powi(exp);
        if !factor.is_finite() || factor * self.initial.as_secs_f64() >= self.max.as_secs_f64() {
            return self.max;
        }
        if factor == 1.0 {
            return self.initial;
        }
        self.initial.mul_f64(factor).min(self.max)
    }

    /// Interval for stall re-check `n` (0-based), doubling from `max` up to `cap`.
    pub fn stall_recheck(&self, n: u32, cap: Duration) -> Duration {
        let base = self.max.max(self.initial);
        base.checked_mul(1u32 << n.min(31))
            .unwrap_or(cap)
            .min(cap)
    }
}
