use super::classify::ErrorCategory;
use crate::config::RecoveryConfig;
use rand::Rng;
use std::collections::HashSet;
use std::time::Duration;

/// Bounded retry settings shared read-only across operations.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Fraction of the computed delay applied as random +/- spread.
    pub jitter: f64,
    pub rate_limit_delay: Duration,
    pub retryable: HashSet<ErrorCategory>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RecoveryConfig::default(), 1.0)
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RecoveryConfig, scale: f64) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: config.base_delay(scale),
            max_delay: config.max_delay(scale),
            jitter: if config.jitter.is_finite() {
                config.jitter.clamp(0.0, 1.0)
            } else {
                0.0
            },
            rate_limit_delay: config.rate_limit_delay(scale),
            retryable: config.retryable.iter().copied().collect(),
        }
    }

    /// No waiting between attempts. Handy for tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: 0.0,
            rate_limit_delay: Duration::ZERO,
            ..Self::default()
        }
    }

    pub fn is_retryable(&self, category: ErrorCategory) -> bool {
        category != ErrorCategory::Fatal && self.retryable.contains(&category)
    }

    /// Delay before the attempt following failed attempt number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32, category: ErrorCategory) -> Duration {
        match category {
            ErrorCategory::StaleTarget => Duration::ZERO,
            ErrorCategory::RateLimited => self.exponential(attempt).max(self.rate_limit_delay),
            _ => self.exponential(attempt),
        }
    }

    fn exponential(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        let raw = self
            .base_delay
            .checked_mul(1u32 << exp)
            .unwrap_or(self.max_delay)
            .min(self.max_delay);
        if self.jitter <= 0.0 || raw.is_zero() {
            return raw;
        }
        let spread = rand::thread_rng().gen_range(-self.jitter..=self.jitter);
        // The cap applies after jitter, so no draw can exceed max_delay.
        Duration::try_from_secs_f64(raw.as_secs_f64() * (1.0 + spread).max(0.0))
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter() -> RetryPolicy {
        RetryPolicy {
            jitter: 0.0,
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn test_exponential_backoff_caps() {
        let policy = no_jitter();
        let net = ErrorCategory::TransientNetwork;
        assert_eq!(policy.backoff(1, net), Duration::from_secs(1));
        assert_eq!(policy.backoff(2, net), Duration::from_secs(2));
        assert_eq!(policy.backoff(3, net), Duration::from_secs(4));
        assert_eq!(policy.backoff(10, net), Duration::from_secs(30));
        assert_eq!(policy.backoff(40, net), Duration::from_secs(30));
    }

    #[test]
    fn test_stale_target_is_immediate() {
        assert_eq!(
            no_jitter().backoff(3, ErrorCategory::StaleTarget),
            Duration::ZERO
        );
    }

    #[test]
    fn test_rate_limit_floor() {
        let policy = no_jitter();
        assert_eq!(
            policy.backoff(1, ErrorCategory::RateLimited),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn test_jitter_stays_in_band() {
        let policy = RetryPolicy::default();
        for _ in 0..50 {
            let d = policy.backoff(2, ErrorCategory::TransientNetwork);
            assert!(d >= Duration::from_millis(1600) && d <= Duration::from_millis(2400));
        }
        for attempt in [5, 6, 10, 20] {
            for _ in 0..50 {
                let d = policy.backoff(attempt, ErrorCategory::TransientNetwork);
                assert!(d <= policy.max_delay, "attempt {attempt} waited {d:?}");
            }
        }
    }

    #[test]
    fn test_capped_delay_with_jitter_only_shrinks() {
        let policy = RetryPolicy::default();
        for _ in 0..50 {
            let d = policy.backoff(10, ErrorCategory::TransientNetwork);
            assert!(d >= Duration::from_secs(24) && d <= Duration::from_secs(30));
        }
    }

    #[test]
    fn test_fatal_never_retryable() {
        let mut policy = RetryPolicy::default();
        policy.retryable.insert(ErrorCategory::Fatal);
        assert!(!policy.is_retryable(ErrorCategory::Fatal));
        assert!(policy.is_retryable(ErrorCategory::StaleTarget));
        assert!(!policy.is_retryable(ErrorCategory::Timeout));
    }
}
