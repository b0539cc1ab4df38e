//! Exponential backoff between delivery attempts.

use outbox_config::RelayConfig;
use std::time::Duration;

/// Capped exponential backoff: `min(initial * 2^attempt, max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    initial: Duration,
    max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(30),
        }
    }
}

impl BackoffPolicy {
    /// A `max` below `initial` is raised to `initial`.
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
        }
    }

    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(config.initial_backoff(), config.max_backoff())
    }

    pub fn initial(&self) -> Duration {
        self.initial
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Delay before the given attempt (1-based). Never decreases as
    /// `attempt` grows and saturates at `max`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let base_ms = u64::try_from(self.initial.as_millis()).unwrap_or(u64::MAX);
        let max_ms = u64::try_from(self.max.as_millis()).unwrap_or(u64::MAX);
        let multiplier = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(base_ms.saturating_mul(multiplier).min(max_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_doubles_and_caps() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay(1), Duration::from_secs(2));
        assert_eq!(policy.delay(2), Duration::from_secs(4));
        assert_eq!(policy.delay(3), Duration::from_secs(8));
        assert_eq!(policy.delay(4), Duration::from_secs(16));
        assert_eq!(policy.delay(5), Duration::from_secs(30));
        assert_eq!(policy.delay(6), Duration::from_secs(30));
    }

    #[test]
    fn large_attempts_saturate() {
        let policy = BackoffPolicy::new(Duration::from_secs(2), Duration::from_secs(300));
        assert_eq!(policy.delay(63), Duration::from_secs(300));
        assert_eq!(policy.delay(64), Duration::from_secs(300));
        assert_eq!(policy.delay(u32::MAX), Duration::from_secs(300));
    }

    #[test]
    fn delay_never_decreases() {
        let policy = BackoffPolicy::new(Duration::from_millis(3), Duration::from_millis(500));
        let mut previous = Duration::ZERO;
        for attempt in 1..100 {
            let delay = policy.delay(attempt);
            assert!(delay >= previous);
            assert!(delay <= policy.max());
            previous = delay;
        }
    }

    #[test]
    fn max_below_initial_is_raised() {
        let policy = BackoffPolicy::new(Duration::from_secs(5), Duration::from_secs(1));
        assert_eq!(policy.max(), Duration::from_secs(5));
        assert_eq!(policy.delay(1), Duration::from_secs(5));
    }

    #[test]
    fn from_config_uses_backoff_fields() {
        let config = RelayConfig {
            initial_backoff_ms: 10,
            max_backoff_ms: 50,
            ..RelayConfig::default()
        };
        let policy = BackoffPolicy::from_config(&config);
        assert_eq!(policy.delay(1), Duration::from_millis(20));
        assert_eq!(policy.delay(3), Duration::from_millis(50));
    }
}
