//! Exponential backoff between retry attempts.

use std::time::Duration;

/// Default wait before the first retry.
pub const DEFAULT_FIRST_WAIT_TIME: Duration = Duration::from_secs(10);

/// Exponential backoff policy: `first_wait_time * 2^attempt`, no jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Wait after the first failed attempt.
    pub first_wait_time: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            first_wait_time: DEFAULT_FIRST_WAIT_TIME,
        }
    }
}

impl BackoffPolicy {
    /// Create a new backoff policy.
    #[must_use]
    pub const fn new(first_wait_time: Duration) -> Self {
        Self { first_wait_time }
    }

    /// Calculate the wait after the given 0-based attempt failed.
    ///
    /// Saturates at `Duration::MAX` instead of overflowing.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        if self.first_wait_time.is_zero() {
            return Duration::ZERO;
        }
        match 2u32.checked_pow(attempt) {
            Some(factor) => self.first_wait_time.saturating_mul(factor),
            None => Duration::MAX,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_each_attempt() {
        let policy = BackoffPolicy::new(Duration::from_secs(10));
        assert_eq!(policy.delay(0), Duration::from_secs(10));
        assert_eq!(policy.delay(1), Duration::from_secs(20));
        assert_eq!(policy.delay(2), Duration::from_secs(40));
        assert_eq!(policy.delay(3), Duration::from_secs(80));
    }

    #[test]
    fn test_default_first_wait_is_ten_seconds() {
        assert_eq!(BackoffPolicy::default().delay(0), Duration::from_secs(10));
    }

    #[test]
    fn test_delay_is_deterministic() {
        let policy = BackoffPolicy::new(Duration::from_millis(250));
        assert_eq!(policy.delay(4), policy.delay(4));
        assert_eq!(policy.delay(4), Duration::from_millis(4000));
    }

    #[test]
    fn test_large_attempt_saturates() {
        let policy = BackoffPolicy::new(Duration::from_secs(10));
        assert_eq!(policy.delay(200), Duration::MAX);
    }

    #[test]
    fn test_zero_base_never_waits() {
        let policy = BackoffPolicy::new(Duration::ZERO);
        assert_eq!(policy.delay(5), Duration::ZERO);
        assert_eq!(policy.delay(200), Duration::ZERO);
    }
}
