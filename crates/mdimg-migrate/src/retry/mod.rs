//! Retry policy with capped exponential backoff and jitter.
//!
//! The policy only answers two questions: whether a failure gets another
//! attempt, and how long to wait before it. Attempts are counted from 1 as
//! the number of failures so far, so an operation that keeps failing with a
//! retryable error runs exactly `max_retries + 1` times.

use std::time::Duration;

use mdimg_core::{MigrationError, MigrationSettings};
use rand::Rng;

/// Backoff configuration for one stage of an image task.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    base_delay: Duration,
    max_delay: Duration,
    factor: f64,
    jitter: f64,
    max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            factor: 2.0,
            jitter: 0.1,
            max_retries: 3,
        }
    }
}

impl RetryPolicy {
    /// Build the policy described by `settings`.
    #[must_use]
    pub fn from_settings(settings: &MigrationSettings) -> Self {
        Self {
            base_delay: Duration::from_millis(settings.retry_base_delay_ms),
            max_delay: Duration::from_millis(settings.retry_max_delay_ms),
            factor: settings.retry_factor,
            jitter: settings.retry_jitter,
            max_retries: settings.max_retries,
        }
    }

    /// Set the number of retries after the first attempt.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the first backoff delay and the cap.
    #[must_use]
    pub const fn with_delays(mut self, base: Duration, max: Duration) -> Self {
        self.base_delay = base;
        self.max_delay = max;
        self
    }

    /// Set the jitter fraction. `0.0` makes delays deterministic.
    #[must_use]
    pub const fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    #[must_use]
    pub const fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Total number of attempts a persistently failing operation gets.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Delay before retry number `attempt`, without jitter.
    ///
    /// `min(base * factor^(attempt - 1), max)`.
    #[must_use]
    pub fn nominal_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let scaled = self.base_delay.as_secs_f64() * self.factor.powi(exponent);
        let capped = scaled.min(self.max_delay.as_secs_f64());
        if capped.is_finite() && capped > 0.0 {
            Duration::from_secs_f64(capped)
        } else if capped > 0.0 {
            self.max_delay
        } else {
            Duration::ZERO
        }
    }

    /// Delay before retry number `attempt`, perturbed by `± jitter * delay`.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let nominal = self.nominal_delay(attempt);
        if self.jitter <= 0.0 || nominal.is_zero() {
            return nominal;
        }
        let spread = nominal.as_secs_f64() * self.jitter;
        let offset = rand::rng().random_range(-spread..=spread);
        Duration::from_secs_f64((nominal.as_secs_f64() + offset).max(0.0))
    }

    /// Whether a failure after `attempt` tries deserves another one.
    #[must_use]
    pub const fn should_retry(&self, error: &MigrationError, attempt: u32) -> bool {
        error.is_retryable() && attempt <= self.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdimg_core::ValidationFailure;

    fn deterministic() -> RetryPolicy {
        RetryPolicy::default().with_jitter(0.0)
    }

    #[test]
    fn test_nominal_delays_double_until_cap() {
        let policy = deterministic();
        assert_eq!(policy.delay(1), Duration::from_secs(1));
        assert_eq!(policy.delay(2), Duration::from_secs(2));
        assert_eq!(policy.delay(3), Duration::from_secs(4));
        assert_eq!(policy.delay(5), Duration::from_secs(16));
        assert_eq!(policy.delay(6), Duration::from_secs(30));
        assert_eq!(policy.delay(60), Duration::from_secs(30));
    }

    #[test]
    fn test_delays_are_non_decreasing() {
        let policy = deterministic();
        let delays: Vec<_> = (1..=12).map(|a| policy.delay(a)).collect();
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = RetryPolicy::default().with_jitter(0.1);
        for _ in 0..200 {
            let d = policy.delay(2).as_secs_f64();
            assert!((1.8..=2.2).contains(&d), "delay {d} out of range");
        }
    }

    #[test]
    fn test_retryable_errors_get_max_retries_plus_one_attempts() {
        let policy = deterministic().with_max_retries(3);
        let err = MigrationError::http_status(503);

        let mut attempts = 0;
        loop {
            attempts += 1;
            if !policy.should_retry(&err, attempts) {
                break;
            }
        }
        assert_eq!(attempts, policy.max_attempts());
        assert_eq!(attempts, 4);
    }

    #[test]
    fn test_permanent_errors_are_never_retried() {
        let policy = deterministic();
        let err = MigrationError::validation(ValidationFailure::Oversized, "too big");
        assert!(!policy.should_retry(&err, 1));
        assert!(!policy.should_retry(&MigrationError::Cancelled, 1));
    }

    #[test]
    fn test_from_settings() {
        let settings = MigrationSettings {
            max_retries: 5,
            retry_base_delay_ms: 250,
            ..MigrationSettings::default()
        };
        let policy = RetryPolicy::from_settings(&settings).with_jitter(0.0);
        assert_eq!(policy.max_retries(), 5);
        assert_eq!(policy.delay(1), Duration::from_millis(250));
    }
}
