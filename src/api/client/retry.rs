//! Retry policy for transient API failures.

use crate::error::ApiError;
use rand::Rng;
use std::time::Duration;

/// Upper bound on random jitter as a fraction of the computed delay.
const MAX_JITTER_RATIO: f64 = 0.3;

/// Exponential backoff with jitter, used by `ApiClient`.
#[derive(Clone, Copy, Debug)]
pub(crate) struct RetryPolicy {
    /// Retries after the initial attempt.
    pub(crate) max_retries: u32,
    /// Delay before the first retry; doubled on each further attempt.
    pub(crate) base_delay: Duration,
    pub(crate) max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// `attempt` is zero-based: 0 is the first failure.
    pub(crate) fn should_retry(&self, err: &ApiError, attempt: u32) -> bool {
        attempt < self.max_retries && err.is_transient()
    }

    /// Delay before the next attempt, honoring `Retry-After` when present.
    pub(crate) fn retry_delay_for(&self, attempt: u32, err: &ApiError) -> Duration {
        let jitter = rand::thread_rng().gen_range(0.0..=MAX_JITTER_RATIO);
        self.delay_with_jitter(attempt, err, jitter)
    }

    fn delay_with_jitter(&self, attempt: u32, err: &ApiError, jitter: f64) -> Duration {
        if let Some(seconds) = err.retry_after_secs() {
            return Duration::from_secs(seconds.clamp(1, 300));
        }
        let factor = 2u32.saturating_pow(attempt);
        let base = self
            .base_delay
            .saturating_mul(factor)
            .min(self.max_delay);
        base + base.mul_f64(jitter.clamp(0.0, MAX_JITTER_RATIO))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1000),
        }
    }

    #[test]
    fn retries_only_transient_errors_within_budget() {
        let p = policy();
        let busy = ApiError::status(503, String::new(), None);
        assert!(p.should_retry(&busy, 0));
        assert!(p.should_retry(&busy, 2));
        assert!(!p.should_retry(&busy, 3));
        assert!(!p.should_retry(&ApiError::status(404, String::new(), None), 0));
        assert!(!p.should_retry(&ApiError::InvalidResponse("x".into()), 0));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let p = policy();
        let err = ApiError::status(500, String::new(), None);
        assert_eq!(p.delay_with_jitter(0, &err, 0.0), Duration::from_millis(100));
        assert_eq!(p.delay_with_jitter(1, &err, 0.0), Duration::from_millis(200));
        assert_eq!(p.delay_with_jitter(3, &err, 0.0), Duration::from_millis(800));
        assert_eq!(p.delay_with_jitter(9, &err, 0.0), Duration::from_millis(1000));
    }

    #[test]
    fn jitter_never_exceeds_thirty_percent() {
        let p = policy();
        let err = ApiError::status(500, String::new(), None);
        assert_eq!(p.delay_with_jitter(0, &err, 0.3), Duration::from_millis(130));
        assert_eq!(p.delay_with_jitter(0, &err, 5.0), Duration::from_millis(130));
        for attempt in 0..6 {
            let d = p.retry_delay_for(attempt, &err);
            let floor = p.delay_with_jitter(attempt, &err, 0.0);
            assert!(d >= floor && d <= floor.mul_f64(1.3) + Duration::from_nanos(1));
        }
    }

    #[test]
    fn retry_after_header_wins_and_is_clamped() {
        let p = policy();
        assert_eq!(
            p.retry_delay_for(0, &ApiError::status(429, String::new(), Some(7))),
            Duration::from_secs(7)
        );
        assert_eq!(
            p.retry_delay_for(0, &ApiError::status(429, String::new(), Some(0))),
            Duration::from_secs(1)
        );
        assert_eq!(
            p.retry_delay_for(0, &ApiError::status(429, String::new(), Some(9999))),
            Duration::from_secs(300)
        );
    }
}
