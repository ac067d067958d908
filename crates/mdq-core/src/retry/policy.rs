use std::time::Duration;

use rand::Rng;

use crate::job::FailureKind;

/// Fine-grained classification of an error for retry purposes.
///
/// Callers map HTTP status codes, curl errors, or IO failures into these
/// kinds; [`ErrorKind::failure_kind`] collapses them into the job-level
/// transient/permanent split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Operation timed out (connect/read).
    Timeout,
    /// Server asked us to slow down (e.g. 429, 503).
    Throttled,
    /// Network-level failure (connection reset, DNS, etc.).
    Connection,
    /// HTTP status that is retryable but not strictly throttling (5xx).
    Http5xx(u16),
    /// Any other error (not retried).
    Other,
}

impl ErrorKind {
    pub fn failure_kind(self) -> FailureKind {
        match self {
            ErrorKind::Other => FailureKind::Permanent,
            _ => FailureKind::Transient,
        }
    }
}

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Do not retry this error.
    NoRetry,
    /// Retry after the given delay.
    RetryAfter(Duration),
}

/// Exponential backoff with jitter and caps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Base delay for backoff.
    pub base_delay: Duration,
    /// Upper bound on backoff delay.
    pub max_delay: Duration,
    /// Relative jitter in `[0, 1]`; the delay is scaled by a random factor in
    /// `[1 - jitter, 1 + jitter]`.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    /// Decide whether a failure of attempt number `attempt` (1-based) is
    /// retried, and after how long.
    pub fn decide(&self, attempt: u32, kind: FailureKind) -> RetryDecision {
        if kind == FailureKind::Permanent || attempt >= self.max_attempts {
            return RetryDecision::NoRetry;
        }
        RetryDecision::RetryAfter(self.delay_for(attempt))
    }

    /// Jittered delay before attempt `attempt + 1`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let jitter = if self.jitter.is_finite() {
            self.jitter.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let factor = if jitter > 0.0 {
            rand::rng().random_range((1.0 - jitter)..=(1.0 + jitter))
        } else {
            1.0
        };
        self.scaled_delay(attempt, factor)
    }

    /// `min(base * 2^attempt, max) * factor`, capped at `max_delay`.
    fn scaled_delay(&self, attempt: u32, factor: f64) -> Duration {
        let exp = 1u32 << attempt.min(16);
        let raw = self.base_delay.saturating_mul(exp).min(self.max_delay);
        raw.mul_f64(factor.max(0.0)).min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn retry_after(d: RetryDecision) -> Duration {
        match d {
            RetryDecision::RetryAfter(d) => d,
            RetryDecision::NoRetry => panic!("expected retry"),
        }
    }

    #[test]
    fn no_retry_for_permanent() {
        let p = RetryPolicy::default();
        assert_eq!(p.decide(1, FailureKind::Permanent), RetryDecision::NoRetry);
    }

    #[test]
    fn respects_max_attempts() {
        let p = RetryPolicy::default();
        assert!(matches!(
            p.decide(1, FailureKind::Transient),
            RetryDecision::RetryAfter(_)
        ));
        assert!(matches!(
            p.decide(2, FailureKind::Transient),
            RetryDecision::RetryAfter(_)
        ));
        assert_eq!(p.decide(3, FailureKind::Transient), RetryDecision::NoRetry);
    }

    #[test]
    fn exponential_backoff_grows_and_is_capped() {
        let p = RetryPolicy {
            max_attempts: 20,
            jitter: 0.0,
            ..RetryPolicy::default()
        };
        let d1 = retry_after(p.decide(1, FailureKind::Transient));
        let d2 = retry_after(p.decide(2, FailureKind::Transient));
        assert_eq!(d1, Duration::from_secs(2));
        assert_eq!(d2, Duration::from_secs(4));
        let d_last = retry_after(p.decide(15, FailureKind::Transient));
        assert_eq!(d_last, p.max_delay);
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let p = RetryPolicy::default();
        for _ in 0..200 {
            let d = p.delay_for(2);
            assert!(d >= Duration::from_millis(3199), "{d:?}");
            assert!(d <= Duration::from_millis(4801), "{d:?}");
        }
        assert!(p.delay_for(30) <= p.max_delay);
    }

    #[test]
    fn non_finite_jitter_means_no_jitter() {
        let p = RetryPolicy {
            jitter: f64::NAN,
            ..RetryPolicy::default()
        };
        assert_eq!(p.delay_for(2), Duration::from_secs(4));
    }

    #[test]
    fn error_kinds_collapse_to_failure_kind() {
        assert_eq!(ErrorKind::Timeout.failure_kind(), FailureKind::Transient);
        assert_eq!(ErrorKind::Http5xx(502).failure_kind(), FailureKind::Transient);
        assert_eq!(ErrorKind::Other.failure_kind(), FailureKind::Permanent);
    }
}
