//! Exponential backoff for delivery retries.

use chrono::{DateTime, Duration, Utc};

/// Retry policy for notification jobs.
///
/// After a failed attempt `n` (1-based) the job becomes eligible again after
/// `base * factor^(n-1)`, until `max_attempts` is reached. With the default
/// base 1s and factor 2 a job failing three times is eligible at roughly
/// t+1s, t+3s and t+7s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Base delay in seconds.
    pub base_secs: u64,
    /// Multiplier applied per attempt.
    pub factor: u32,
    /// Attempts after which the job is terminally failed.
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_secs: 1,
            factor: 2,
            max_attempts: 8,
        }
    }
}

impl BackoffPolicy {
    /// Returns the delay before the next attempt after `failed_attempt`
    /// failures, or `None` once the attempt budget is exhausted.
    #[must_use]
    pub fn delay_after(&self, failed_attempt: u32) -> Option<Duration> {
        if failed_attempt >= self.max_attempts {
            return None;
        }
        let exponent = failed_attempt.saturating_sub(1);
        let multiplier = u64::from(self.factor).saturating_pow(exponent);
        let secs = self.base_secs.saturating_mul(multiplier);
        Some(Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX)))
    }

    /// Returns when the job becomes eligible again, or `None` if it is
    /// terminally failed.
    #[must_use]
    pub fn next_eligible(&self, now: DateTime<Utc>, failed_attempt: u32) -> Option<DateTime<Utc>> {
        self.delay_after(failed_attempt).map(|delay| now + delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule_doubles() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_after(1), Some(Duration::seconds(1)));
        assert_eq!(policy.delay_after(2), Some(Duration::seconds(2)));
        assert_eq!(policy.delay_after(3), Some(Duration::seconds(4)));
        assert_eq!(policy.delay_after(4), Some(Duration::seconds(8)));
    }

    #[test]
    fn test_cumulative_eligibility_times() {
        // A job failing at t+0 on each eligible instant becomes eligible at
        // roughly t+1s, t+3s, t+7s before attempt 4.
        let policy = BackoffPolicy::default();
        let t0 = Utc::now();

        let e1 = policy.next_eligible(t0, 1).unwrap();
        let e2 = policy.next_eligible(e1, 2).unwrap();
        let e3 = policy.next_eligible(e2, 3).unwrap();

        assert_eq!(e1 - t0, Duration::seconds(1));
        assert_eq!(e2 - t0, Duration::seconds(3));
        assert_eq!(e3 - t0, Duration::seconds(7));
    }

    #[test]
    fn test_exhausted_budget_is_terminal() {
        let policy = BackoffPolicy {
            base_secs: 1,
            factor: 2,
            max_attempts: 3,
        };
        assert!(policy.delay_after(2).is_some());
        assert_eq!(policy.delay_after(3), None);
        assert_eq!(policy.delay_after(10), None);
        assert_eq!(policy.next_eligible(Utc::now(), 3), None);
    }

    #[test]
    fn test_large_attempt_does_not_overflow() {
        let policy = BackoffPolicy {
            base_secs: 60,
            factor: 10,
            max_attempts: u32::MAX,
        };
        // Saturates instead of panicking.
        assert!(policy.delay_after(40).is_some());
    }
}
