//! Exponential backoff with jitter, grounded on the `RetryPolicy` /
//! `compute_backoff` design used for the installation-token registry's retry
//! math.

use std::time::Duration;

use rand::Rng;

/// §4.C: jobs retry starting at 2s, doubling each attempt, capped, up to
/// `max_attempts`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(60),
            max_attempts: 3,
        }
    }
}

impl RetryPolicy {
    /// Backoff delay before attempt number `attempt` (1-indexed), with full
    /// jitter: a uniform random delay between 0 and the exponential cap.
    #[must_use]
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exp = self
            .initial_backoff
            .saturating_mul(1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX));
        let capped = exp.min(self.max_backoff);
        apply_jitter(capped)
    }
}

fn apply_jitter(base: Duration) -> Duration {
    let millis = base.as_millis().min(u128::from(u64::MAX)) as u64;
    if millis == 0 {
        return base;
    }
    let jittered = rand::thread_rng().gen_range(0..=millis);
    Duration::from_millis(jittered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_until_cap() {
        let policy = RetryPolicy::default();
        assert!(policy.backoff_for(1) <= Duration::from_secs(2));
        assert!(policy.backoff_for(2) <= Duration::from_secs(4));
        assert!(policy.backoff_for(3) <= Duration::from_secs(8));
    }

    #[test]
    fn backoff_never_exceeds_max() {
        let policy = RetryPolicy::default();
        for attempt in 1..10 {
            assert!(policy.backoff_for(attempt) <= policy.max_backoff);
        }
    }

    #[test]
    fn default_max_attempts_is_three() {
        assert_eq!(RetryPolicy::default().max_attempts, 3);
    }
}
