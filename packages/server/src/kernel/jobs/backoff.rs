//! Retry backoff: exponential with full jitter.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Backoff { base, max }
    }

    /// Delay before the next attempt: `base * 2^(attempt-1)` capped at
    /// `max`, scaled by a jitter factor in [0.5, 1.0]. The jitter derives
    /// from a hash of (job_id, attempt), so retries spread out without the
    /// schedule depending on process randomness.
    pub fn delay(&self, job_id: &str, attempt: i32) -> Duration {
        let shift = attempt.saturating_sub(1).clamp(0, 16) as u32;
        let exp = self
            .base
            .saturating_mul(2u32.saturating_pow(shift))
            .min(self.max);

        let mut hasher = DefaultHasher::new();
        job_id.hash(&mut hasher);
        attempt.hash(&mut hasher);
        let jitter = 0.5 + (hasher.finish() % 1000) as f64 / 2000.0;

        exp.mul_f64(jitter)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff {
            base: Duration::from_secs(5),
            max: Duration::from_secs(300),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_exponentially_within_bounds() {
        let backoff = Backoff::default();
        for attempt in 1..=5 {
            let delay = backoff.delay("rt_x", attempt);
            let full = Duration::from_secs(5 * 2u64.pow(attempt as u32 - 1)).min(backoff.max);
            assert!(delay <= full, "attempt {attempt}: {delay:?} > {full:?}");
            assert!(delay >= full / 2, "attempt {attempt}: {delay:?} < {:?}", full / 2);
        }
    }

    #[test]
    fn delay_is_capped_at_max() {
        let backoff = Backoff::default();
        let delay = backoff.delay("rt_x", 30);
        assert!(delay <= backoff.max);
    }

    #[test]
    fn jitter_is_deterministic_per_job_and_attempt() {
        let backoff = Backoff::default();
        assert_eq!(backoff.delay("rt_a", 2), backoff.delay("rt_a", 2));
        assert_ne!(backoff.delay("rt_a", 2), backoff.delay("rt_b", 2));
    }
}
