use serde::{Deserialize, Serialize};

use crate::{BASE_RETRY_DELAY_MS, JITTER_MAX_MS, MAX_RETRY_DELAY_MS};

/// Exponential backoff schedule: `base * 2^attempt`, capped, plus additive
/// jitter so a burst of failed actions does not retry in lockstep.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_max_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: BASE_RETRY_DELAY_MS,
            max_delay_ms: MAX_RETRY_DELAY_MS,
            jitter_max_ms: JITTER_MAX_MS,
        }
    }
}

impl RetryPolicy {
    /// Delay in milliseconds before the given attempt (1-indexed: the first
    /// retry is attempt 1).
    #[must_use]
    pub fn delay_ms(&self, attempt: u32) -> u64 {
        use rand::Rng;

        let exponent = attempt.min(16);
        let base_delay = self.base_delay_ms.saturating_mul(1u64 << exponent);
        let capped = base_delay.min(self.max_delay_ms);

        let jitter = if self.jitter_max_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=self.jitter_max_ms)
        };

        capped.saturating_add(jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn no_jitter() -> RetryPolicy {
        RetryPolicy {
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
            jitter_max_ms: 0,
        }
    }

    #[test]
    fn schedule_doubles_per_attempt() {
        let policy = no_jitter();
        assert_eq!(policy.delay_ms(1), 2_000);
        assert_eq!(policy.delay_ms(2), 4_000);
        assert_eq!(policy.delay_ms(3), 8_000);
    }

    #[test]
    fn schedule_is_capped() {
        let policy = no_jitter();
        assert_eq!(policy.delay_ms(10), 60_000);
        assert_eq!(policy.delay_ms(u32::MAX), 60_000);
    }

    proptest! {
        #[test]
        fn delay_bounded_by_cap_plus_jitter(attempt in 0u32..64) {
            let policy = RetryPolicy::default();
            let delay = policy.delay_ms(attempt);
            prop_assert!(delay <= policy.max_delay_ms + policy.jitter_max_ms);
        }

        #[test]
        fn delay_never_below_uncapped_base(attempt in 0u32..6) {
            let policy = RetryPolicy::default();
            let delay = policy.delay_ms(attempt);
            prop_assert!(delay >= policy.base_delay_ms << attempt);
        }
    }
}
