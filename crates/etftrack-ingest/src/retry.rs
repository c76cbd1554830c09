//! Bounded retry with exponential backoff.

use std::time::Duration;

/// Retry policy for transient fetch failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub base_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Creates a new retry policy. At least one attempt is always made.
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// A policy that never retries.
    #[must_use]
    pub const fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Returns true if another attempt may follow attempt number `attempt`
    /// (1-based).
    #[must_use]
    pub const fn allows_retry_after(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay to wait after failed attempt number `attempt` (1-based) of
    /// the fetch identified by `key`.
    ///
    /// Doubles from `base_delay`, is capped at `max_delay`, and carries a
    /// jitter of up to ±25% derived from `key` and `attempt`. Instruments
    /// failing together therefore retry at different moments, while the
    /// delay for one instrument stays reproducible.
    #[must_use]
    pub fn delay_for(&self, attempt: u32, key: &str) -> Duration {
        let base_ms = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX);
        let max_ms = u64::try_from(self.max_delay.as_millis()).unwrap_or(u64::MAX);

        let exp_ms = base_ms.saturating_mul(1u64 << attempt.saturating_sub(1).min(16));
        let capped_ms = exp_ms.min(max_ms);

        let jitter_range = capped_ms / 4;
        let delay_ms = if jitter_range > 0 {
            let offset = jitter_seed(key, attempt) % (jitter_range * 2);
            (capped_ms - jitter_range).saturating_add(offset)
        } else {
            capped_ms
        };

        Duration::from_millis(delay_ms.min(max_ms))
    }
}

/// FNV-1a over `key`, mixed with the attempt number.
fn jitter_seed(key: &str, attempt: u32) -> u64 {
    let hash = key.bytes().fold(0xcbf2_9ce4_8422_2325_u64, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
    });
    hash ^ u64::from(attempt).wrapping_mul(0x9e37_79b9_7f4a_7c15)
}
