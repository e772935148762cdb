//! Retry policy for session acquisition

use std::time::Duration;

/// Default number of connection attempts.
/// Five attempts with the default delays give up after roughly 24 seconds.
pub const DEFAULT_MAX_RETRY: u32 = 5;

/// Default delay before the second attempt
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(2_000);

/// Default ceiling for the delay between attempts
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(10_000);

/// Bounded exponential backoff: `initial_delay * 2^n`, capped at `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of connection attempts, including the first
    pub max_retry: u32,
    /// Delay after the first failed attempt
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retry: DEFAULT_MAX_RETRY,
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Create a policy from millisecond delays.
    pub fn from_millis(max_retry: u32, initial_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_retry,
            initial_delay: Duration::from_millis(initial_delay_ms),
            max_delay: Duration::from_millis(max_delay_ms),
        }
    }

    /// Delay to wait after the `failures`-th consecutive failure (1-based).
    ///
    /// Delays never decrease with `failures` and never exceed `max_delay`.
    pub fn delay_after(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(31);
        self.initial_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Whether another attempt is allowed after `attempts` have been made.
    pub fn allows_another(&self, attempts: u32) -> bool {
        attempts < self.max_retry
    }
}
