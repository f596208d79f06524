//! Exponential backoff with jitter.

use rand::Rng;
use std::time::Duration;

use crate::config::ResilienceConfig;

/// Calculate exponential backoff delay with jitter.
///
/// `attempt` is the zero-based index of the attempt that just failed, so the
/// first retry waits `base_ms`, the second `2 × base_ms`, and so on.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    let capped_delay = exponential_delay(attempt, base_ms, max_ms);

    // Apply jitter (0 to 10% of the delay)
    let jitter_range = capped_delay / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay.saturating_add(jitter))
}

fn exponential_delay(attempt: u32, base_ms: u64, max_ms: u64) -> u64 {
    let exponential_base = 2u64.saturating_pow(attempt);
    base_ms.saturating_mul(exponential_base).min(max_ms)
}

/// Backoff schedule used by a retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    base_ms: u64,
    max_ms: u64,
    jitter: bool,
}

impl ExponentialBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base_ms: u64::try_from(base.as_millis()).unwrap_or(u64::MAX),
            max_ms: u64::try_from(max.as_millis()).unwrap_or(u64::MAX),
            jitter: true,
        }
    }

    pub fn from_config(config: &ResilienceConfig) -> Self {
        Self {
            base_ms: config.backoff_base_ms,
            max_ms: config.backoff_max_ms,
            jitter: true,
        }
    }

    /// Deterministic delays, mostly useful in tests.
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        if self.jitter {
            calculate_backoff(attempt, self.base_ms, self.max_ms)
        } else {
            Duration::from_millis(exponential_delay(attempt, self.base_ms, self.max_ms))
        }
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::from_config(&ResilienceConfig::default())
    }
}
