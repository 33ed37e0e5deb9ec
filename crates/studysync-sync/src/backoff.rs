//! Retry delay policy for transient delivery failures
//!
//! `delay = min(2^retry_count * base, max) + jitter`, where jitter is a
//! uniformly random 0-25% of the capped delay.

use std::time::Duration;

use rand::Rng;
use studysync_core::config::SyncConfig;

/// Default base delay (1 second)
pub const BASE_DELAY_MS: u64 = 1_000;

/// Default cap applied before jitter (60 seconds)
pub const MAX_DELAY_MS: u64 = 60_000;

/// Largest jitter fraction added on top of the capped delay
pub const MAX_JITTER_FRACTION: f64 = 0.25;

/// Exponential backoff parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base_ms: u64,
    pub max_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_ms: BASE_DELAY_MS,
            max_ms: MAX_DELAY_MS,
        }
    }
}

impl BackoffPolicy {
    pub fn new(base_ms: u64, max_ms: u64) -> Self {
        Self { base_ms, max_ms }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.base_backoff_ms, config.max_backoff_ms)
    }

    /// Capped delay without jitter, in milliseconds
    pub fn base_delay_ms(&self, retry_count: u32) -> u64 {
        2u64.checked_pow(retry_count)
            .and_then(|factor| factor.checked_mul(self.base_ms))
            .map_or(self.max_ms, |delay| delay.min(self.max_ms))
    }

    /// Delay with an explicit jitter fraction, clamped to `0.0..=0.25`
    pub fn delay_with_jitter(&self, retry_count: u32, jitter_fraction: f64) -> Duration {
        let base = self.base_delay_ms(retry_count);
        let fraction = if jitter_fraction.is_finite() {
            jitter_fraction.clamp(0.0, MAX_JITTER_FRACTION)
        } else {
            0.0
        };
        let jitter = (base as f64 * fraction).floor() as u64;
        Duration::from_millis(base.saturating_add(jitter))
    }

    /// Delay with random jitter
    pub fn delay(&self, retry_count: u32) -> Duration {
        let fraction = rand::thread_rng().gen_range(0.0..=MAX_JITTER_FRACTION);
        self.delay_with_jitter(retry_count, fraction)
    }
}

/// Backoff delay under the default policy
pub fn calculate_backoff_delay(retry_count: u32) -> Duration {
    BackoffPolicy::default().delay(retry_count)
}
