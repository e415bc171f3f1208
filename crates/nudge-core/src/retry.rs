//! Retry eligibility and exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

/// Backoff parameters for outbox retries
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Symmetric jitter as a fraction of the capped delay (0 disables jitter)
    pub jitter_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(60_000),
            jitter_ratio: 0.2,
        }
    }
}

impl RetryPolicy {
    /// Policy without jitter, useful where delays must be predictable
    #[must_use]
    pub const fn without_jitter(mut self) -> Self {
        self.jitter_ratio = 0.0;
        self
    }

    pub const fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// `min(base * 2^attempt, max)` before jitter, in milliseconds
    #[allow(clippy::cast_precision_loss)]
    pub fn capped_delay_ms(&self, attempt: u32) -> f64 {
        let base = self.base_delay.as_millis() as f64;
        let max = self.max_delay.as_millis() as f64;
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        (base * 2f64.powi(exponent)).min(max)
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        self.delay_with(attempt, &mut rand::thread_rng())
    }

    /// Backoff delay drawing jitter from `rng`
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn delay_with<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let capped = self.capped_delay_ms(attempt);
        let range = self.jitter_ratio.max(0.0) * capped;
        let jitter = if range > 0.0 {
            rng.gen_range(-range..=range)
        } else {
            0.0
        };
        let millis = (capped + jitter).floor().max(0.0);
        Duration::from_millis(millis as u64)
    }
}
