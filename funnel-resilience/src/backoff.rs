//! Backoff strategies for retry policies

use rand::Rng;
use std::time::Duration;

/// Exponential backoff delay calculator
///
/// The base delay for attempt `n` (0-indexed) is
/// `initial_delay * multiplier^n`, capped at `max_delay`. Jitter is drawn
/// uniformly from `[0, jitter)` and added on top of the capped value.
#[derive(Debug, Clone)]
pub struct BackoffCalculator {
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter: Duration,
}

impl BackoffCalculator {
    /// Create a new backoff calculator
    pub fn new(initial_delay: Duration, max_delay: Duration, multiplier: f64, jitter: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier,
            jitter,
        }
    }

    /// Delay for a specific attempt (0-indexed) before jitter is applied
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let nanos = self.initial_delay.as_nanos() as f64 * self.multiplier.powi(exponent);

        // Overflowing products saturate at the cap
        if !nanos.is_finite() || nanos >= self.max_delay.as_nanos() as f64 {
            return self.max_delay;
        }

        Duration::from_nanos(nanos as u64).min(self.max_delay)
    }

    /// Delay for a specific attempt (0-indexed) including jitter
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        self.add_jitter(self.base_delay(attempt))
    }

    /// Add a random amount in `[0, jitter)` to an arbitrary delay
    pub fn add_jitter(&self, delay: Duration) -> Duration {
        delay.saturating_add(self.sample_jitter())
    }

    fn sample_jitter(&self) -> Duration {
        let upper = self.jitter.as_nanos().min(u64::MAX as u128) as u64;
        if upper == 0 {
            return Duration::ZERO;
        }

        let mut rng = rand::thread_rng();
        Duration::from_nanos(rng.gen_range(0..upper))
    }
}
