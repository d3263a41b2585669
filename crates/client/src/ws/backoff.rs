//! Exponential reconnect backoff.

use std::time::Duration;

/// Reconnect schedule for the push channel.
///
/// The delay before attempt `n` is `min(base × factor^n, max)`. The attempt
/// counter is unbounded; only the delay is capped.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectBudget {
    attempt: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Multiplier applied per consecutive failure
    pub growth_factor: f64,
}

impl Default for ReconnectBudget {
    fn default() -> Self {
        Self::new(Duration::from_millis(1000), Duration::from_millis(30_000), 2.0)
    }
}

impl ReconnectBudget {
    pub fn new(base_delay: Duration, max_delay: Duration, growth_factor: f64) -> Self {
        Self {
            attempt: 0,
            base_delay,
            max_delay: max_delay.max(base_delay),
            // A factor below one would shrink delays and break monotonicity.
            growth_factor: if growth_factor.is_finite() {
                growth_factor.max(1.0)
            } else {
                1.0
            },
        }
    }

    /// Number of retries scheduled since the last successful connect.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Delay for a given attempt number, without consuming it.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let millis = self.base_delay.as_millis() as f64 * self.growth_factor.powi(exponent);
        let max = self.max_delay.as_millis() as f64;
        if !millis.is_finite() || millis >= max {
            self.max_delay
        } else {
            Duration::from_millis(millis as u64)
        }
    }

    /// Delay for the next retry; increments the attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.delay_for_attempt(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
