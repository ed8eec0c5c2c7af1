use std::time::Duration;

use crate::config::BackoffConfig;

/// Paces the attempts of one transaction.
///
/// The first attempt is free; every retry after it waits an exponentially
/// growing interval capped at `max_interval`. Once `max_attempts` attempts
/// have been made, [`next_backoff`](Self::next_backoff) returns `None`.
#[derive(Debug)]
pub struct BackoffStrategy {
    config: BackoffConfig,
    attempts: u32,
}

impl BackoffStrategy {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            attempts: 1,
        }
    }

    /// Attempts made so far, the first one included.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts.max(1)
    }

    /// Records another attempt and returns the wait before it, or `None` when
    /// the budget is spent.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if self.attempts >= self.max_attempts() {
            return None;
        }

        let interval = self.config.initial_interval.as_secs_f64()
            * self.config.multiplier.powi(self.attempts as i32 - 1);

        let interval =
            Duration::from_secs_f64(interval.min(self.config.max_interval.as_secs_f64()));

        self.attempts += 1;
        Some(interval)
    }
}
