use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigValidationError;

/// Retry policy of a transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Wait before the first retry
    #[serde(with = "humantime_serde")]
    pub initial_interval: Duration,
    /// Upper bound for any single wait
    #[serde(with = "humantime_serde")]
    pub max_interval: Duration,
    /// Multiplier for each subsequent attempt
    pub multiplier: f64,
    /// Total number of attempts, the first one included
    pub max_attempts: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(100),
            max_interval: Duration::from_secs(5),
            multiplier: 2.0,
            max_attempts: 3,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.max_attempts == 0 {
            return Err(ConfigValidationError::timing(
                "max_attempts must be at least 1",
            ));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(ConfigValidationError::timing(format!(
                "backoff multiplier {} must be a finite value >= 1.0",
                self.multiplier
            )));
        }
        if self.initial_interval > self.max_interval {
            return Err(ConfigValidationError::timing(format!(
                "initial_interval ({:?}) cannot exceed max_interval ({:?})",
                self.initial_interval, self.max_interval
            )));
        }
        Ok(())
    }
}
