use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::BackoffConfig;
use crate::errors::ConfigValidationError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// How long one attempt waits for its response
    #[serde(with = "humantime_serde")]
    pub response_timeout: Duration,

    #[serde(default)]
    pub backoff: BackoffConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            response_timeout: Duration::from_secs(3),
            backoff: BackoffConfig::default(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.response_timeout.is_zero() {
            return Err(ConfigValidationError::timing(
                "response_timeout must be non-zero",
            ));
        }
        self.backoff.validate()
    }
}
