use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigValidationError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub bind_addr: String,
    pub bind_port: u16,

    /// Connections served at once; further clients wait in the accept queue
    pub max_connections: usize,

    /// Connections without a request for this long are closed
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            bind_port: 502,
            max_connections: 100,
            idle_timeout: Duration::from_secs(60),
        }
    }
}

impl Config {
    pub fn address(&self) -> String {
        format!("{}:{}", self.bind_addr, self.bind_port)
    }

    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.bind_addr.is_empty() {
            return Err(ConfigValidationError::tcp("bind address must not be empty"));
        }
        if self.bind_port == 0 {
            return Err(ConfigValidationError::tcp("port must be non-zero"));
        }
        if self.max_connections == 0 {
            return Err(ConfigValidationError::tcp("max_connections cannot be 0"));
        }
        if self.idle_timeout.is_zero() {
            return Err(ConfigValidationError::tcp("idle_timeout cannot be 0"));
        }
        Ok(())
    }
}
