use serde::{Deserialize, Serialize};

use crate::errors::ConfigValidationError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub bind_addr: String,
    pub bind_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            bind_port: 502,
        }
    }
}

impl Config {
    pub fn address(&self) -> String {
        format!("{}:{}", self.bind_addr, self.bind_port)
    }

    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.bind_addr.is_empty() {
            return Err(ConfigValidationError::udp("bind address must not be empty"));
        }
        if self.bind_port == 0 {
            return Err(ConfigValidationError::udp("port must be non-zero"));
        }
        Ok(())
    }
}
