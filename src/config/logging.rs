use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

use crate::errors::ConfigValidationError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Enable trace-level logging for frame contents
    pub trace_frames: bool,

    /// Minimum log level for console output
    pub level: String,

    /// Log format (pretty or json)
    pub format: String,

    /// Whether to include source code location in logs
    pub include_location: bool,

    /// Whether to include thread IDs in logs
    pub thread_ids: bool,

    /// Whether to include thread names in logs
    pub thread_names: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            trace_frames: false,
            level: "info".to_string(),
            format: "pretty".to_string(),
            include_location: false,
            thread_ids: false,
            thread_names: false,
        }
    }
}

impl Config {
    pub fn get_level_filter(&self) -> LevelFilter {
        LevelFilter::from_str(&self.level).unwrap_or(LevelFilter::INFO)
    }

    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }

    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if LevelFilter::from_str(&self.level).is_err() {
            return Err(ConfigValidationError::config(format!(
                "invalid log level '{}'",
                self.level
            )));
        }
        match self.format.to_lowercase().as_str() {
            "pretty" | "json" => Ok(()),
            other => Err(ConfigValidationError::config(format!(
                "invalid log format '{}', expected pretty or json",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_validation() {
        let config = Config {
            level: "invalid".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            level: "debug".to_string(),
            format: "JSON".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert!(config.is_json());
    }

    #[test]
    fn test_level_filter() {
        let config = Config {
            level: "debug".to_string(),
            ..Default::default()
        };
        assert_eq!(config.get_level_filter(), LevelFilter::DEBUG);

        let config = Config {
            level: "invalid".to_string(),
            ..Default::default()
        };
        assert_eq!(config.get_level_filter(), LevelFilter::INFO);
    }
}
