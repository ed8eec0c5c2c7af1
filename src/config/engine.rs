use std::path::Path;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use super::{LoggingConfig, SerialConfig, TcpConfig, TransactionConfig, UdpConfig};
use crate::errors::{ConfigValidationError, ModbusError};

/// Complete engine configuration.
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Master-side timeouts and retries
    #[serde(default)]
    pub transaction: TransactionConfig,

    /// TCP listener
    #[serde(default)]
    pub tcp: TcpConfig,

    /// UDP listener
    #[serde(default)]
    pub udp: UdpConfig,

    /// Serial line (RTU or ASCII)
    #[serde(default)]
    pub serial: SerialConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Default configuration directory
    pub const CONFIG_DIR: &'static str = "config";

    /// Environment variable prefix
    const ENV_PREFIX: &'static str = "MODBUS_ENGINE";

    /// Build configuration using the following priority (highest to lowest):
    /// 1. Environment variables (MODBUS_ENGINE_<SECTION>__<FIELD>)
    /// 2. Local configuration file (config/local.yaml)
    /// 3. Environment specific file (config/{RUN_MODE}.yaml)
    /// 4. Default configuration (config/default.yaml)
    /// 5. Built-in defaults
    pub fn new() -> Result<Self, ModbusError> {
        Self::load_from(Self::CONFIG_DIR)
    }

    /// Same layering as [`Config::new`], reading files from `dir`.
    pub fn load_from(dir: impl AsRef<Path>) -> Result<Self, ModbusError> {
        let dir = dir.as_ref();
        let environment = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let config = ConfigBuilder::builder()
            // Built-in defaults, serialized through the same serde shape
            .add_source(ConfigBuilder::try_from(&Config::default())?)
            .add_source(yaml(dir, "default"))
            .add_source(yaml(dir, &environment))
            .add_source(yaml(dir, "local"))
            .add_source(Self::environment())
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file, with environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ModbusError> {
        let config = ConfigBuilder::builder()
            .add_source(ConfigBuilder::try_from(&Config::default())?)
            .add_source(File::from(path.as_ref()))
            .add_source(Self::environment())
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;

        Ok(config)
    }

    fn environment() -> Environment {
        // "__" separates nesting levels so field names may contain "_"
        Environment::with_prefix(Self::ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        self.transaction.validate()?;
        self.tcp.validate()?;
        self.udp.validate()?;
        self.serial.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

fn yaml(dir: &Path, name: &str) -> File<config::FileSourceFile, FileFormat> {
    File::new(&dir.join(name).to_string_lossy(), FileFormat::Yaml).required(false)
}
