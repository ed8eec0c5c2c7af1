use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigValidationError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid TCP configuration: {0}")]
    InvalidTcp(String),

    #[error("Invalid UDP configuration: {0}")]
    InvalidUdp(String),

    #[error("Invalid serial configuration: {0}")]
    InvalidSerial(String),

    #[error("Invalid timing configuration: {0}")]
    InvalidTiming(String),
}

impl ConfigValidationError {
    pub fn config(details: impl Into<String>) -> Self {
        Self::Config(details.into())
    }

    pub fn tcp(details: impl Into<String>) -> Self {
        Self::InvalidTcp(details.into())
    }

    pub fn udp(details: impl Into<String>) -> Self {
        Self::InvalidUdp(details.into())
    }

    pub fn serial(details: impl Into<String>) -> Self {
        Self::InvalidSerial(details.into())
    }

    pub fn timing(details: impl Into<String>) -> Self {
        Self::InvalidTiming(details.into())
    }
}
