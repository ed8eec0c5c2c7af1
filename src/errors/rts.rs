use thiserror::Error;

/// Failure to drive the RS-485 direction line.
#[derive(Error, Debug)]
pub enum RtsError {
    #[error("Failed to set RTS {level} on {port}: {source}")]
    Signal {
        level: &'static str,
        port: String,
        #[source]
        source: serialport::Error,
    },
}

impl RtsError {
    pub fn signal(high: bool, port: impl Into<String>, source: serialport::Error) -> Self {
        RtsError::Signal {
            level: if high { "HIGH" } else { "LOW" },
            port: port.into(),
            source,
        }
    }
}
