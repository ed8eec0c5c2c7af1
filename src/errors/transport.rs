use std::time::Duration;
use thiserror::Error;
use tokio::time::error::Elapsed;

use super::{IoOperation, RtsError, SerialErrorKind};

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Serial port error: {kind} on {port} - {details}")]
    Serial {
        kind: SerialErrorKind,
        port: String,
        details: String,
        #[source]
        source: Option<serialport::Error>,
    },

    #[error("I/O error: {operation} failed on {details}")]
    Io {
        operation: IoOperation,
        details: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Transaction timeout after {elapsed:?}, limit was {limit:?}")]
    Timeout {
        elapsed: Duration,
        limit: Duration,
        #[source]
        source: Elapsed,
    },

    #[error("No response received after {attempts} attempts over {elapsed:?}")]
    NoResponse { attempts: u8, elapsed: Duration },

    #[error("Connection closed by peer")]
    Closed,

    #[error("RTS error: {0}")]
    Rts(#[from] RtsError),
}

impl TransportError {
    pub fn io(operation: IoOperation, details: impl Into<String>, source: std::io::Error) -> Self {
        TransportError::Io {
            operation,
            details: details.into(),
            source,
        }
    }

    /// Maps a read failure, turning an end-of-stream into [`TransportError::Closed`].
    pub fn read(details: impl Into<String>, source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe => TransportError::Closed,
            _ => TransportError::io(IoOperation::Read, details, source),
        }
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            TransportError::Timeout { .. } | TransportError::NoResponse { .. } => true,
            TransportError::Io { source, .. } => {
                matches!(
                    source.kind(),
                    std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
                )
            }
            _ => false,
        }
    }
}

impl From<serialport::Error> for TransportError {
    fn from(err: serialport::Error) -> Self {
        let kind = match err.kind {
            serialport::ErrorKind::Io(kind) => {
                return TransportError::io(
                    IoOperation::Line,
                    "serial port",
                    std::io::Error::new(kind, err.description),
                );
            }
            serialport::ErrorKind::NoDevice => SerialErrorKind::OpenFailed,
            serialport::ErrorKind::InvalidInput => SerialErrorKind::ConfigurationFailed,
            _ => SerialErrorKind::Other,
        };

        TransportError::Serial {
            kind,
            port: String::from("serial port"),
            details: err.description.clone(),
            source: Some(err),
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::Io {
            operation: match err.kind() {
                std::io::ErrorKind::TimedOut => IoOperation::Read,
                std::io::ErrorKind::WouldBlock => IoOperation::Read,
                std::io::ErrorKind::WriteZero => IoOperation::Write,
                _ => IoOperation::Line,
            },
            details: err.to_string(),
            source: err,
        }
    }
}
