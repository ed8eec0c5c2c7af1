use thiserror::Error;

use super::{
    ConfigValidationError, FrameError, FrameErrorKind, FrameFormatKind, FrameSizeKind,
    InitializationError, ProtocolErrorKind, RtsError, TransportError,
};

#[derive(Error, Debug)]
pub enum ModbusError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Malformed frame: {0}")]
    Frame(#[from] FrameError),

    #[error("Unsupported function code: 0x{function:02X}")]
    UnsupportedFunction { function: u8 },

    #[error("Operation not supported: {operation}")]
    OperationUnsupported { operation: &'static str },

    #[error("Protocol error: {kind} - {details}")]
    Protocol {
        kind: ProtocolErrorKind,
        details: String,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigValidationError),

    #[error("Initialization error: {0}")]
    Init(#[from] InitializationError),
}

impl ModbusError {
    pub fn protocol(kind: ProtocolErrorKind, details: impl Into<String>) -> Self {
        ModbusError::Protocol {
            kind,
            details: details.into(),
        }
    }

    pub fn unsupported_function(function: u8) -> Self {
        ModbusError::UnsupportedFunction { function }
    }

    pub fn operation_unsupported(operation: &'static str) -> Self {
        ModbusError::OperationUnsupported { operation }
    }

    pub fn frame(
        kind: FrameErrorKind,
        details: impl Into<String>,
        frame_data: Option<Vec<u8>>,
    ) -> Self {
        let details = details.into();
        let size = |kind| {
            ModbusError::Frame(FrameError::Size {
                kind,
                details: details.clone(),
                frame_data: frame_data.clone(),
            })
        };
        let format = |kind| {
            ModbusError::Frame(FrameError::Format {
                kind,
                details: details.clone(),
                frame_data: frame_data.clone(),
            })
        };

        match kind {
            FrameErrorKind::TooShort => size(FrameSizeKind::TooShort),
            FrameErrorKind::TooLong => size(FrameSizeKind::TooLong),
            FrameErrorKind::LengthMismatch => size(FrameSizeKind::LengthMismatch),
            FrameErrorKind::InvalidFormat => format(FrameFormatKind::InvalidFormat),
            FrameErrorKind::InvalidHeader => format(FrameFormatKind::InvalidHeader),
            FrameErrorKind::InvalidEncoding => format(FrameFormatKind::InvalidEncoding),
            FrameErrorKind::UnsupportedSubFunction => {
                format(FrameFormatKind::UnsupportedSubFunction)
            }
            FrameErrorKind::UnexpectedResponse => format(FrameFormatKind::UnexpectedResponse),
        }
    }

    /// Failures a transaction may recover from by sending the request again.
    ///
    /// Malformed frames, protocol mismatches, I/O failures and timeouts are
    /// transient; everything else is surfaced immediately.
    pub fn is_retryable(&self) -> bool {
        match self {
            ModbusError::Transport(TransportError::Closed) => false,
            ModbusError::Transport(_) | ModbusError::Frame(_) | ModbusError::Protocol { .. } => {
                true
            }
            _ => false,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ModbusError::Transport(err) if err.is_timeout())
    }

    /// True when the remote end closed the stream.
    pub fn is_closed(&self) -> bool {
        matches!(self, ModbusError::Transport(TransportError::Closed))
    }
}

impl From<std::io::Error> for ModbusError {
    fn from(err: std::io::Error) -> Self {
        ModbusError::Transport(TransportError::from(err))
    }
}

impl From<RtsError> for ModbusError {
    fn from(err: RtsError) -> Self {
        ModbusError::Transport(TransportError::Rts(err))
    }
}

impl From<config::ConfigError> for ModbusError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(ConfigValidationError::config(err.to_string()))
    }
}
