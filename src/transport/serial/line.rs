use serialport::SerialPort;

use super::{AsciiTransport, RtuTransport, SerialLink};
use crate::codec::{Adu, Pdu, RequestAdu, ResponseAdu};
use crate::config::{SerialConfig, SerialEncoding};
use crate::errors::ModbusError;
use crate::transport::Transport;

/// A serial transport in whichever encoding the line is configured for.
pub enum SerialTransport<L: SerialLink = Box<dyn SerialPort>> {
    Rtu(RtuTransport<L>),
    Ascii(AsciiTransport<L>),
}

impl SerialTransport {
    /// Opens `config.device` with the framing named by `config.encoding`.
    pub fn open(config: &SerialConfig) -> Result<Self, ModbusError> {
        Ok(match config.encoding {
            SerialEncoding::Rtu => Self::Rtu(RtuTransport::open(config)?),
            SerialEncoding::Ascii => Self::Ascii(AsciiTransport::open(config)?),
        })
    }
}

impl<L: SerialLink> SerialTransport<L> {
    pub fn encoding(&self) -> SerialEncoding {
        match self {
            Self::Rtu(_) => SerialEncoding::Rtu,
            Self::Ascii(_) => SerialEncoding::Ascii,
        }
    }

    pub async fn last_request(&self) -> Vec<u8> {
        match self {
            Self::Rtu(transport) => transport.last_request().await,
            Self::Ascii(transport) => transport.last_request().await,
        }
    }
}

impl<L: SerialLink> Transport for SerialTransport<L> {
    async fn write_message<P: Pdu + Sync>(&self, message: &Adu<P>) -> Result<(), ModbusError> {
        match self {
            Self::Rtu(transport) => transport.write_message(message).await,
            Self::Ascii(transport) => transport.write_message(message).await,
        }
    }

    async fn read_response(&self) -> Result<ResponseAdu, ModbusError> {
        match self {
            Self::Rtu(transport) => transport.read_response().await,
            Self::Ascii(transport) => transport.read_response().await,
        }
    }

    async fn read_request(&self) -> Result<RequestAdu, ModbusError> {
        match self {
            Self::Rtu(transport) => transport.read_request().await,
            Self::Ascii(transport) => transport.read_request().await,
        }
    }

    async fn close(&self) -> Result<(), ModbusError> {
        match self {
            Self::Rtu(transport) => transport.close().await,
            Self::Ascii(transport) => transport.close().await,
        }
    }
}
