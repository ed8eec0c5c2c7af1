//! Byte-stream transports.
//!
//! A transport owns its stream and scratch buffers and moves whole messages:
//! it frames outgoing PDUs for its medium and recovers message boundaries on
//! the way in. Reads and writes lock independently, so one read and one write
//! can be in flight at the same time.

mod mbap;
pub mod serial;
mod tcp;
mod udp;

use std::future::Future;

use crate::codec::{Adu, Pdu, RequestAdu, ResponseAdu};
use crate::errors::ModbusError;

pub use serial::{AsciiTransport, RtuTransport, SerialLink, SerialTransport};
pub use tcp::TcpTransport;
pub use udp::UdpTransport;

pub trait Transport: Send + Sync {
    /// Frames and sends one message.
    fn write_message<P: Pdu + Sync>(
        &self,
        message: &Adu<P>,
    ) -> impl Future<Output = Result<(), ModbusError>> + Send;

    /// Master side: reads the next response frame.
    fn read_response(&self) -> impl Future<Output = Result<ResponseAdu, ModbusError>> + Send;

    /// Slave side: reads the next request frame. Master-only transports fail
    /// with [`ModbusError::OperationUnsupported`].
    fn read_request(&self) -> impl Future<Output = Result<RequestAdu, ModbusError>> + Send;

    fn close(&self) -> impl Future<Output = Result<(), ModbusError>> + Send;

    /// Allocates the transaction id for the next request. Transports without
    /// MBAP framing have none.
    fn next_transaction_id(&self) -> Option<u16> {
        None
    }
}
