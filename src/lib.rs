pub mod backoff;
pub mod codec;
pub mod config;
pub mod errors;
pub mod image;
pub mod listener;
pub mod logging;
pub mod registry;
pub mod transaction;
pub mod transport;

mod utils;

pub use codec::{Adu, ExceptionCode, FunctionCode, Request, RequestAdu, Response, ResponseAdu};
pub use config::EngineConfig;
pub use errors::{FrameError, ModbusError, TransportError};
pub use image::{MemoryImage, ProcessImage, ProcessImageSource};
pub use listener::{serve, ServeOptions, TcpListener, UdpListener};
pub use logging::setup_logging;
pub use transaction::Transaction;
pub use transport::{
    AsciiTransport, RtuTransport, SerialTransport, TcpTransport, Transport, UdpTransport,
};
