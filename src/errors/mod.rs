mod config;
mod frame;
mod init;
mod io_operation;
mod kinds;
mod modbus;
mod rts;
mod transport;

pub use kinds::FrameErrorKind;
pub use kinds::FrameFormatKind;
pub use kinds::FrameSizeKind;
pub use kinds::ProtocolErrorKind;
pub use kinds::SerialErrorKind;

pub use config::ConfigValidationError;
pub use frame::FrameError;
pub use init::InitializationError;
pub use io_operation::IoOperation;
pub use modbus::ModbusError;
pub use rts::RtsError;
pub use transport::TransportError;
