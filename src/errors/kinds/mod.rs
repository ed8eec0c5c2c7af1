mod frame_error;
mod frame_format;
mod frame_size;
mod protocol_error;
mod serial_error;

pub use frame_error::FrameErrorKind;
pub use frame_format::FrameFormatKind;
pub use frame_size::FrameSizeKind;
pub use protocol_error::ProtocolErrorKind;
pub use serial_error::SerialErrorKind;
