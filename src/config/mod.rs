mod backoff;
mod engine;
mod logging;
mod serial;
mod tcp;
mod transaction;
mod types;
mod udp;

pub use backoff::Config as BackoffConfig;
pub use engine::Config as EngineConfig;
pub use logging::Config as LoggingConfig;
pub use serial::Config as SerialConfig;
pub use tcp::Config as TcpConfig;
pub use transaction::Config as TransactionConfig;
pub use types::{DataBits, Parity, RtsType, SerialEncoding, StopBits};
pub use udp::Config as UdpConfig;
