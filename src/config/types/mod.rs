mod data_bits;
mod encoding;
mod parity;
mod rts_type;
mod stop_bits;

pub use data_bits::*;
pub use encoding::*;
pub use parity::*;
pub use rts_type::*;
pub use stop_bits::*;
