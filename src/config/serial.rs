use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{DataBits, Parity, RtsType, SerialEncoding, StopBits};
use crate::errors::ConfigValidationError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub device: String,
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,

    /// RTU (binary, CRC-16) or ASCII (hex, LRC) framing
    pub encoding: SerialEncoding,

    /// RS-485 adapters that hear their own transmission
    pub echo: bool,

    /// RS-485 direction control through the RTS line
    pub rts_type: RtsType,
    pub rts_delay_us: u64,

    /// Timeout for individual reads on the serial port
    #[serde(with = "humantime_serde")]
    pub serial_timeout: Duration,

    /// Log every frame sent and received at trace level
    pub trace_frames: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: "/dev/ttyUSB0".to_string(),
            baud_rate: 9600,
            data_bits: DataBits::default(),
            parity: Parity::default(),
            stop_bits: StopBits::default(),
            encoding: SerialEncoding::default(),
            echo: false,
            rts_type: RtsType::default(),
            rts_delay_us: 0,
            serial_timeout: Duration::from_secs(1),
            trace_frames: false,
        }
    }
}

impl Config {
    pub fn serial_port_info(&self) -> String {
        format!(
            "{} ({} baud, {} data bits, {} parity, {} stop bits, {})",
            self.device,
            self.baud_rate,
            self.data_bits,
            self.parity,
            self.stop_bits,
            self.encoding
        )
    }

    /// Bits on the wire per character: start, data, parity and stop bits.
    pub fn character_bits(&self) -> u32 {
        1 + u32::from(self.data_bits.get()) + self.parity.bits() + self.stop_bits.bits()
    }

    /// Time one character takes on the line at `baud_rate`.
    pub fn character_time(&self) -> Duration {
        Duration::from_secs_f64(f64::from(self.character_bits()) / f64::from(self.baud_rate.max(1)))
    }

    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.device.is_empty() {
            return Err(ConfigValidationError::serial("device must not be empty"));
        }
        if self.baud_rate == 0 {
            return Err(ConfigValidationError::serial("baud rate must be non-zero"));
        }
        if self.serial_timeout.is_zero() {
            return Err(ConfigValidationError::serial(
                "serial_timeout must be non-zero",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_character_timing() {
        let config = Config::default();
        assert_eq!(config.character_bits(), 10);

        let config = Config {
            baud_rate: 19200,
            parity: Parity::Even,
            stop_bits: StopBits::One,
            ..Default::default()
        };
        assert_eq!(config.character_bits(), 11);
        assert_eq!(config.character_time().as_micros(), 572);

        let config = Config {
            data_bits: DataBits::new(7).unwrap(),
            stop_bits: StopBits::Two,
            ..Default::default()
        };
        assert_eq!(config.character_bits(), 10);
    }
}
