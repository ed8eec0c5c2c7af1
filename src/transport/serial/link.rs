use std::io;
use std::time::Duration;

use serialport::{ClearBuffer, SerialPort};

use crate::errors::{RtsError, TransportError};

/// The byte-level operations the serial transports need from a port.
///
/// Implemented for `serialport` ports; tests and adapters can supply their
/// own. Reads are blocking and bounded by [`SerialLink::timeout`].
pub trait SerialLink: Send {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()>;

    /// Discards everything received but not yet read.
    fn clear_input(&mut self) -> Result<(), TransportError>;

    fn timeout(&self) -> Duration;

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), TransportError>;

    /// Whether reads can block until a number of bytes has arrived.
    fn supports_receive_threshold(&self) -> bool {
        false
    }

    fn receive_threshold(&self) -> Option<usize> {
        None
    }

    fn set_receive_threshold(&mut self, _threshold: Option<usize>) -> Result<(), TransportError> {
        Ok(())
    }

    fn set_request_to_send(&mut self, level: bool) -> Result<(), RtsError>;

    fn name(&self) -> String;
}

impl SerialLink for Box<dyn SerialPort> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        io::Read::read(self, buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        io::Write::write_all(self, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        io::Write::flush(self)
    }

    fn clear_input(&mut self) -> Result<(), TransportError> {
        Ok(self.clear(ClearBuffer::Input)?)
    }

    fn timeout(&self) -> Duration {
        SerialPort::timeout(self.as_ref())
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), TransportError> {
        Ok(SerialPort::set_timeout(self.as_mut(), timeout)?)
    }

    fn set_request_to_send(&mut self, level: bool) -> Result<(), RtsError> {
        self.write_request_to_send(level)
            .map_err(|e| RtsError::signal(level, SerialLink::name(self), e))
    }

    fn name(&self) -> String {
        SerialPort::name(self.as_ref()).unwrap_or_else(|| "serial port".to_string())
    }
}
