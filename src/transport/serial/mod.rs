//! RTU and ASCII framing over a serial line.
//!
//! Both encodings share the half-duplex exchange: drain stale input, drive
//! RTS for RS-485 adapters, write the frame, discard the echo when the bus
//! hears its own transmission, then read the answer under a
//! [`window::ReceiveWindow`].

mod ascii;
mod line;
mod link;
#[cfg(test)]
pub(crate) mod mock;
mod rtu;
mod window;

use std::time::{Duration, Instant};

use bytes::BytesMut;
use serialport::SerialPort;
use tracing::{info, trace};

use crate::config::{RtsType, SerialConfig};
use crate::errors::{
    FrameError, FrameErrorKind, FrameSizeKind, IoOperation, ModbusError, SerialErrorKind,
    TransportError,
};

pub use ascii::AsciiTransport;
pub use line::SerialTransport;
pub use link::SerialLink;
pub use rtu::RtuTransport;
pub use window::DEFAULT_RECEIVE_TIMEOUT;

use window::ReceiveWindow;

/// Consecutive reads without data before a frame read gives up.
pub const MAX_EMPTY_READS: u8 = 5;

/// Line settings the transports apply around each exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialOptions {
    pub echo: bool,
    pub rts_type: RtsType,
    pub rts_delay: Duration,
    pub trace_frames: bool,
}

impl Default for SerialOptions {
    fn default() -> Self {
        Self {
            echo: false,
            rts_type: RtsType::None,
            rts_delay: Duration::ZERO,
            trace_frames: false,
        }
    }
}

impl From<&SerialConfig> for SerialOptions {
    fn from(config: &SerialConfig) -> Self {
        Self {
            echo: config.echo,
            rts_type: config.rts_type,
            rts_delay: Duration::from_micros(config.rts_delay_us),
            trace_frames: config.trace_frames,
        }
    }
}

/// Opens and configures the port described by `config`.
pub fn open_port(config: &SerialConfig) -> Result<Box<dyn SerialPort>, TransportError> {
    info!(
        character_time = ?config.character_time(),
        "Opening serial port {}",
        config.serial_port_info()
    );

    serialport::new(&config.device, config.baud_rate)
        .data_bits(config.data_bits.into())
        .parity(config.parity.into())
        .stop_bits(config.stop_bits.into())
        .timeout(config.serial_timeout)
        .flow_control(serialport::FlowControl::None)
        .open()
        .map_err(|e| TransportError::Serial {
            kind: SerialErrorKind::OpenFailed,
            port: config.device.clone(),
            details: e.description.clone(),
            source: Some(e),
        })
}

/// Everything guarded by a serial transport's lock.
pub(crate) struct SerialState<L> {
    pub link: L,
    pub scratch: BytesMut,
    /// Last frame written, kept for diagnostics
    pub last_request: Vec<u8>,
}

impl<L: SerialLink> SerialState<L> {
    pub fn new(link: L) -> Self {
        Self {
            link,
            scratch: BytesMut::with_capacity(crate::codec::MAX_RTU_FRAME_SIZE * 2 + 3),
            last_request: Vec::new(),
        }
    }

    /// Sends one complete frame.
    pub async fn write_frame(
        &mut self,
        frame: &[u8],
        options: &SerialOptions,
    ) -> Result<(), ModbusError> {
        self.link.clear_input()?;

        if options.trace_frames {
            trace!("{} TX: {} bytes: {:02X?}", self.link.name(), frame.len(), frame);
        }

        if options.rts_type.is_enabled() {
            self.link
                .set_request_to_send(options.rts_type.to_signal_level(true))?;
            if !options.rts_delay.is_zero() {
                tokio::time::sleep(options.rts_delay).await;
            }
        }

        self.link
            .write_all(frame)
            .map_err(|e| TransportError::io(IoOperation::Write, "serial frame", e))?;
        self.link
            .flush()
            .map_err(|e| TransportError::io(IoOperation::Flush, "serial frame", e))?;

        if options.rts_type.is_enabled() {
            self.link
                .set_request_to_send(options.rts_type.to_signal_level(false))?;
            if !options.rts_delay.is_zero() {
                tokio::time::sleep(options.rts_delay).await;
            }
        }

        if options.echo {
            let mut echo = vec![0u8; frame.len()];
            let mut window = ReceiveWindow::open(&mut self.link)?;
            read_exact(&mut window, &mut echo, "echo").await?;
            if options.trace_frames {
                trace!("Discarded {} echo bytes", echo.len());
            }
        }

        self.last_request.clear();
        self.last_request.extend_from_slice(frame);
        Ok(())
    }
}

/// Reads exactly `buf.len()` bytes.
///
/// Gives up after [`MAX_EMPTY_READS`] consecutive reads return nothing,
/// yielding to the runtime between them: with no data at all the peer did
/// not answer, with some data the frame is truncated.
pub(crate) async fn read_exact<L: SerialLink + ?Sized>(
    window: &mut ReceiveWindow<'_, L>,
    buf: &mut [u8],
    field: &str,
) -> Result<(), ModbusError> {
    window.expect(buf.len())?;

    let started = Instant::now();
    let mut filled = 0;
    let mut empty_reads = 0u8;

    while filled < buf.len() {
        match window.read(&mut buf[filled..]) {
            Ok(0) => empty_reads += 1,
            Ok(n) => {
                filled += n;
                empty_reads = 0;
                continue;
            }
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::TimedOut
                        | std::io::ErrorKind::WouldBlock
                        | std::io::ErrorKind::Interrupted
                ) =>
            {
                empty_reads += 1
            }
            Err(e) => return Err(TransportError::io(IoOperation::Read, field.to_string(), e).into()),
        }

        if empty_reads >= MAX_EMPTY_READS {
            if filled == 0 {
                return Err(TransportError::NoResponse {
                    attempts: empty_reads,
                    elapsed: started.elapsed(),
                }
                .into());
            }
            return Err(ModbusError::frame(
                FrameErrorKind::TooShort,
                format!("{}: got {} of {} bytes", field, filled, buf.len()),
                Some(buf[..filled].to_vec()),
            ));
        }
        tokio::task::yield_now().await;
    }

    Ok(())
}

/// Turns silence after the first bytes of a frame into a truncated-frame
/// error carrying what arrived.
pub(crate) fn truncated(err: ModbusError, partial: &[u8]) -> ModbusError {
    match err {
        ModbusError::Transport(TransportError::NoResponse { .. })
        | ModbusError::Frame(FrameError::Size {
            kind: FrameSizeKind::TooShort,
            ..
        }) => ModbusError::frame(
            FrameErrorKind::TooShort,
            format!("frame ended after {} bytes", partial.len()),
            Some(partial.to_vec()),
        ),
        other => other,
    }
}

/// Appends exactly `count` bytes to `scratch`.
pub(crate) async fn read_into<L: SerialLink + ?Sized>(
    window: &mut ReceiveWindow<'_, L>,
    scratch: &mut BytesMut,
    count: usize,
    field: &str,
) -> Result<(), ModbusError> {
    let start = scratch.len();
    scratch.resize(start + count, 0);
    if let Err(e) = read_exact(window, &mut scratch[start..], field).await {
        let received = match &e {
            ModbusError::Frame(err) => err.frame_data().map_or(0, <[u8]>::len),
            _ => 0,
        };
        scratch.truncate(start + received);
        return Err(e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mock::ScriptedLink;

    #[tokio::test]
    async fn test_write_frame_drains_and_drives_rts() {
        let (link, handle) = ScriptedLink::new();
        handle.inject(&[0xDE, 0xAD]);
        let mut state = SerialState::new(link);

        let options = SerialOptions {
            rts_type: RtsType::Down,
            ..Default::default()
        };
        state.write_frame(&[0x01, 0x02, 0x03], &options).await.unwrap();

        assert_eq!(handle.clears(), 1);
        assert_eq!(handle.pending_input(), 0);
        assert_eq!(handle.written(), vec![0x01, 0x02, 0x03]);
        // Down: LOW while transmitting, HIGH to receive
        assert_eq!(handle.rts(), vec![false, true]);
        assert_eq!(state.last_request, vec![0x01, 0x02, 0x03]);
    }

    #[tokio::test]
    async fn test_echo_is_discarded() {
        let (link, handle) = ScriptedLink::new();
        let link = link.echo();
        handle.reply(&[0xAA]);
        let mut state = SerialState::new(link);

        let options = SerialOptions {
            echo: true,
            ..Default::default()
        };
        state.write_frame(&[0x01, 0x02], &options).await.unwrap();

        // Only the reply is left
        assert_eq!(handle.pending_input(), 1);
    }

    #[tokio::test]
    async fn test_read_exact_limits() {
        let (mut link, handle) = ScriptedLink::new();
        let mut window = ReceiveWindow::open(&mut link).unwrap();
        let mut buf = [0u8; 4];
        let err = read_exact(&mut window, &mut buf, "response").await.unwrap_err();
        assert!(
            matches!(
                err,
                ModbusError::Transport(TransportError::NoResponse { attempts: 5, .. })
            ),
            "{}",
            err
        );

        handle.inject(&[0x01, 0x02]);
        let err = read_exact(&mut window, &mut buf, "response").await.unwrap_err();
        assert!(matches!(err, ModbusError::Frame(_)), "{}", err);
    }

    #[tokio::test]
    async fn test_read_exact_collects_chunks() {
        let (link, handle) = ScriptedLink::new();
        let mut link = link.chunked(1);
        handle.inject(&[0x01, 0x02, 0x03]);

        let mut window = ReceiveWindow::open(&mut link).unwrap();
        let mut buf = [0u8; 3];
        read_exact(&mut window, &mut buf, "response").await.unwrap();
        assert_eq!(buf, [0x01, 0x02, 0x03]);
    }
}
