use bytes::{BufMut, BytesMut};
use serialport::SerialPort;
use tokio::sync::Mutex;
use tracing::{debug, trace};

use super::window::ReceiveWindow;
use super::{open_port, read_exact, truncated, SerialLink, SerialOptions, SerialState};
use crate::codec::{
    lrc, verify_lrc, Adu, Pdu, Request, RequestAdu, Response, ResponseAdu, MAX_PDU_SIZE,
};
use crate::config::SerialConfig;
use crate::errors::{FrameErrorKind, ModbusError};
use crate::transport::Transport;

const FRAME_START: u8 = b':';
const FRAME_END: [u8; 2] = *b"\r\n";

/// ':' + hex(unit id + PDU + LRC) + CRLF
const MAX_FRAME_LEN: usize = 1 + (1 + MAX_PDU_SIZE + 1) * 2 + 2;

/// Modbus ASCII transport.
///
/// Frames are delimited by ':' and CRLF, so the same transport serves
/// masters and slaves.
pub struct AsciiTransport<L: SerialLink = Box<dyn SerialPort>> {
    state: Mutex<SerialState<L>>,
    options: SerialOptions,
}

impl AsciiTransport {
    pub fn open(config: &SerialConfig) -> Result<Self, ModbusError> {
        let port = open_port(config)?;
        Ok(Self::new(port, SerialOptions::from(config)))
    }
}

impl<L: SerialLink> AsciiTransport<L> {
    pub fn new(link: L, options: SerialOptions) -> Self {
        Self {
            state: Mutex::new(SerialState::new(link)),
            options,
        }
    }

    pub async fn last_request(&self) -> Vec<u8> {
        self.state.lock().await.last_request.clone()
    }

    /// Reads one frame and returns its unit id and PDU bytes.
    async fn read_frame(&self) -> Result<(u8, Vec<u8>), ModbusError> {
        let mut state = self.state.lock().await;
        let SerialState { link, scratch, .. } = &mut *state;

        scratch.clear();
        {
            let mut window = ReceiveWindow::open(link)?;
            let mut byte = [0u8; 1];

            // Anything before the start character is line noise
            let mut skipped = 0usize;
            loop {
                read_exact(&mut window, &mut byte, "frame start").await?;
                if byte[0] == FRAME_START {
                    break;
                }
                skipped += 1;
                if skipped > MAX_FRAME_LEN {
                    return Err(ModbusError::frame(
                        FrameErrorKind::InvalidHeader,
                        format!("no ':' within {} bytes", skipped),
                        None,
                    ));
                }
            }
            if skipped > 0 {
                debug!("Skipped {} bytes before ASCII frame start", skipped);
            }

            scratch.put_u8(FRAME_START);
            while !scratch.ends_with(&FRAME_END) {
                if scratch.len() >= MAX_FRAME_LEN {
                    return Err(ModbusError::frame(
                        FrameErrorKind::TooLong,
                        format!("ASCII frame exceeds {} characters", MAX_FRAME_LEN),
                        Some(scratch.to_vec()),
                    ));
                }
                if let Err(e) = read_exact(&mut window, &mut byte, "frame body").await {
                    return Err(truncated(e, scratch));
                }
                scratch.put_u8(byte[0]);
            }
        }

        if self.options.trace_frames {
            trace!(
                "{} RX: {}",
                link.name(),
                String::from_utf8_lossy(&scratch[..]).trim_end()
            );
        }

        decode_frame(scratch)
    }
}

/// Encodes a complete ASCII frame.
pub(crate) fn encode_frame<P: Pdu>(message: &Adu<P>) -> Result<BytesMut, ModbusError> {
    let mut body = BytesMut::with_capacity(MAX_PDU_SIZE + 2);
    body.put_u8(message.unit_id);
    message.pdu.encode(&mut body);
    if body.len() - 1 > MAX_PDU_SIZE {
        return Err(ModbusError::frame(
            FrameErrorKind::TooLong,
            format!("PDU of {} bytes exceeds {} byte limit", body.len() - 1, MAX_PDU_SIZE),
            None,
        ));
    }
    let checksum = lrc(&body);
    body.put_u8(checksum);

    let mut frame = BytesMut::with_capacity(body.len() * 2 + 3);
    frame.put_u8(FRAME_START);
    frame.put_slice(hex::encode_upper(&body).as_bytes());
    frame.put_slice(&FRAME_END);
    Ok(frame)
}

/// Decodes ':' + hex + CRLF into unit id and PDU.
pub(crate) fn decode_frame(frame: &[u8]) -> Result<(u8, Vec<u8>), ModbusError> {
    let text = frame
        .strip_prefix(&[FRAME_START])
        .and_then(|rest| rest.strip_suffix(&FRAME_END))
        .ok_or_else(|| {
            ModbusError::frame(
                FrameErrorKind::InvalidHeader,
                "ASCII frame must start with ':' and end with CRLF",
                Some(frame.to_vec()),
            )
        })?;

    // Unit id, function code and LRC at minimum
    if text.len() < 6 {
        return Err(ModbusError::frame(
            FrameErrorKind::TooShort,
            format!("ASCII frame carries {} hex characters", text.len()),
            Some(frame.to_vec()),
        ));
    }

    let bytes = hex::decode(text).map_err(|e| {
        ModbusError::frame(
            FrameErrorKind::InvalidEncoding,
            format!("ASCII frame is not valid hex: {}", e),
            Some(frame.to_vec()),
        )
    })?;
    verify_lrc(&bytes)?;

    Ok((bytes[0], bytes[1..bytes.len() - 1].to_vec()))
}

impl<L: SerialLink> Transport for AsciiTransport<L> {
    async fn write_message<P: Pdu + Sync>(&self, message: &Adu<P>) -> Result<(), ModbusError> {
        let frame = encode_frame(message)?;
        self.state
            .lock()
            .await
            .write_frame(&frame, &self.options)
            .await
    }

    async fn read_response(&self) -> Result<ResponseAdu, ModbusError> {
        let (unit_id, pdu) = self.read_frame().await?;
        Ok(Adu::new(unit_id, Response::decode(&pdu)?))
    }

    async fn read_request(&self) -> Result<RequestAdu, ModbusError> {
        let (unit_id, pdu) = self.read_frame().await?;
        Ok(Adu::new(unit_id, Request::decode(&pdu)?))
    }

    async fn close(&self) -> Result<(), ModbusError> {
        let mut state = self.state.lock().await;
        state.link.clear_input()?;
        state.link.flush().map_err(ModbusError::from)?;
        Ok(())
    }
}
