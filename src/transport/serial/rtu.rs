use bytes::{BufMut, BytesMut};
use serialport::SerialPort;
use tokio::sync::Mutex;
use tracing::trace;

use super::window::ReceiveWindow;
use super::{open_port, read_into, truncated, SerialLink, SerialOptions, SerialState};
use crate::codec::{
    crc16_bytes, verify_crc, Adu, Pdu, RequestAdu, Response, ResponseAdu, MAX_PDU_SIZE,
    MAX_RTU_FRAME_SIZE, MEI_READ_DEVICE_ID,
};
use crate::config::SerialConfig;
use crate::errors::{FrameErrorKind, ModbusError};
use crate::registry::{self, FrameShape};
use crate::transport::Transport;

/// Modbus RTU master transport.
///
/// RTU frames carry no length; the end of a response is inferred from its
/// function code. Requests have no such table here, so this transport only
/// acts as a master.
pub struct RtuTransport<L: SerialLink = Box<dyn SerialPort>> {
    state: Mutex<SerialState<L>>,
    options: SerialOptions,
}

impl RtuTransport {
    pub fn open(config: &SerialConfig) -> Result<Self, ModbusError> {
        let port = open_port(config)?;
        Ok(Self::new(port, SerialOptions::from(config)))
    }
}

impl<L: SerialLink> RtuTransport<L> {
    pub fn new(link: L, options: SerialOptions) -> Self {
        Self {
            state: Mutex::new(SerialState::new(link)),
            options,
        }
    }

    /// The last frame written, CRC included.
    pub async fn last_request(&self) -> Vec<u8> {
        self.state.lock().await.last_request.clone()
    }
}

/// Unit id + PDU + CRC, low byte first.
pub(crate) fn encode_frame<P: Pdu>(message: &Adu<P>) -> Result<BytesMut, ModbusError> {
    let mut frame = BytesMut::with_capacity(MAX_RTU_FRAME_SIZE);
    frame.put_u8(message.unit_id);
    message.pdu.encode(&mut frame);

    if frame.len() - 1 > MAX_PDU_SIZE {
        return Err(ModbusError::frame(
            FrameErrorKind::TooLong,
            format!(
                "PDU of {} bytes exceeds {} byte limit",
                frame.len() - 1,
                MAX_PDU_SIZE
            ),
            None,
        ));
    }

    let crc = crc16_bytes(&frame);
    frame.put_slice(&crc);
    Ok(frame)
}

/// Reads the rest of a response, CRC included, whose unit id and function
/// code are already in `scratch`.
async fn read_remainder<L: SerialLink + ?Sized>(
    window: &mut ReceiveWindow<'_, L>,
    scratch: &mut BytesMut,
    function: u8,
) -> Result<(), ModbusError> {
    match registry::response_shape(function)? {
        FrameShape::Fixed(len) => read_into(window, scratch, len, "payload").await?,
        FrameShape::ByteCount => {
            read_into(window, scratch, 1, "byte count").await?;
            let count = scratch[scratch.len() - 1] as usize;
            check_room(scratch, count)?;
            read_into(window, scratch, count, "payload").await?;
        }
        FrameShape::WordCount => {
            read_into(window, scratch, 2, "byte count").await?;
            let at = scratch.len() - 2;
            let count = u16::from_be_bytes([scratch[at], scratch[at + 1]]) as usize;
            check_room(scratch, count)?;
            read_into(window, scratch, count, "payload").await?;
        }
        FrameShape::DeviceIdentification => {
            read_into(window, scratch, 1, "MEI type").await?;
            let mei_type = scratch[scratch.len() - 1];
            if mei_type != MEI_READ_DEVICE_ID {
                return Err(ModbusError::frame(
                    FrameErrorKind::UnsupportedSubFunction,
                    format!("MEI type 0x{:02X} in RTU response", mei_type),
                    Some(scratch.to_vec()),
                ));
            }

            // Read code, conformity, more follows, next object id, object count
            read_into(window, scratch, 5, "device identification header").await?;
            let objects = scratch[scratch.len() - 1];
            for _ in 0..objects {
                read_into(window, scratch, 2, "object header").await?;
                let len = scratch[scratch.len() - 1] as usize;
                check_room(scratch, len)?;
                read_into(window, scratch, len, "object value").await?;
            }
            if objects == 0 {
                read_into(window, scratch, 1, "error code").await?;
            }
        }
    }

    read_into(window, scratch, 2, "CRC").await
}

/// A frame may not outgrow [`MAX_RTU_FRAME_SIZE`] once its CRC is added.
fn check_room(scratch: &BytesMut, more: usize) -> Result<(), ModbusError> {
    if scratch.len() + more + 2 > MAX_RTU_FRAME_SIZE {
        return Err(ModbusError::frame(
            FrameErrorKind::TooLong,
            format!(
                "declared length would grow the RTU frame to {} bytes",
                scratch.len() + more + 2
            ),
            Some(scratch.to_vec()),
        ));
    }
    Ok(())
}

impl<L: SerialLink> Transport for RtuTransport<L> {
    async fn write_message<P: Pdu + Sync>(&self, message: &Adu<P>) -> Result<(), ModbusError> {
        let frame = encode_frame(message)?;
        self.state
            .lock()
            .await
            .write_frame(&frame, &self.options)
            .await
    }

    async fn read_response(&self) -> Result<ResponseAdu, ModbusError> {
        let mut state = self.state.lock().await;
        let SerialState { link, scratch, .. } = &mut *state;

        scratch.clear();
        {
            let mut window = ReceiveWindow::open(link)?;
            read_into(&mut window, scratch, 2, "unit id and function code").await?;
            let function = scratch[1];
            if let Err(e) = read_remainder(&mut window, scratch, function).await {
                return Err(truncated(e, scratch));
            }
        }

        if self.options.trace_frames {
            trace!("{} RX: {} bytes: {:02X?}", link.name(), scratch.len(), &scratch[..]);
        }

        verify_crc(scratch)?;

        let unit_id = scratch[0];
        let response = Response::decode(&scratch[1..scratch.len() - 2])?;
        Ok(Adu::new(unit_id, response))
    }

    async fn read_request(&self) -> Result<RequestAdu, ModbusError> {
        Err(ModbusError::operation_unsupported("RTU read_request"))
    }

    async fn close(&self) -> Result<(), ModbusError> {
        let mut state = self.state.lock().await;
        state.link.clear_input()?;
        state.link.flush().map_err(ModbusError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{crc16_bytes, CommEventLog, ExceptionCode, Request};
    use crate::errors::{FrameError, TransportError};
    use crate::transport::serial::mock::ScriptedLink;

    fn with_crc(body: &[u8]) -> Vec<u8> {
        let mut frame = body.to_vec();
        frame.extend_from_slice(&crc16_bytes(body));
        frame
    }

    fn read_registers() -> Adu<Request> {
        Adu::new(
            1,
            Request::ReadHoldingRegisters {
                address: 0,
                quantity: 2,
            },
        )
    }

    #[tokio::test]
    async fn test_read_holding_registers_end_to_end() {
        let (link, handle) = ScriptedLink::new();
        handle.reply(&with_crc(&[0x01, 0x03, 0x04, 0x00, 0x0A, 0x00, 0x14]));
        let transport = RtuTransport::new(link.chunked(3), SerialOptions::default());

        transport.write_message(&read_registers()).await.unwrap();
        assert_eq!(
            handle.written(),
            vec![0x01, 0x03, 0x00, 0x00, 0x00, 0x02, 0xC4, 0x0B]
        );
        assert_eq!(transport.last_request().await, handle.written());

        let response = transport.read_response().await.unwrap();
        assert_eq!(response.unit_id, 1);
        assert_eq!(response.pdu, Response::ReadHoldingRegisters(vec![10, 20]));
    }

    #[tokio::test]
    async fn test_frame_length_is_inferred_exactly() {
        let (link, handle) = ScriptedLink::new();
        // Write single register echo followed by unrelated trailing bytes
        let mut reply = with_crc(&[0x01, 0x06, 0x00, 0x01, 0x00, 0x03]);
        reply.extend_from_slice(&[0xEE, 0xEE]);
        handle.reply(&reply);
        let transport = RtuTransport::new(link, SerialOptions::default());

        let request = Adu::new(
            1,
            Request::WriteSingleRegister {
                address: 1,
                value: 3,
            },
        );
        transport.write_message(&request).await.unwrap();
        let response = transport.read_response().await.unwrap();
        assert_eq!(
            response.pdu,
            Response::WriteSingleRegister {
                address: 1,
                value: 3
            }
        );
        assert_eq!(handle.pending_input(), 2);
    }

    #[tokio::test]
    async fn test_exception_response() {
        let (link, handle) = ScriptedLink::new();
        handle.reply(&with_crc(&[0x01, 0x83, 0x02]));
        let transport = RtuTransport::new(link, SerialOptions::default());

        transport.write_message(&read_registers()).await.unwrap();
        let response = transport.read_response().await.unwrap();
        assert_eq!(
            response.pdu,
            Response::Exception {
                function: 0x03,
                code: ExceptionCode::IllegalDataAddress
            }
        );
    }

    #[tokio::test]
    async fn test_crc_mismatch_on_either_byte() {
        for corrupt in [7usize, 8] {
            let (link, handle) = ScriptedLink::new();
            let mut reply = with_crc(&[0x01, 0x03, 0x04, 0x00, 0x0A, 0x00, 0x14]);
            reply[corrupt] ^= 0x01;
            handle.reply(&reply);
            let transport = RtuTransport::new(link, SerialOptions::default());

            transport.write_message(&read_registers()).await.unwrap();
            match transport.read_response().await {
                Err(ModbusError::Frame(FrameError::Crc { length, .. })) => assert_eq!(length, 7),
                other => panic!("Unexpected result: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_device_identification_framing() {
        let (link, handle) = ScriptedLink::new();
        handle.reply(&with_crc(&[
            0x01, 0x2B, 0x0E, 0x01, 0x01, 0x00, 0x00, 0x02, 0x00, 0x02, b'A', b'B', 0x01, 0x01,
            b'C',
        ]));
        let transport = RtuTransport::new(link, SerialOptions::default());

        let request = Adu::new(
            1,
            Request::ReadDeviceIdentification {
                read_code: 1,
                object_id: 0,
            },
        );
        transport.write_message(&request).await.unwrap();
        match transport.read_response().await.unwrap().pdu {
            Response::ReadDeviceIdentification(id) => {
                assert_eq!(id.objects.len(), 2);
                assert_eq!(id.object(0x00).unwrap().as_str(), "AB");
            }
            other => panic!("Unexpected response: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fifo_uses_two_byte_count() {
        let (link, handle) = ScriptedLink::new();
        handle.reply(&with_crc(&[
            0x01, 0x18, 0x00, 0x06, 0x00, 0x02, 0x01, 0xB8, 0x12, 0x84,
        ]));
        let transport = RtuTransport::new(link, SerialOptions::default());

        transport
            .write_message(&Adu::new(1, Request::ReadFifoQueue { address: 0x04DE }))
            .await
            .unwrap();
        assert_eq!(
            transport.read_response().await.unwrap().pdu,
            Response::ReadFifoQueue(vec![0x01B8, 0x1284])
        );
    }

    #[tokio::test]
    async fn test_diagnostics_echo_is_four_bytes() {
        let (link, handle) = ScriptedLink::new();
        handle.reply(&with_crc(&[0x01, 0x08, 0x00, 0x00, 0xA5, 0x37]));
        let transport = RtuTransport::new(link, SerialOptions::default());

        let request = Request::Diagnostics {
            sub_function: 0x0000,
            data: 0xA537,
        };
        transport.write_message(&Adu::new(1, request)).await.unwrap();
        assert_eq!(
            transport.read_response().await.unwrap().pdu,
            Response::Diagnostics {
                sub_function: 0x0000,
                data: 0xA537
            }
        );
    }

    #[tokio::test]
    async fn test_event_log_uses_byte_count() {
        let (link, handle) = ScriptedLink::new();
        handle.reply(&with_crc(&[
            0x01, 0x0C, 0x08, 0x00, 0x00, 0x01, 0x08, 0x01, 0x21, 0x20, 0x00,
        ]));
        let transport = RtuTransport::new(link, SerialOptions::default());

        transport
            .write_message(&Adu::new(1, Request::GetCommEventLog))
            .await
            .unwrap();
        assert_eq!(
            transport.read_response().await.unwrap().pdu,
            Response::GetCommEventLog(CommEventLog {
                status: 0x0000,
                event_count: 0x0108,
                message_count: 0x0121,
                events: vec![0x20, 0x00],
            })
        );
    }

    #[tokio::test]
    async fn test_silence_is_no_response() {
        let (link, _handle) = ScriptedLink::new();
        let transport = RtuTransport::new(link, SerialOptions::default());

        transport.write_message(&read_registers()).await.unwrap();
        let err = transport.read_response().await.unwrap_err();
        assert!(
            matches!(err, ModbusError::Transport(TransportError::NoResponse { .. })),
            "{}",
            err
        );
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_silence_mid_frame_is_truncated() {
        let (link, handle) = ScriptedLink::new();
        handle.reply(&[0x01, 0x03, 0x04, 0x00, 0x0A]);
        let transport = RtuTransport::new(link, SerialOptions::default());

        transport.write_message(&read_registers()).await.unwrap();
        match transport.read_response().await {
            Err(ModbusError::Frame(err)) => {
                assert_eq!(err.frame_data(), Some(&[0x01, 0x03, 0x04, 0x00, 0x0A][..]))
            }
            other => panic!("Unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_function_in_response() {
        let (link, handle) = ScriptedLink::new();
        handle.reply(&[0x01, 0x42, 0x00, 0x00]);
        let transport = RtuTransport::new(link, SerialOptions::default());

        transport.write_message(&read_registers()).await.unwrap();
        assert!(matches!(
            transport.read_response().await,
            Err(ModbusError::UnsupportedFunction { function: 0x42 })
        ));
    }

    #[tokio::test]
    async fn test_master_only() {
        let (link, _handle) = ScriptedLink::new();
        let transport = RtuTransport::new(link, SerialOptions::default());
        assert!(matches!(
            transport.read_request().await,
            Err(ModbusError::OperationUnsupported { .. })
        ));
    }
}
