use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::Mutex;
use tracing::{debug, trace};

use super::{mbap, Transport};
use crate::codec::{Adu, Pdu, Request, RequestAdu, Response, ResponseAdu, MBAP_HEADER_SIZE};
use crate::errors::{IoOperation, ModbusError, TransportError};

struct ReadState {
    stream: OwnedReadHalf,
    /// Bytes received but not yet consumed; survives a cancelled read.
    buffer: BytesMut,
}

impl ReadState {
    async fn fill(&mut self, needed: usize) -> Result<(), ModbusError> {
        while self.buffer.len() < needed {
            let read = self
                .stream
                .read_buf(&mut self.buffer)
                .await
                .map_err(|e| TransportError::read("TCP stream", e))?;
            if read == 0 {
                return Err(TransportError::Closed.into());
            }
        }
        Ok(())
    }

    /// Reads one MBAP frame, returning its header and PDU bytes.
    async fn read_frame(&mut self) -> Result<(mbap::FrameHeader, BytesMut), ModbusError> {
        self.fill(MBAP_HEADER_SIZE).await?;
        let header = match mbap::decode_header(&self.buffer) {
            Ok(header) => header,
            Err(e) => {
                // Without a trustworthy length the stream cannot be re-synchronised
                self.buffer.clear();
                return Err(e);
            }
        };

        self.fill(header.frame_len()).await?;
        let mut frame = self.buffer.split_to(header.frame_len());
        let pdu = frame.split_off(MBAP_HEADER_SIZE);
        Ok((header, pdu))
    }
}

/// Modbus TCP over one connected stream.
pub struct TcpTransport {
    reader: Mutex<ReadState>,
    writer: Mutex<OwnedWriteHalf>,
    peer_addr: SocketAddr,
    transaction_id: AtomicU16,
    trace_frames: bool,
}

impl TcpTransport {
    /// Connects to a slave.
    pub async fn connect(addr: impl ToSocketAddrs, trace_frames: bool) -> Result<Self, ModbusError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| TransportError::io(IoOperation::Connect, "TCP connect", e))?;
        Self::from_stream(stream, trace_frames)
    }

    /// Wraps an established stream, e.g. one accepted by a listener.
    pub fn from_stream(stream: TcpStream, trace_frames: bool) -> Result<Self, ModbusError> {
        let peer_addr = stream
            .peer_addr()
            .map_err(|e| TransportError::io(IoOperation::Address, "TCP peer address", e))?;
        stream
            .set_nodelay(true)
            .map_err(|e| TransportError::io(IoOperation::Configure, "TCP_NODELAY", e))?;

        let (read_half, write_half) = stream.into_split();
        debug!("TCP transport ready for {}", peer_addr);

        Ok(Self {
            reader: Mutex::new(ReadState {
                stream: read_half,
                buffer: BytesMut::with_capacity(2 * (MBAP_HEADER_SIZE + 256)),
            }),
            writer: Mutex::new(write_half),
            peer_addr,
            transaction_id: AtomicU16::new(1),
            trace_frames,
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }
}

impl Transport for TcpTransport {
    async fn write_message<P: Pdu + Sync>(&self, message: &Adu<P>) -> Result<(), ModbusError> {
        let frame = mbap::encode(message)?;
        if self.trace_frames {
            trace!("TCP TX to {}: {:02X?}", self.peer_addr, &frame[..]);
        }

        let mut writer = self.writer.lock().await;
        writer
            .write_all(&frame)
            .await
            .map_err(|e| TransportError::io(IoOperation::Write, "TCP frame", e))?;
        writer
            .flush()
            .await
            .map_err(|e| TransportError::io(IoOperation::Flush, "TCP frame", e))?;
        Ok(())
    }

    async fn read_response(&self) -> Result<ResponseAdu, ModbusError> {
        let (header, pdu) = self.reader.lock().await.read_frame().await?;
        if self.trace_frames {
            trace!(
                "TCP RX from {}: tid={} unit={} pdu={:02X?}",
                self.peer_addr,
                header.header.transaction_id,
                header.unit_id,
                &pdu[..]
            );
        }

        Ok(Adu::new(header.unit_id, Response::decode(&pdu)?).with_header(header.header))
    }

    async fn read_request(&self) -> Result<RequestAdu, ModbusError> {
        let (header, pdu) = self.reader.lock().await.read_frame().await?;
        if self.trace_frames {
            trace!(
                "TCP RX from {}: tid={} unit={} pdu={:02X?}",
                self.peer_addr,
                header.header.transaction_id,
                header.unit_id,
                &pdu[..]
            );
        }

        Ok(Adu::new(header.unit_id, Request::decode(&pdu)?).with_header(header.header))
    }

    async fn close(&self) -> Result<(), ModbusError> {
        let mut writer = self.writer.lock().await;
        writer
            .shutdown()
            .await
            .map_err(|e| TransportError::io(IoOperation::Shutdown, "TCP shutdown", e))?;
        debug!("TCP transport to {} closed", self.peer_addr);
        Ok(())
    }

    fn next_transaction_id(&self) -> Option<u16> {
        Some(self.transaction_id.fetch_add(1, Ordering::Relaxed))
    }
}
