use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};

use tokio::net::{ToSocketAddrs, UdpSocket};
use tokio::sync::Mutex;
use tracing::{debug, trace};

use super::{mbap, Transport};
use crate::codec::{
    Adu, Pdu, Request, RequestAdu, Response, ResponseAdu, MAX_PDU_SIZE, MBAP_HEADER_SIZE,
};
use crate::errors::{FrameErrorKind, IoOperation, ModbusError, TransportError};

const MAX_DATAGRAM: usize = MBAP_HEADER_SIZE + MAX_PDU_SIZE;

/// Modbus over UDP: one MBAP frame per datagram.
///
/// A master transport is connected to one slave. A slave transport is bound
/// to a local address and answers whichever peer sent the last request.
pub struct UdpTransport {
    socket: UdpSocket,
    peer: Mutex<Option<SocketAddr>>,
    /// Receive buffer, one byte larger than any valid frame so oversized
    /// datagrams are detected instead of silently truncated.
    buffer: Mutex<Vec<u8>>,
    transaction_id: AtomicU16,
    trace_frames: bool,
}

impl UdpTransport {
    /// Master side: talks to `remote` only.
    pub async fn connect(remote: SocketAddr, trace_frames: bool) -> Result<Self, ModbusError> {
        let local: SocketAddr = if remote.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local)
            .await
            .map_err(|e| TransportError::io(IoOperation::Bind, "UDP bind", e))?;
        socket
            .connect(remote)
            .await
            .map_err(|e| TransportError::io(IoOperation::Connect, "UDP connect", e))?;

        debug!("UDP transport connected to {}", remote);
        Ok(Self::new(socket, Some(remote), trace_frames))
    }

    /// Slave side: receives requests on `addr`.
    pub async fn bind(addr: impl ToSocketAddrs, trace_frames: bool) -> Result<Self, ModbusError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| TransportError::io(IoOperation::Bind, "UDP bind", e))?;
        Ok(Self::new(socket, None, trace_frames))
    }

    fn new(socket: UdpSocket, peer: Option<SocketAddr>, trace_frames: bool) -> Self {
        Self {
            socket,
            peer: Mutex::new(peer),
            buffer: Mutex::new(vec![0u8; MAX_DATAGRAM + 1]),
            transaction_id: AtomicU16::new(1),
            trace_frames,
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ModbusError> {
        self.socket
            .local_addr()
            .map_err(|e| TransportError::io(IoOperation::Address, "UDP local address", e).into())
    }

    /// Peer the next message is sent to.
    pub async fn peer_addr(&self) -> Option<SocketAddr> {
        *self.peer.lock().await
    }

    /// Receives one datagram and hands its header and PDU to `decode`.
    async fn read_datagram<T>(
        &self,
        decode: impl FnOnce(&[u8]) -> Result<T, ModbusError>,
    ) -> Result<Adu<T>, ModbusError> {
        let mut buffer = self.buffer.lock().await;
        let (len, from) = self
            .socket
            .recv_from(&mut buffer)
            .await
            .map_err(|e| TransportError::read("UDP socket", e))?;
        let datagram = &buffer[..len];

        if self.trace_frames {
            trace!("UDP RX from {}: {:02X?}", from, datagram);
        }

        if len > MAX_DATAGRAM {
            return Err(ModbusError::frame(
                FrameErrorKind::TooLong,
                format!("datagram of at least {} bytes from {}", len, from),
                None,
            ));
        }

        let (header, pdu) = mbap::decode_frame(datagram)?;
        let message = Adu::new(header.unit_id, decode(pdu)?).with_header(header.header);
        *self.peer.lock().await = Some(from);

        Ok(message)
    }
}

impl Transport for UdpTransport {
    async fn write_message<P: Pdu + Sync>(&self, message: &Adu<P>) -> Result<(), ModbusError> {
        let frame = mbap::encode(message)?;
        let peer = self.peer.lock().await.ok_or_else(|| {
            TransportError::io(
                IoOperation::Write,
                "UDP message without a peer",
                std::io::Error::new(std::io::ErrorKind::NotConnected, "no peer address known"),
            )
        })?;

        if self.trace_frames {
            trace!("UDP TX to {}: {:02X?}", peer, &frame[..]);
        }

        self.socket
            .send_to(&frame, peer)
            .await
            .map_err(|e| {
                TransportError::io(IoOperation::Write, format!("UDP datagram to {}", peer), e)
            })?;
        Ok(())
    }

    async fn read_response(&self) -> Result<ResponseAdu, ModbusError> {
        self.read_datagram(Response::decode).await
    }

    async fn read_request(&self) -> Result<RequestAdu, ModbusError> {
        self.read_datagram(Request::decode).await
    }

    async fn close(&self) -> Result<(), ModbusError> {
        self.peer.lock().await.take();
        Ok(())
    }

    fn next_transaction_id(&self) -> Option<u16> {
        Some(self.transaction_id.fetch_add(1, Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::MbapHeader;

    #[tokio::test]
    async fn test_master_and_slave_exchange() {
        let slave = UdpTransport::bind("127.0.0.1:0", false).await.unwrap();
        let slave_addr = slave.local_addr().unwrap();
        let master = UdpTransport::connect(slave_addr, true).await.unwrap();

        let request = Adu::new(
            3,
            Request::ReadInputRegisters {
                address: 8,
                quantity: 1,
            },
        )
        .with_header(MbapHeader::new(0x1234));
        master.write_message(&request).await.unwrap();

        let received = slave.read_request().await.unwrap();
        assert_eq!(received, request);
        assert_eq!(
            slave.peer_addr().await.map(|addr| addr.port()),
            Some(master.local_addr().unwrap().port())
        );

        slave
            .write_message(&received.reply(Response::ReadInputRegisters(vec![0x0102])))
            .await
            .unwrap();
        let response = master.read_response().await.unwrap();
        assert_eq!(response.transaction_id(), Some(0x1234));
        assert_eq!(response.pdu, Response::ReadInputRegisters(vec![0x0102]));
    }

    #[tokio::test]
    async fn test_truncated_datagram_is_malformed() {
        let slave = UdpTransport::bind("127.0.0.1:0", false).await.unwrap();
        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender
            .send_to(
                &[0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x03],
                slave.local_addr().unwrap(),
            )
            .await
            .unwrap();

        let err = slave.read_request().await.unwrap_err();
        assert!(matches!(err, ModbusError::Frame(_)), "{}", err);
        // Malformed datagrams do not become the reply target
        assert_eq!(slave.peer_addr().await, None);
    }

    #[tokio::test]
    async fn test_unbound_slave_cannot_write() {
        let slave = UdpTransport::bind("127.0.0.1:0", false).await.unwrap();
        let message = Adu::new(1, Response::ReadExceptionStatus(0));
        assert!(slave.write_message(&message).await.is_err());
    }
}
