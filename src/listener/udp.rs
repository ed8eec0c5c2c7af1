use std::net::SocketAddr;

use tokio::sync::watch;
use tracing::info;

use super::{serve, ServeOptions};
use crate::config::UdpConfig;
use crate::errors::ModbusError;
use crate::image::ProcessImageSource;
use crate::transport::UdpTransport;

/// Modbus UDP slave: one serving loop on one socket.
///
/// Undecodable datagrams are logged and skipped; each answer goes to the
/// sender of the request it answers.
pub struct UdpListener<S> {
    transport: UdpTransport,
    source: S,
    stop: watch::Sender<bool>,
}

impl<S: ProcessImageSource> UdpListener<S> {
    pub async fn bind(config: &UdpConfig, source: S, trace_frames: bool) -> Result<Self, ModbusError> {
        let transport = UdpTransport::bind(config.address(), trace_frames).await?;
        let (stop, _) = watch::channel(false);
        Ok(Self {
            transport,
            source,
            stop,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ModbusError> {
        self.transport.local_addr()
    }

    /// Answers requests until [`stop`](Self::stop) is called.
    pub async fn run(&self) -> Result<(), ModbusError> {
        info!("Listening on udp://{}", self.local_addr()?);
        let result = serve(
            &self.transport,
            &self.source,
            self.stop.subscribe(),
            ServeOptions::default(),
        )
        .await;
        info!("UDP listener stopped");
        result
    }

    pub fn stop(&self) {
        self.stop.send_replace(true);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::net::UdpSocket;

    use super::*;
    use crate::codec::{Request, Response};
    use crate::config::TransactionConfig;
    use crate::image::{MemoryImage, ProcessImage};
    use crate::transaction::Transaction;

    #[tokio::test]
    async fn test_serves_requests_and_skips_garbage() {
        let image = MemoryImage::new(0, 0, 0, 4);
        image.set_input_registers(0, &[7, 8, 9, 10]).unwrap();
        let source: Arc<dyn ProcessImage> = Arc::new(image);

        let config = UdpConfig {
            bind_addr: "127.0.0.1".to_string(),
            bind_port: 0,
        };
        let listener = Arc::new(UdpListener::bind(&config, source, false).await.unwrap());
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn({
            let listener = Arc::clone(&listener);
            async move { listener.run().await }
        });

        let noise = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        noise.send_to(&[0xDE, 0xAD], addr).await.unwrap();

        let transport = UdpTransport::connect(addr, false).await.unwrap();
        let transaction = Transaction::new(
            &transport,
            TransactionConfig {
                response_timeout: Duration::from_secs(1),
                ..Default::default()
            },
        );
        let response = transaction
            .execute(
                1,
                &Request::ReadInputRegisters {
                    address: 1,
                    quantity: 3,
                },
            )
            .await
            .unwrap();
        assert_eq!(response.pdu, Response::ReadInputRegisters(vec![8, 9, 10]));

        listener.stop();
        tokio::time::timeout(Duration::from_secs(2), server)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
