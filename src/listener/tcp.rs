use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::net::{self, TcpStream};
use tokio::sync::{watch, Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, Instrument};

use super::{serve, ServeOptions};
use crate::config::TcpConfig;
use crate::errors::{IoOperation, ModbusError, TransportError};
use crate::image::ProcessImageSource;
use crate::transport::{TcpTransport, Transport};
use crate::utils::generate_connection_id;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Modbus TCP slave.
///
/// Every accepted connection gets its own task running [`serve`]; at most
/// `max_connections` run at once, later clients wait in the accept queue.
pub struct TcpListener<S> {
    listener: net::TcpListener,
    source: Arc<S>,
    idle_timeout: Duration,
    trace_frames: bool,
    connections: Arc<Semaphore>,
    max_connections: usize,
    stop: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<S: ProcessImageSource> TcpListener<S> {
    pub async fn bind(config: &TcpConfig, source: S, trace_frames: bool) -> Result<Self, ModbusError> {
        let addr = config.address();
        let listener = net::TcpListener::bind(&addr).await.map_err(|e| {
            TransportError::io(
                IoOperation::Bind,
                format!("Failed to bind to address {}", addr),
                e,
            )
        })?;

        let max_connections = config.max_connections.max(1);
        let (stop, _) = watch::channel(false);

        Ok(Self {
            listener,
            source: Arc::new(source),
            idle_timeout: config.idle_timeout,
            trace_frames,
            connections: Arc::new(Semaphore::new(max_connections)),
            max_connections,
            stop,
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ModbusError> {
        self.listener.local_addr().map_err(|e| {
            TransportError::io(IoOperation::Address, "TCP listener address", e).into()
        })
    }

    pub fn active_connections(&self) -> usize {
        self.max_connections - self.connections.available_permits()
    }

    /// Accepts connections until [`stop`](Self::stop) is called.
    pub async fn run(&self) -> Result<(), ModbusError> {
        info!("Listening on {}", self.local_addr()?);
        let mut stop = self.stop.subscribe();

        loop {
            if *stop.borrow_and_update() {
                break;
            }

            let permit = tokio::select! {
                permit = Arc::clone(&self.connections).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                _ = stop.changed() => continue,
            };

            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => self.spawn_connection(stream, peer, permit).await,
                    Err(e) => {
                        error!("Accept error: {}", e);
                        sleep(Duration::from_millis(100)).await;
                    }
                },
                _ = stop.changed() => {}
            }
        }

        info!("TCP listener stopped accepting");
        Ok(())
    }

    async fn spawn_connection(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
        permit: OwnedSemaphorePermit,
    ) {
        let source = Arc::clone(&self.source);
        let stop = self.stop.subscribe();
        let trace_frames = self.trace_frames;
        let options = ServeOptions {
            idle_timeout: Some(self.idle_timeout),
            drop_on_malformed: true,
        };

        let span = tracing::info_span!(
            "tcp_connection",
            %peer,
            connection_id = %generate_connection_id(),
            protocol = "modbus_tcp"
        );

        let task = tokio::spawn(
            async move {
                let _permit = permit;
                let transport = match TcpTransport::from_stream(stream, trace_frames) {
                    Ok(transport) => transport,
                    Err(e) => {
                        error!("Failed to set up connection: {}", e);
                        return;
                    }
                };

                info!("Client connected");
                if let Err(e) = serve(&transport, &*source, stop, options).await {
                    error!("Connection error: {}", e);
                }
                if let Err(e) = transport.close().await {
                    debug!("Error closing connection: {}", e);
                }
                info!("Client disconnected");
            }
            .instrument(span),
        );

        let mut tasks = self.tasks.lock().await;
        tasks.retain(|task| !task.is_finished());
        tasks.push(task);
    }

    /// Stops accepting, ends every connection loop and waits for them.
    pub async fn stop(&self) {
        info!("Stopping TCP listener");
        self.stop.send_replace(true);

        let tasks = {
            let mut tasks = self.tasks.lock().await;
            tasks.drain(..).collect::<Vec<_>>()
        };

        match timeout(SHUTDOWN_TIMEOUT, join_all(tasks)).await {
            Ok(results) => {
                let failed = results.iter().filter(|result| result.is_err()).count();
                if failed > 0 {
                    error!("{} connection tasks failed during shutdown", failed);
                } else {
                    info!("All connections closed");
                }
            }
            Err(_) => {
                error!(
                    "Timeout waiting for connections to close after {:?}",
                    SHUTDOWN_TIMEOUT
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Adu, ExceptionCode, Request, Response};
    use crate::config::TransactionConfig;
    use crate::image::{MemoryImage, ProcessImage};
    use crate::transaction::Transaction;

    fn local_config() -> TcpConfig {
        TcpConfig {
            bind_addr: "127.0.0.1".to_string(),
            bind_port: 0,
            ..Default::default()
        }
    }

    async fn start<S: ProcessImageSource>(
        config: TcpConfig,
        source: S,
    ) -> (Arc<TcpListener<S>>, SocketAddr, JoinHandle<Result<(), ModbusError>>) {
        let listener = Arc::new(TcpListener::bind(&config, source, true).await.unwrap());
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn({
            let listener = Arc::clone(&listener);
            async move { listener.run().await }
        });
        (listener, addr, server)
    }

    fn coil_image() -> Arc<dyn ProcessImage> {
        let image = MemoryImage::new(16, 0, 0, 0);
        image.write_coils(0, &[true; 8]).unwrap();
        image
            .write_coils(8, &[true, false, true, false, true, false, true, false])
            .unwrap();
        Arc::new(image)
    }

    #[tokio::test]
    async fn test_concurrent_clients_get_their_own_answers() {
        let (listener, addr, server) = start(local_config(), coil_image()).await;

        let expected = [
            vec![true; 8],
            vec![true, false, true, false, true, false, true, false],
        ];

        let clients = (0..2u16).map(|n| {
            let expected = expected[n as usize].clone();
            async move {
                let transport = TcpTransport::connect(addr, false).await.unwrap();
                let transaction = Transaction::new(&transport, TransactionConfig::default());
                let request = Request::ReadCoils {
                    address: n * 8,
                    quantity: 8,
                };
                for _ in 0..25 {
                    let response = transaction.execute(1, &request).await.unwrap();
                    assert_eq!(response.pdu, Response::ReadCoils(expected.clone()));
                }
            }
        });
        join_all(clients).await;

        listener.stop().await;
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_missing_image_is_illegal_function() {
        let source: Option<Arc<dyn ProcessImage>> = None;
        let (listener, addr, server) = start(local_config(), source).await;

        let transport = TcpTransport::connect(addr, false).await.unwrap();
        let transaction = Transaction::new(&transport, TransactionConfig::default());
        let response = transaction
            .execute(
                1,
                &Request::ReadHoldingRegisters {
                    address: 0,
                    quantity: 1,
                },
            )
            .await
            .unwrap();

        assert_eq!(
            response.pdu,
            Response::Exception {
                function: 0x03,
                code: ExceptionCode::IllegalFunction,
            }
        );

        listener.stop().await;
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_connection_limit() {
        let config = TcpConfig {
            max_connections: 1,
            ..local_config()
        };
        let (listener, addr, server) = start(config, coil_image()).await;
        let request = Adu::new(
            1,
            Request::ReadCoils {
                address: 0,
                quantity: 1,
            },
        );

        let first = TcpTransport::connect(addr, false).await.unwrap();
        first.write_message(&request).await.unwrap();
        first.read_response().await.unwrap();
        assert_eq!(listener.active_connections(), 1);

        let second = TcpTransport::connect(addr, false).await.unwrap();
        second.write_message(&request).await.unwrap();
        assert!(timeout(Duration::from_millis(100), second.read_response())
            .await
            .is_err());

        drop(first);
        let response = timeout(Duration::from_secs(2), second.read_response())
            .await
            .unwrap()
            .unwrap();
        // One coil requested, the padding bits of the data byte are zero
        assert_eq!(
            response.pdu,
            Response::ReadCoils(vec![true, false, false, false, false, false, false, false])
        );

        listener.stop().await;
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_idle_connection_closed() {
        let config = TcpConfig {
            idle_timeout: Duration::from_millis(50),
            ..local_config()
        };
        let (listener, addr, server) = start(config, coil_image()).await;

        let client = TcpTransport::connect(addr, false).await.unwrap();
        let err = timeout(Duration::from_secs(2), client.read_response())
            .await
            .unwrap()
            .unwrap_err();
        assert!(err.is_closed());

        listener.stop().await;
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_stop_ends_open_connections() {
        let (listener, addr, server) = start(local_config(), coil_image()).await;

        let client = TcpTransport::connect(addr, false).await.unwrap();
        let request = Adu::new(
            1,
            Request::ReadCoils {
                address: 0,
                quantity: 1,
            },
        );
        client.write_message(&request).await.unwrap();
        client.read_response().await.unwrap();

        listener.stop().await;
        server.await.unwrap().unwrap();
        assert_eq!(listener.active_connections(), 0);
        assert!(client.read_response().await.unwrap_err().is_closed());
    }
}
