//! Slave side: answer requests from a process image.
//!
//! [`serve`] is the per-transport loop; [`TcpListener`] runs one per accepted
//! connection and [`UdpListener`] one per bound socket. A serial slave calls
//! [`serve`] directly with an ASCII transport.

mod tcp;
mod udp;

use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::codec::{ExceptionCode, Pdu, RequestAdu, ResponseAdu, MAX_PDU_SIZE};
use crate::errors::ModbusError;
use crate::image::ProcessImageSource;
use crate::transport::Transport;

pub use tcp::TcpListener;
pub use udp::UdpListener;

/// Tuning of one serving loop.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServeOptions {
    /// End the loop when no request arrives for this long.
    pub idle_timeout: Option<Duration>,
    /// End the loop on an undecodable request instead of skipping it.
    /// Stream transports cannot resynchronise after one.
    pub drop_on_malformed: bool,
}

/// Builds the answer to `request`.
///
/// Units without a process image get an Illegal Function exception. An
/// answer that would not fit in one PDU becomes a Server Device Failure.
pub fn answer<S>(source: &S, request: &RequestAdu) -> ResponseAdu
where
    S: ProcessImageSource + ?Sized,
{
    let response = match source.process_image(request.unit_id) {
        Some(image) => request.pdu.respond(&*image),
        None => {
            debug!(unit_id = request.unit_id, "No process image for unit");
            request.pdu.exception(ExceptionCode::IllegalFunction)
        }
    };

    let size = response.to_bytes().len();
    if size > MAX_PDU_SIZE {
        warn!(
            unit_id = request.unit_id,
            function = request.pdu.function_code(),
            size,
            "Answer exceeds the PDU limit"
        );
        return request.reply(request.pdu.exception(ExceptionCode::ServerDeviceFailure));
    }

    request.reply(response)
}

/// Reads requests from `transport` and writes their answers until `stop`
/// turns true, the peer closes the stream or the idle timeout passes.
///
/// Silence on the line is not an error. Any other failure ends the loop and
/// is returned; it never affects other loops.
pub async fn serve<T, S>(
    transport: &T,
    source: &S,
    mut stop: watch::Receiver<bool>,
    options: ServeOptions,
) -> Result<(), ModbusError>
where
    T: Transport,
    S: ProcessImageSource + ?Sized,
{
    loop {
        if *stop.borrow_and_update() {
            debug!("Serving loop stopped");
            return Ok(());
        }

        let next = tokio::select! {
            next = next_request(transport, options.idle_timeout) => next,
            _ = stop.changed() => continue,
        };

        let request = match next {
            Ok(Some(request)) => request,
            Ok(None) => {
                info!("Closing idle connection");
                return Ok(());
            }
            Err(e) if e.is_closed() => {
                debug!("Peer closed the stream");
                return Ok(());
            }
            Err(e) if e.is_timeout() => continue,
            Err(e @ (ModbusError::Frame(_) | ModbusError::Protocol { .. }))
                if !options.drop_on_malformed =>
            {
                warn!("Discarding malformed request: {}", e);
                continue;
            }
            Err(e) => return Err(e),
        };

        let response = answer(source, &request);
        transport.write_message(&response).await?;
    }
}

/// `Ok(None)` when the idle timeout passed first.
async fn next_request<T: Transport>(
    transport: &T,
    idle_timeout: Option<Duration>,
) -> Result<Option<RequestAdu>, ModbusError> {
    match idle_timeout {
        Some(limit) => match tokio::time::timeout(limit, transport.read_request()).await {
            Ok(request) => request.map(Some),
            Err(_) => Ok(None),
        },
        None => transport.read_request().await.map(Some),
    }
}
