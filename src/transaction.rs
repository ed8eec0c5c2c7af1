//! Master side request/response exchange.

use std::time::Duration;

use tokio::time::{sleep, timeout_at, Instant};
use tracing::{debug, warn};

use crate::backoff::BackoffStrategy;
use crate::codec::{Adu, MbapHeader, Pdu, Request, ResponseAdu};
use crate::config::TransactionConfig;
use crate::errors::{ModbusError, ProtocolErrorKind, TransportError};
use crate::transport::Transport;

/// One request sent through a borrowed transport until it is answered or
/// the retry budget runs out.
///
/// Nothing is kept between calls to [`execute`](Self::execute); the
/// transport holds the only state (open stream, last request bytes).
pub struct Transaction<'t, T> {
    transport: &'t T,
    config: TransactionConfig,
}

impl<'t, T: Transport> Transaction<'t, T> {
    pub fn new(transport: &'t T, config: TransactionConfig) -> Self {
        Self { transport, config }
    }

    /// Sends `request` to `unit_id` and waits for the matching response.
    ///
    /// Exception responses are returned as `Ok`. Frames carrying another
    /// transaction id are logged and dropped within the same attempt, without
    /// sending the request again. Malformed frames, unit or
    /// function mismatches, I/O failures and timeouts are retried with the
    /// same transaction id; once the attempts are used up the last failure is
    /// returned, timeouts as [`TransportError::NoResponse`].
    pub async fn execute(&self, unit_id: u8, request: &Request) -> Result<ResponseAdu, ModbusError> {
        let mut message = Adu::new(unit_id, request);
        if let Some(transaction_id) = self.transport.next_transaction_id() {
            message = message.with_header(MbapHeader::new(transaction_id));
        }

        let mut backoff = BackoffStrategy::new(self.config.backoff.clone());
        let started = Instant::now();

        loop {
            let err = match self.attempt(&message).await {
                Ok(response) => {
                    debug!(
                        unit_id,
                        function = response.pdu.function_code(),
                        attempts = backoff.attempts(),
                        "Transaction completed"
                    );
                    return Ok(response);
                }
                Err(err) if err.is_retryable() => err,
                Err(err) => return Err(err),
            };

            match backoff.next_backoff() {
                Some(delay) => {
                    warn!(
                        unit_id,
                        attempt = backoff.attempts() - 1,
                        max_attempts = backoff.max_attempts(),
                        ?delay,
                        "Transaction attempt failed: {}",
                        err
                    );
                    sleep(delay).await;
                }
                None if err.is_timeout() => {
                    return Err(TransportError::NoResponse {
                        attempts: u8::try_from(backoff.attempts()).unwrap_or(u8::MAX),
                        elapsed: started.elapsed(),
                    }
                    .into());
                }
                None => return Err(err),
            }
        }
    }

    /// One write, then reads until a frame for this transaction arrives or
    /// the response timeout passes.
    ///
    /// When only frames for other transactions arrived in time the attempt
    /// fails with [`ProtocolErrorKind::InvalidTransactionId`].
    async fn attempt(&self, message: &Adu<&Request>) -> Result<ResponseAdu, ModbusError> {
        self.transport.write_message(message).await?;

        let limit = self.config.response_timeout;
        let sent = Instant::now();
        let deadline = sent + limit;
        let mut discarded = 0usize;

        loop {
            let next = match timeout_at(deadline, self.transport.read_response()).await {
                Ok(next) => next,
                Err(_) if discarded > 0 => {
                    return Err(ModbusError::protocol(
                        ProtocolErrorKind::InvalidTransactionId,
                        format!(
                            "no answer to transaction {:?} within {:?}, {} foreign frames",
                            message.transaction_id(),
                            limit,
                            discarded
                        ),
                    ));
                }
                Err(source) => {
                    return Err(TransportError::Timeout {
                        elapsed: sent.elapsed(),
                        limit,
                        source,
                    }
                    .into());
                }
            };
            let mut response = next?;

            if let Some(expected) = message.transaction_id() {
                if response.transaction_id() != Some(expected) {
                    warn!(
                        expected,
                        received = ?response.transaction_id(),
                        "Discarding response to another transaction"
                    );
                    discarded += 1;
                    continue;
                }
            }

            check_response(message, &response)?;
            response.pdu.truncate_to(message.pdu);
            return Ok(response);
        }
    }

    pub fn response_timeout(&self) -> Duration {
        self.config.response_timeout
    }
}

fn check_response(request: &Adu<&Request>, response: &ResponseAdu) -> Result<(), ModbusError> {
    if response.unit_id != request.unit_id {
        return Err(ModbusError::protocol(
            ProtocolErrorKind::InvalidUnitId,
            format!(
                "expected unit {}, got {}",
                request.unit_id, response.unit_id
            ),
        ));
    }

    let expected = request.pdu.function_code();
    let actual = response.pdu.request_function_code();
    if actual != expected {
        return Err(ModbusError::protocol(
            ProtocolErrorKind::UnexpectedFunction,
            format!("expected function 0x{:02X}, got 0x{:02X}", expected, actual),
        ));
    }

    Ok(())
}
