use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::SerialLink;
use crate::errors::{RtsError, TransportError};

#[derive(Default)]
struct Shared {
    input: VecDeque<u8>,
    replies: VecDeque<Vec<u8>>,
    written: Vec<u8>,
    timeouts: Vec<Duration>,
    rts: Vec<bool>,
    clears: usize,
}

/// In-memory serial link; every write releases the next scripted reply.
pub(crate) struct ScriptedLink {
    shared: Arc<Mutex<Shared>>,
    timeout: Duration,
    threshold: Option<usize>,
    threshold_support: bool,
    echo: bool,
    chunk: usize,
}

/// Test-side view of a [`ScriptedLink`] that moved into a transport.
#[derive(Clone)]
pub(crate) struct LinkHandle {
    shared: Arc<Mutex<Shared>>,
}

impl ScriptedLink {
    pub fn new() -> (Self, LinkHandle) {
        let shared = Arc::new(Mutex::new(Shared::default()));
        let link = Self {
            shared: Arc::clone(&shared),
            timeout: Duration::from_millis(10),
            threshold: None,
            threshold_support: false,
            echo: false,
            chunk: usize::MAX,
        };
        (link, LinkHandle { shared })
    }

    pub fn with_threshold_support() -> (Self, LinkHandle) {
        let (mut link, handle) = Self::new();
        link.threshold_support = true;
        (link, handle)
    }

    /// Every written byte is heard back, as on a two-wire RS-485 bus.
    pub fn echo(mut self) -> Self {
        self.echo = true;
        self
    }

    /// Deliver at most `chunk` bytes per read.
    pub fn chunked(mut self, chunk: usize) -> Self {
        self.chunk = chunk;
        self
    }
}

impl LinkHandle {
    pub fn reply(&self, bytes: &[u8]) {
        self.shared.lock().unwrap().replies.push_back(bytes.to_vec());
    }

    /// Bytes already waiting, as if received before the next request.
    pub fn inject(&self, bytes: &[u8]) {
        self.shared.lock().unwrap().input.extend(bytes);
    }

    pub fn written(&self) -> Vec<u8> {
        self.shared.lock().unwrap().written.clone()
    }

    pub fn pending_input(&self) -> usize {
        self.shared.lock().unwrap().input.len()
    }

    pub fn timeouts(&self) -> Vec<Duration> {
        self.shared.lock().unwrap().timeouts.clone()
    }

    pub fn rts(&self) -> Vec<bool> {
        self.shared.lock().unwrap().rts.clone()
    }

    pub fn clears(&self) -> usize {
        self.shared.lock().unwrap().clears
    }
}

impl SerialLink for ScriptedLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut shared = self.shared.lock().unwrap();
        if shared.input.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
        }
        let count = buf.len().min(self.chunk).min(shared.input.len());
        for (slot, byte) in buf.iter_mut().zip(shared.input.drain(..count)) {
            *slot = byte;
        }
        Ok(count)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        let mut shared = self.shared.lock().unwrap();
        shared.written.extend_from_slice(buf);
        if self.echo {
            shared.input.extend(buf);
        }
        if let Some(reply) = shared.replies.pop_front() {
            shared.input.extend(reply);
        }
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn clear_input(&mut self) -> Result<(), TransportError> {
        let mut shared = self.shared.lock().unwrap();
        shared.input.clear();
        shared.clears += 1;
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), TransportError> {
        self.timeout = timeout;
        self.shared.lock().unwrap().timeouts.push(timeout);
        Ok(())
    }

    fn supports_receive_threshold(&self) -> bool {
        self.threshold_support
    }

    fn receive_threshold(&self) -> Option<usize> {
        self.threshold
    }

    fn set_receive_threshold(&mut self, threshold: Option<usize>) -> Result<(), TransportError> {
        self.threshold = threshold;
        Ok(())
    }

    fn set_request_to_send(&mut self, level: bool) -> Result<(), RtsError> {
        self.shared.lock().unwrap().rts.push(level);
        Ok(())
    }

    fn name(&self) -> String {
        "scripted".to_string()
    }
}
