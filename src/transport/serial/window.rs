use std::ops::{Deref, DerefMut};
use std::time::Duration;

use tracing::warn;

use super::SerialLink;
use crate::errors::TransportError;

/// Receive timeout applied when a link has neither a timeout nor a receive
/// threshold.
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_millis(250);

/// Scoped receive settings for one framing operation.
///
/// Makes sure reads are bounded while the window is open and puts the link's
/// timeout and receive threshold back when it is dropped.
pub(crate) struct ReceiveWindow<'a, L: SerialLink + ?Sized> {
    link: &'a mut L,
    saved_timeout: Duration,
    saved_threshold: Option<usize>,
}

impl<'a, L: SerialLink + ?Sized> ReceiveWindow<'a, L> {
    pub fn open(link: &'a mut L) -> Result<Self, TransportError> {
        let saved_timeout = link.timeout();
        let saved_threshold = link.receive_threshold();

        let threshold_active = link.supports_receive_threshold() && saved_threshold.is_some();
        if !threshold_active && saved_timeout.is_zero() {
            link.set_timeout(DEFAULT_RECEIVE_TIMEOUT)?;
        }

        Ok(Self {
            link,
            saved_timeout,
            saved_threshold,
        })
    }

    /// Asks the link to block until `count` bytes are available, where supported.
    pub fn expect(&mut self, count: usize) -> Result<(), TransportError> {
        if self.link.supports_receive_threshold() {
            self.link.set_receive_threshold(Some(count))?;
        }
        Ok(())
    }
}

impl<L: SerialLink + ?Sized> Deref for ReceiveWindow<'_, L> {
    type Target = L;

    fn deref(&self) -> &L {
        self.link
    }
}

impl<L: SerialLink + ?Sized> DerefMut for ReceiveWindow<'_, L> {
    fn deref_mut(&mut self) -> &mut L {
        self.link
    }
}

impl<L: SerialLink + ?Sized> Drop for ReceiveWindow<'_, L> {
    fn drop(&mut self) {
        if self.link.timeout() != self.saved_timeout {
            if let Err(e) = self.link.set_timeout(self.saved_timeout) {
                warn!("Failed to restore receive timeout on {}: {}", self.link.name(), e);
            }
        }
        if self.link.supports_receive_threshold()
            && self.link.receive_threshold() != self.saved_threshold
        {
            if let Err(e) = self.link.set_receive_threshold(self.saved_threshold) {
                warn!("Failed to restore receive threshold on {}: {}", self.link.name(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::serial::mock::ScriptedLink;

    #[test]
    fn test_default_timeout_applied_and_restored() {
        let (mut link, handle) = ScriptedLink::new();
        link.set_timeout(Duration::ZERO).unwrap();

        {
            let window = ReceiveWindow::open(&mut link).unwrap();
            assert_eq!(window.timeout(), DEFAULT_RECEIVE_TIMEOUT);
        }
        assert_eq!(link.timeout(), Duration::ZERO);
        assert_eq!(
            handle.timeouts(),
            vec![Duration::ZERO, DEFAULT_RECEIVE_TIMEOUT, Duration::ZERO]
        );
    }

    #[test]
    fn test_configured_timeout_left_alone() {
        let (mut link, handle) = ScriptedLink::new();
        link.set_timeout(Duration::from_secs(1)).unwrap();

        drop(ReceiveWindow::open(&mut link).unwrap());
        assert_eq!(link.timeout(), Duration::from_secs(1));
        assert_eq!(handle.timeouts(), vec![Duration::from_secs(1)]);
    }

    #[test]
    fn test_threshold_restored() {
        let (mut link, _handle) = ScriptedLink::with_threshold_support();
        link.set_timeout(Duration::ZERO).unwrap();

        {
            let mut window = ReceiveWindow::open(&mut link).unwrap();
            // No threshold set yet, so the default timeout bounds reads
            assert_eq!(window.timeout(), DEFAULT_RECEIVE_TIMEOUT);
            window.expect(6).unwrap();
            assert_eq!(window.receive_threshold(), Some(6));
        }
        assert_eq!(link.receive_threshold(), None);
        assert_eq!(link.timeout(), Duration::ZERO);
    }
}
