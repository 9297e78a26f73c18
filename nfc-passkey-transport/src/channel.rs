//! Smartcard channel abstraction
//!
//! A [`Channel`] is whatever the platform's reader stack hands over once a
//! contactless card is in the field: it transmits one command APDU and
//! returns the full response APDU, status word included.

use crate::error::Result;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Request/response byte channel to a single card
pub trait Channel {
    /// Transmit one command APDU and wait at most `timeout` for the response
    ///
    /// The returned bytes end with the two status-word bytes.
    fn send(&mut self, apdu: &[u8], timeout: Duration) -> Result<Vec<u8>>;

    /// Release the connection; further `send` calls fail with `Error::Closed`
    fn close(&mut self);
}

impl<C: Channel + ?Sized> Channel for Box<C> {
    fn send(&mut self, apdu: &[u8], timeout: Duration) -> Result<Vec<u8>> {
        (**self).send(apdu, timeout)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

impl<C: Channel + ?Sized> Channel for &mut C {
    fn send(&mut self, apdu: &[u8], timeout: Duration) -> Result<Vec<u8>> {
        (**self).send(apdu, timeout)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Shared cancellation flag
///
/// Cloned into whoever may abort an operation; checked between round trips.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
