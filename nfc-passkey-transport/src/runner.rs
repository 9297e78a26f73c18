//! Session runner
//!
//! Card discovery usually happens on a thread the reader stack owns and that
//! must not block. [`SessionRunner`] moves each delivered channel onto one
//! dedicated worker thread, so sessions never overlap and the discovery
//! callback returns immediately.
//!
//! # Example
//!
//! ```no_run
//! use nfc_passkey_transport::{Channel, SessionRunner};
//!
//! let runner = SessionRunner::start(|mut channel: Box<dyn Channel + Send>| {
//!     // drive a CTAP2 session here
//!     channel.close();
//! })?;
//!
//! // From the reader's discovery callback:
//! // runner.deliver(channel)?;
//!
//! runner.shutdown()?;
//! # Ok::<(), nfc_passkey_transport::Error>(())
//! ```

use crate::channel::Channel;
use crate::error::{Error, Result};
use crate::handler::ChannelHandler;

use std::sync::mpsc;
use std::thread::JoinHandle;

type Delivery = Box<dyn Channel + Send>;

/// Single-worker executor for channel sessions
pub struct SessionRunner {
    sender: Option<mpsc::Sender<Delivery>>,
    worker: Option<JoinHandle<()>>,
}

impl SessionRunner {
    /// Spawn the worker thread that feeds channels to `handler` in order
    pub fn start<H>(mut handler: H) -> Result<Self>
    where
        H: ChannelHandler + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel::<Delivery>();
        let worker = std::thread::Builder::new()
            .name("nfc-passkey-session".to_string())
            .spawn(move || {
                for channel in receiver {
                    tracing::debug!("Channel available");
                    handler.on_channel_available(channel);
                }
                tracing::debug!("Session worker stopped");
            })?;

        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
        })
    }

    /// Queue a channel for the worker
    ///
    /// If the worker is gone the channel is closed and `Error::Closed` returned.
    pub fn deliver(&self, channel: Delivery) -> Result<()> {
        let sender = self.sender.as_ref().ok_or(Error::Closed)?;
        sender.send(channel).map_err(|mpsc::SendError(mut channel)| {
            channel.close();
            Error::Closed
        })
    }

    /// Stop accepting channels, finish queued sessions and join the worker
    pub fn shutdown(mut self) -> Result<()> {
        self.stop()
    }

    fn stop(&mut self) -> Result<()> {
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            worker
                .join()
                .map_err(|_| Error::Other("session worker panicked".to_string()))?;
        }
        Ok(())
    }
}

impl Drop for SessionRunner {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!("Session runner shutdown failed: {}", e);
        }
    }
}
