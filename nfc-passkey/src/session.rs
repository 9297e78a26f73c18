//! CTAP2 session over a single channel
//!
//! ```text
//! Idle -> Connected -> (PinNegotiated) -> CommandInFlight -> Completed | Failed
//! ```
//!
//! A session borrows the channel for one operation. Every round trip gets
//! only the time left until the operation deadline, and the channel is
//! closed whenever the session is dropped, whatever the outcome.

use crate::config::ClientConfig;
use crate::error::{Error, Result};

use nfc_passkey_ctap::{AuthenticatorInfo, CtapCommand};
use nfc_passkey_transport::{CancelToken, Channel, CtapApdu};

use std::fmt;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connected,
    PinNegotiated,
    CommandInFlight,
    Completed,
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connected => "connected",
            Self::PinNegotiated => "pin-negotiated",
            Self::CommandInFlight => "command-in-flight",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

pub struct Session<'c> {
    link: CtapApdu<&'c mut dyn Channel>,
    deadline: Instant,
    state: SessionState,
    info: AuthenticatorInfo,
}

impl<'c> Session<'c> {
    /// Select the FIDO applet and read authenticatorGetInfo
    ///
    /// On failure the channel has already been closed.
    pub fn open(
        channel: &'c mut dyn Channel,
        config: &ClientConfig,
        timeout: Duration,
        cancel: Option<CancelToken>,
    ) -> Result<Self> {
        let link = CtapApdu::new(channel)
            .with_poll_interval(config.poll_interval)
            .with_cancel(cancel);
        let mut session = Self {
            link,
            deadline: Instant::now() + timeout,
            state: SessionState::Idle,
            info: AuthenticatorInfo::default(),
        };

        match session.connect() {
            Ok(()) => Ok(session),
            Err(e) => {
                session.transition(SessionState::Failed);
                Err(e)
            }
        }
    }

    fn connect(&mut self) -> Result<()> {
        let version = self.link.select(self.deadline)?;
        tracing::debug!(version = %String::from_utf8_lossy(&version), "FIDO applet selected");

        let body = self.command(CtapCommand::GetInfo, &[])?;
        self.info = AuthenticatorInfo::from_cbor(&body)
            .map_err(|_| Error::MalformedResponse("authenticatorGetInfo"))?;
        tracing::debug!(
            versions = ?self.info.versions,
            extensions = ?self.info.extensions,
            firmware = ?self.info.firmware_version,
            "Authenticator info"
        );

        self.transition(SessionState::Connected);
        Ok(())
    }

    pub fn info(&self) -> &AuthenticatorInfo {
        &self.info
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub(crate) fn transition(&mut self, next: SessionState) {
        if self.state != next {
            tracing::debug!(from = %self.state, to = %next, "Session state");
            self.state = next;
        }
    }

    /// Send a command and return `(status, body)` without interpreting the status
    pub(crate) fn transceive(&mut self, command: CtapCommand, payload: &[u8]) -> Result<(u8, Vec<u8>)> {
        if self.remaining().is_zero() {
            return Err(Error::Timeout);
        }
        let mut response = self
            .link
            .transceive_cbor(command.as_u8(), payload, self.deadline)?;
        if response.is_empty() {
            return Err(Error::MalformedResponse("empty CTAP response"));
        }
        let status = response.remove(0);
        tracing::trace!(%command, status, len = response.len(), "CTAP response");
        Ok((status, response))
    }

    /// Send a command, mapping any non-zero status to an [`Error`]
    pub fn command(&mut self, command: CtapCommand, payload: &[u8]) -> Result<Vec<u8>> {
        let (status, body) = self.transceive(command, payload)?;
        if status != 0x00 {
            tracing::debug!(%command, status, "Authenticator error");
            return Err(Error::from_ctap_status(status));
        }
        Ok(body)
    }

    /// Record the outcome and release the channel
    pub fn finish<T>(mut self, result: Result<T>) -> Result<T> {
        match &result {
            Ok(_) => self.transition(SessionState::Completed),
            Err(e) => {
                tracing::debug!(error = %e, "Session failed");
                self.transition(SessionState::Failed);
            }
        }
        self.link.close();
        result
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        self.link.close();
    }
}
