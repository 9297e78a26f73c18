//! NFCCTAP framing
//!
//! CTAP2 over ISO 7816: select the FIDO applet, then carry
//! `command byte || CBOR` inside NFCCTAP_MSG. Long messages are split with
//! command chaining, long responses are pulled with GET RESPONSE, and while
//! the authenticator waits for the user it answers `9100` and is polled
//! with NFCCTAP_GETRESPONSE.

use crate::apdu::{CLA_CHAIN, CLA_ISO, CLA_PROPRIETARY, CommandApdu, MAX_SHORT_DATA, ResponseApdu, ins, sw};
use crate::channel::{CancelToken, Channel};
use crate::error::{Error, Result};

use std::time::{Duration, Instant};

/// FIDO applet identifier
pub const FIDO_AID: [u8; 8] = [0xA0, 0x00, 0x00, 0x06, 0x47, 0x2F, 0x00, 0x01];

/// NFCCTAP_MSG P1 bit: client supports NFCCTAP_GETRESPONSE
const P1_GETRESPONSE_SUPPORTED: u8 = 0x80;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Status byte carried in a `9100` response
const STATUS_UP_NEEDED: u8 = 0x02;

/// CTAP2 message transceiver over a smartcard [`Channel`]
///
/// Every round trip is bounded by the caller's deadline: the channel only
/// ever receives the time remaining until it.
pub struct CtapApdu<C: Channel> {
    channel: C,
    poll_interval: Duration,
    cancel: Option<CancelToken>,
    closed: bool,
}

impl<C: Channel> CtapApdu<C> {
    pub fn new(channel: C) -> Self {
        Self {
            channel,
            poll_interval: DEFAULT_POLL_INTERVAL,
            cancel: None,
            closed: false,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_cancel(mut self, cancel: Option<CancelToken>) -> Self {
        self.cancel = cancel;
        self
    }

    /// SELECT the FIDO applet, returning its version string bytes
    /// (`FIDO_2_0` or `U2F_V2`)
    pub fn select(&mut self, deadline: Instant) -> Result<Vec<u8>> {
        let apdu = CommandApdu::new(CLA_ISO, ins::SELECT, 0x04, 0x00)
            .with_data(FIDO_AID.to_vec())
            .with_le(0x00);
        let response = self.transmit(&apdu, deadline)?;
        self.collect(response, deadline)
    }

    /// Send one CTAP2 command and return `status byte || CBOR`
    pub fn transceive_cbor(&mut self, command: u8, payload: &[u8], deadline: Instant) -> Result<Vec<u8>> {
        let mut message = Vec::with_capacity(1 + payload.len());
        message.push(command);
        message.extend_from_slice(payload);

        let blocks: Vec<&[u8]> = message.chunks(MAX_SHORT_DATA).collect();
        let last = blocks.len() - 1;

        tracing::trace!(command, len = message.len(), blocks = blocks.len(), "NFCCTAP_MSG");

        for (index, block) in blocks.iter().enumerate() {
            let final_block = index == last;
            let cla = if final_block {
                CLA_PROPRIETARY
            } else {
                CLA_PROPRIETARY | CLA_CHAIN
            };
            let mut apdu = CommandApdu::new(cla, ins::NFCCTAP_MSG, P1_GETRESPONSE_SUPPORTED, 0x00)
                .with_data(block.to_vec());
            if final_block {
                apdu = apdu.with_le(0x00);
            }

            let response = self.transmit(&apdu, deadline)?;
            if final_block {
                return self.collect(response, deadline);
            }
            if !response.is_ok() {
                return Err(Error::Status(response.sw));
            }
        }

        Err(Error::Other("empty NFCCTAP message".to_string()))
    }

    /// Release the channel; idempotent
    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.channel.close();
            tracing::debug!("Channel closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn transmit(&mut self, apdu: &CommandApdu, deadline: Instant) -> Result<ResponseApdu> {
        if self.closed {
            return Err(Error::Closed);
        }
        if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            return Err(Error::Cancelled);
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(Error::Timeout);
        }

        let raw = self.channel.send(&apdu.to_bytes()?, remaining)?;
        ResponseApdu::from_bytes(raw)
    }

    /// Drain a response: follow 61xx with GET RESPONSE, poll through 9100
    fn collect(&mut self, mut response: ResponseApdu, deadline: Instant) -> Result<Vec<u8>> {
        let mut body = Vec::new();
        loop {
            match response.sw {
                sw::OK => {
                    body.extend_from_slice(&response.data);
                    return Ok(body);
                }
                sw::STATUS_UPDATE => {
                    if response.data.first() == Some(&STATUS_UP_NEEDED) {
                        tracing::debug!("Waiting for user presence");
                    }
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    std::thread::sleep(self.poll_interval.min(remaining));
                    let poll = CommandApdu::new(CLA_PROPRIETARY, ins::NFCCTAP_GETRESPONSE, 0x00, 0x00)
                        .with_le(0x00);
                    response = self.transmit(&poll, deadline)?;
                }
                _ if response.sw1() == sw::MORE_DATA => {
                    body.extend_from_slice(&response.data);
                    let more = CommandApdu::new(CLA_ISO, ins::GET_RESPONSE, 0x00, 0x00)
                        .with_le(response.sw2());
                    response = self.transmit(&more, deadline)?;
                }
                other => return Err(Error::Status(other)),
            }
        }
    }
}
