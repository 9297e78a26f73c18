//! Contactless transport layer for CTAP2
//!
//! This crate sits between a smartcard connection and the CTAP2 engine:
//! - [`Channel`]: the byte-oriented duplex primitive a reader delivers
//! - ISO 7816-4 command/response APDUs
//! - NFCCTAP framing: applet selection, command chaining, GET RESPONSE and
//!   status polling while the authenticator waits for the user
//! - [`ChannelHandler`] and [`SessionRunner`] for running sessions off the
//!   thread that discovers cards
//!
//! Spec: <https://fidoalliance.org/specs/fido-v2.2-rd-20230321/fido-client-to-authenticator-protocol-v2.2-rd-20230321.html#nfc>

pub mod apdu;
pub mod channel;
pub mod error;
pub mod handler;
pub mod nfcctap;
pub mod runner;

pub use apdu::{CommandApdu, ResponseApdu};
pub use channel::{CancelToken, Channel};
pub use error::{Error, Result};
pub use handler::ChannelHandler;
pub use nfcctap::CtapApdu;
pub use runner::SessionRunner;
