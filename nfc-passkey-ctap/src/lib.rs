//! CTAP2 wire layer for a platform (client) implementation
//!
//! Everything here is transport-agnostic: canonical CBOR encoding for
//! requests, decoding helpers for responses, local status codes, and the
//! parsed forms of `authenticatorGetInfo`, authenticator data and COSE keys.
//!
//! Implements the client side of:
//! <https://fidoalliance.org/specs/fido-v2.2-rd-20230321/fido-client-to-authenticator-protocol-v2.2-rd-20230321.html>

pub mod auth_data;
pub mod cbor;
pub mod command;
pub mod cose;
pub mod extensions;
pub mod get_info;
pub mod sec_bytes;
pub mod status;

pub use auth_data::{AttestedCredentialData, AuthenticatorData};
pub use cbor::{MapBuilder, MapParser, TextMapBuilder, Value};
pub use command::{ClientPinSubCommand, CtapCommand, Permissions};
pub use cose::CoseKey;
pub use get_info::{AuthenticatorInfo, AuthenticatorOptions};
pub use sec_bytes::SecBytes;
pub use status::{Result, StatusCode};
