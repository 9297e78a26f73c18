//! Cryptographic primitives for the client side of CTAP2
//!
//! This crate provides the operations a platform needs to talk to a roaming
//! authenticator:
//!
//! - **ECDH**: P-256 key agreement for the PIN/UV auth protocols
//! - **PIN/UV auth protocols**: V1 (AES-256-CBC zero IV, truncated HMAC) and
//!   V2 (HKDF-separated keys, random IV, full HMAC)
//! - **Large blobs**: AES-256-GCM sealing and raw DEFLATE for per-credential blobs
//!
//! All implementations follow the FIDO2 specification:
//! <https://fidoalliance.org/specs/fido-v2.2-rd-20230321/fido-client-to-authenticator-protocol-v2.2-rd-20230321.html>

pub mod ecdh;
pub mod error;
pub mod large_blob;
pub mod pin_protocol;

pub use error::{CryptoError, Result};
pub use pin_protocol::{PinUvAuthProtocol, SharedSecret};
