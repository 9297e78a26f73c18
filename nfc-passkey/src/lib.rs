//! # nfc-passkey
//!
//! Client side of WebAuthn registration and authentication against a roaming
//! authenticator reached over a contactless smartcard channel.
//!
//! ## Architecture
//!
//! - **Challenge / client data**: random challenges and the canonical
//!   `clientDataJSON` whose hash anchors every CTAP2 request
//! - **Options**: JSON creation/request descriptions normalized into typed,
//!   validated options before the card is touched
//! - **Session**: one CTAP2 exchange over one [`Channel`](nfc_passkey_transport::Channel):
//!   applet selection, getInfo, PIN/UV token negotiation, the command itself
//! - **Materializer**: authenticator responses decoded into credential
//!   records with a canonical JSON form
//!
//! ## Example
//!
//! ```no_run
//! use nfc_passkey::{ClientConfig, Pin, WebAuthnClient};
//! use nfc_passkey_transport::{Channel, SessionRunner};
//!
//! let client = WebAuthnClient::new(ClientConfig::default());
//! let runner = SessionRunner::start(move |mut channel: Box<dyn Channel + Send>| {
//!     let options = serde_json::json!({
//!         "challenge": "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA",
//!         "rp": {"id": "example.com", "name": "Example"},
//!         "user": {"id": "dXNlcg", "name": "user", "displayName": "User"},
//!         "pubKeyCredParams": [{"type": "public-key", "alg": -7}],
//!     });
//!     let pin = Pin::new("123456");
//!     match client.create_credential(&mut *channel, &options, "example.com", Some(&pin), None) {
//!         Ok(credential) => println!("{}", credential.to_json_string()),
//!         Err(e) => eprintln!("registration failed: {e}"),
//!     }
//! })?;
//! # runner.shutdown()?;
//! # Ok::<(), nfc_passkey_transport::Error>(())
//! ```

pub mod challenge;
pub mod client;
pub mod client_data;
pub mod config;
pub mod encoding;
pub mod error;
pub mod extensions;
pub mod large_blob;
pub mod materialize;
pub mod options;
pub mod pin;
pub mod request;
pub mod session;

pub use challenge::{Challenge, generate_challenge};
pub use client::{CreateExtras, EnterpriseAttestation, WebAuthnClient};
pub use client_data::{ClientDataHash, ClientDataType, build_client_data, client_data_hash};
pub use config::{ClientConfig, ResidentKeyRequirement, UserVerificationRequirement};
pub use error::{Error, ErrorKind, Result};
pub use extensions::PrfOutputs;
pub use materialize::{
    AssertionCredential, AssertionExtensionResults, LargeBlobOutput, PublicKeyCredential,
    RegistrationExtensionResults, materialize_assertion, materialize_registration,
};
pub use options::{CredentialCreationOptions, CredentialRequestOptions};
pub use pin::Pin;
pub use session::{Session, SessionState};

pub use nfc_passkey_transport::CancelToken;
