//! Collected client data
//!
//! `clientDataJSON` is serialized with a fixed member order
//! (`type`, `challenge`, `origin`) so identical inputs always produce
//! identical bytes, and therefore an identical `clientDataHash`.

use crate::error::{Error, Result};

use serde::Serialize;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientDataType {
    Create,
    Get,
}

impl ClientDataType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "webauthn.create",
            Self::Get => "webauthn.get",
        }
    }
}

/// SHA-256 of the serialized client data
pub type ClientDataHash = [u8; 32];

#[derive(Serialize)]
struct CollectedClientData<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    challenge: &'a str,
    origin: &'a str,
}

pub fn build_client_data(kind: ClientDataType, origin: &str, challenge_b64: &str) -> Result<Vec<u8>> {
    if origin.chars().any(char::is_control) {
        return Err(Error::EncodingError("control character in origin".to_string()));
    }
    if challenge_b64.chars().any(char::is_control) {
        return Err(Error::EncodingError("control character in challenge".to_string()));
    }

    let data = CollectedClientData {
        kind: kind.as_str(),
        challenge: challenge_b64,
        origin,
    };
    Ok(serde_json::to_vec(&data)?)
}

pub fn client_data_hash(client_data_json: &[u8]) -> ClientDataHash {
    Sha256::digest(client_data_json).into()
}
