//! Authenticator data
//!
//! ```text
//! rpIdHash (32) | flags (1) | signCount (4, BE)
//!   [ aaguid (16) | credIdLen (2, BE) | credentialId | credentialPublicKey (COSE) ]   if AT
//!   [ extensions (CBOR map) ]                                                          if ED
//! ```
//!
//! <https://www.w3.org/TR/webauthn-3/#sctn-authenticator-data>

use crate::cbor::{self, Value};
use crate::status::{Result, StatusCode};

pub mod flags {
    pub const USER_PRESENT: u8 = 0x01;
    pub const USER_VERIFIED: u8 = 0x04;
    pub const BACKUP_ELIGIBLE: u8 = 0x08;
    pub const BACKED_UP: u8 = 0x10;
    pub const ATTESTED_CREDENTIAL_DATA: u8 = 0x40;
    pub const EXTENSION_DATA: u8 = 0x80;
}

const HEADER_LEN: usize = 37;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestedCredentialData {
    pub aaguid: [u8; 16],
    pub credential_id: Vec<u8>,
    /// COSE_Key exactly as the authenticator encoded it
    pub public_key: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct AuthenticatorData {
    pub rp_id_hash: [u8; 32],
    pub flags: u8,
    pub sign_count: u32,
    pub attested_credential: Option<AttestedCredentialData>,
    pub extensions: Option<Value>,
    raw: Vec<u8>,
}

impl AuthenticatorData {
    /// Parse and bounds-check authenticator data
    ///
    /// Truncated input yields [`StatusCode::InvalidLength`]; trailing bytes
    /// after the declared sections are rejected the same way.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_LEN {
            return Err(StatusCode::InvalidLength);
        }

        let mut rp_id_hash = [0u8; 32];
        rp_id_hash.copy_from_slice(&data[..32]);
        let flag_byte = data[32];
        let sign_count = u32::from_be_bytes([data[33], data[34], data[35], data[36]]);

        let mut pos = HEADER_LEN;
        let attested_credential = if flag_byte & flags::ATTESTED_CREDENTIAL_DATA != 0 {
            let fixed = data.get(pos..pos + 18).ok_or(StatusCode::InvalidLength)?;
            let mut aaguid = [0u8; 16];
            aaguid.copy_from_slice(&fixed[..16]);
            let id_len = u16::from_be_bytes([fixed[16], fixed[17]]) as usize;
            pos += 18;

            let credential_id = data
                .get(pos..pos + id_len)
                .ok_or(StatusCode::InvalidLength)?
                .to_vec();
            if credential_id.is_empty() {
                return Err(StatusCode::InvalidLength);
            }
            pos += id_len;

            let key_len = cbor::item_len(&data[pos..])?;
            let public_key = data[pos..pos + key_len].to_vec();
            pos += key_len;

            Some(AttestedCredentialData {
                aaguid,
                credential_id,
                public_key,
            })
        } else {
            None
        };

        let extensions = if flag_byte & flags::EXTENSION_DATA != 0 {
            let ext_len = cbor::item_len(&data[pos..])?;
            let value: Value = cbor::decode(&data[pos..pos + ext_len])?;
            if !matches!(value, Value::Map(_)) {
                return Err(StatusCode::CborUnexpectedType);
            }
            pos += ext_len;
            Some(value)
        } else {
            None
        };

        if pos != data.len() {
            return Err(StatusCode::InvalidLength);
        }

        Ok(Self {
            rp_id_hash,
            flags: flag_byte,
            sign_count,
            attested_credential,
            extensions,
            raw: data.to_vec(),
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    pub fn user_present(&self) -> bool {
        self.flags & flags::USER_PRESENT != 0
    }

    pub fn user_verified(&self) -> bool {
        self.flags & flags::USER_VERIFIED != 0
    }

    /// Extension output by identifier, if the ED section carries it
    pub fn extension(&self, id: &str) -> Option<&Value> {
        self.extensions
            .as_ref()
            .and_then(|ext| cbor::text_entry(ext, id))
    }
}
