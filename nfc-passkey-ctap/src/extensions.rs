//! CTAP extension identifiers and the PRF-to-hmac-secret mapping
//!
//! WebAuthn's `prf` client extension rides on CTAP `hmac-secret`, and
//! `largeBlob` rides on `largeBlobKey` plus the authenticatorLargeBlobs command.
//!
//! Spec: <https://fidoalliance.org/specs/fido-v2.2-rd-20230321/fido-client-to-authenticator-protocol-v2.2-rd-20230321.html#sctn-extensions>

use sha2::{Digest, Sha256};

/// Extension identifiers as they appear on the wire
pub mod ext_ids {
    pub const CRED_PROTECT: &str = "credProtect";
    pub const HMAC_SECRET: &str = "hmac-secret";
    pub const CRED_BLOB: &str = "credBlob";
    pub const LARGE_BLOB_KEY: &str = "largeBlobKey";
    pub const MIN_PIN_LENGTH: &str = "minPinLength";
}

/// hmac-secret getAssertion input keys
pub mod hmac_secret_keys {
    pub const KEY_AGREEMENT: i32 = 0x01;
    pub const SALT_ENC: i32 = 0x02;
    pub const SALT_AUTH: i32 = 0x03;
    pub const PIN_UV_AUTH_PROTOCOL: i32 = 0x04;
}

const PRF_CONTEXT: &[u8] = b"WebAuthn PRF";

/// Salt sent to hmac-secret for a PRF evaluation input
///
/// `SHA-256("WebAuthn PRF" || 0x00 || input)`
pub fn prf_salt(input: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(PRF_CONTEXT);
    hasher.update([0x00]);
    hasher.update(input);
    hasher.finalize().into()
}
