//! Challenge generation

use crate::encoding::{b64url, decode_b64};

use rand::RngCore;
use rand::rngs::OsRng;

pub const CHALLENGE_LEN: usize = 32;

/// Relying-party challenge bound into client data
#[derive(Clone, PartialEq, Eq)]
pub struct Challenge(Vec<u8>);

/// Fresh 32-byte challenge from the OS CSPRNG
pub fn generate_challenge() -> Challenge {
    let mut bytes = vec![0u8; CHALLENGE_LEN];
    OsRng.fill_bytes(&mut bytes);
    Challenge(bytes)
}

impl Challenge {
    /// Wrap caller-supplied bytes; `None` when empty
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Option<Self> {
        let bytes = bytes.into();
        (!bytes.is_empty()).then_some(Self(bytes))
    }

    /// Decode from base64 (either alphabet, padding optional)
    pub fn from_base64(text: &str) -> Option<Self> {
        decode_b64(text).and_then(Self::from_bytes)
    }

    pub fn to_base64url(&self) -> String {
        b64url(&self.0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for Challenge {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for Challenge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Challenge({})", self.to_base64url())
    }
}
