//! CTAP2 status codes raised while building requests and decoding responses
//!
//! Byte values match the authenticator's error responses
//! (<https://fidoalliance.org/specs/fido-v2.2-rd-20230321/fido-client-to-authenticator-protocol-v2.2-rd-20230321.html#error-responses>),
//! so a local decoding failure and a remote one read the same to callers.
//! Status bytes received from the card are not decoded into this enum; the
//! client maps them directly.

use core::fmt;

use nfc_passkey_crypto::CryptoError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StatusCode {
    InvalidParameter = 0x02,
    InvalidLength = 0x03,
    CborUnexpectedType = 0x11,
    InvalidCbor = 0x12,
    MissingParameter = 0x14,
    UnsupportedAlgorithm = 0x26,
    IntegrityFailure = 0x3D,
    Other = 0x7F,
}

impl StatusCode {
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::InvalidParameter => "invalid parameter",
            Self::InvalidLength => "invalid length",
            Self::CborUnexpectedType => "unexpected CBOR type",
            Self::InvalidCbor => "invalid CBOR",
            Self::MissingParameter => "missing parameter",
            Self::UnsupportedAlgorithm => "unsupported algorithm",
            Self::IntegrityFailure => "integrity check failed",
            Self::Other => "other error",
        };
        write!(f, "{msg} (0x{:02X})", self.to_u8())
    }
}

impl std::error::Error for StatusCode {}

impl From<CryptoError> for StatusCode {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::InvalidPublicKey
            | CryptoError::InvalidKeyLength { .. }
            | CryptoError::UnsupportedProtocol(_) => Self::InvalidParameter,
            CryptoError::UnalignedInput(_) => Self::InvalidLength,
            CryptoError::DecryptionFailed => Self::IntegrityFailure,
            CryptoError::EncryptionFailed
            | CryptoError::KeyAgreementFailed
            | CryptoError::Compression(_) => Self::Other,
        }
    }
}

pub type Result<T> = core::result::Result<T, StatusCode>;
