//! Error taxonomy for WebAuthn operations

use nfc_passkey_crypto::CryptoError;
use nfc_passkey_ctap::StatusCode;
use nfc_passkey_transport as transport;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("transport error: {0}")]
    TransportError(String),

    #[error("incorrect PIN ({})", retries_display(.retries_remaining))]
    PinInvalid { retries_remaining: Option<u8> },

    #[error("PIN blocked")]
    PinBlocked,

    #[error("PIN required")]
    PinRequired,

    #[error("PIN does not satisfy the authenticator's policy")]
    PinPolicyViolation,

    #[error("user verification unavailable")]
    UserVerificationUnavailable,

    #[error("no supported public key algorithm")]
    UnsupportedAlgorithm,

    #[error("invalid entity: {0}")]
    InvalidEntity(&'static str),

    #[error("invalid options: {0}")]
    InvalidOptions(&'static str),

    #[error("cancelled")]
    UserCancelled,

    #[error("timed out")]
    Timeout,

    #[error("authenticator not eligible for this request")]
    DeviceIneligible,

    #[error("authenticator busy")]
    Busy,

    #[error("malformed authenticator response: {0}")]
    MalformedResponse(&'static str),

    #[error("authenticator error 0x{0:02X}")]
    DeviceError(u8),

    #[error("encoding error: {0}")]
    EncodingError(String),
}

fn retries_display(retries: &Option<u8>) -> String {
    match retries {
        Some(n) => format!("{n} retries remaining"),
        None => "retries unknown".to_string(),
    }
}

/// Field-free discriminant of [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Transport,
    PinInvalid,
    PinBlocked,
    PinRequired,
    PinPolicyViolation,
    UserVerificationUnavailable,
    UnsupportedAlgorithm,
    InvalidEntity,
    InvalidOptions,
    UserCancelled,
    Timeout,
    DeviceIneligible,
    Busy,
    MalformedResponse,
    DeviceError,
    Encoding,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::TransportError(_) => ErrorKind::Transport,
            Error::PinInvalid { .. } => ErrorKind::PinInvalid,
            Error::PinBlocked => ErrorKind::PinBlocked,
            Error::PinRequired => ErrorKind::PinRequired,
            Error::PinPolicyViolation => ErrorKind::PinPolicyViolation,
            Error::UserVerificationUnavailable => ErrorKind::UserVerificationUnavailable,
            Error::UnsupportedAlgorithm => ErrorKind::UnsupportedAlgorithm,
            Error::InvalidEntity(_) => ErrorKind::InvalidEntity,
            Error::InvalidOptions(_) => ErrorKind::InvalidOptions,
            Error::UserCancelled => ErrorKind::UserCancelled,
            Error::Timeout => ErrorKind::Timeout,
            Error::DeviceIneligible => ErrorKind::DeviceIneligible,
            Error::Busy => ErrorKind::Busy,
            Error::MalformedResponse(_) => ErrorKind::MalformedResponse,
            Error::DeviceError(_) => ErrorKind::DeviceError,
            Error::EncodingError(_) => ErrorKind::Encoding,
        }
    }

    /// PIN attempts left, when the failure reported them
    pub fn retries_remaining(&self) -> Option<u8> {
        match self {
            Error::PinInvalid { retries_remaining } => *retries_remaining,
            Error::PinBlocked => Some(0),
            _ => None,
        }
    }

    /// Map a non-zero CTAP status byte
    pub fn from_ctap_status(code: u8) -> Self {
        match code {
            0x27 | 0x2D => Error::UserCancelled,
            0x05 | 0x2F | 0x3A => Error::Timeout,
            0x19 | 0x26 | 0x28 | 0x2B | 0x2E => Error::DeviceIneligible,
            0x06 | 0x21 | 0x23 => Error::Busy,
            0x32 | 0x34 => Error::PinBlocked,
            0x35 => Error::UserVerificationUnavailable,
            0x36 => Error::PinRequired,
            0x37 => Error::PinPolicyViolation,
            other => Error::DeviceError(other),
        }
    }

    /// CBOR produced locally failed to encode
    pub(crate) fn encoding(status: StatusCode) -> Self {
        Error::EncodingError(status.to_string())
    }
}

impl From<StatusCode> for Error {
    fn from(status: StatusCode) -> Self {
        Error::from_ctap_status(status.to_u8())
    }
}

impl From<transport::Error> for Error {
    fn from(err: transport::Error) -> Self {
        match err {
            transport::Error::Timeout => Error::Timeout,
            transport::Error::Cancelled => Error::UserCancelled,
            other => Error::TransportError(other.to_string()),
        }
    }
}

impl From<CryptoError> for Error {
    fn from(err: CryptoError) -> Self {
        Error::EncodingError(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::EncodingError(err.to_string())
    }
}
