//! Transport layer error types

use std::fmt;

/// Transport layer result type
pub type Result<T> = std::result::Result<T, Error>;

/// Transport layer errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Response shorter than a status word
    InvalidResponse,

    /// Unexpected ISO 7816 status word
    Status(u16),

    /// Command payload cannot be framed
    MessageTooLarge,

    /// Deadline passed before the card answered
    Timeout,

    /// Operation cancelled by the caller
    Cancelled,

    /// Channel was closed or the card left the field
    Closed,

    /// I/O error from the reader
    IoError(String),

    /// Other error
    Other(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidResponse => write!(f, "Response APDU too short"),
            Error::Status(sw) => write!(f, "Unexpected status word {:04X}", sw),
            Error::MessageTooLarge => write!(f, "Message too large"),
            Error::Timeout => write!(f, "Timeout waiting for authenticator"),
            Error::Cancelled => write!(f, "Operation cancelled"),
            Error::Closed => write!(f, "Channel closed"),
            Error::IoError(msg) => write!(f, "I/O error: {}", msg),
            Error::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => Error::Timeout,
            std::io::ErrorKind::NotConnected
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::ConnectionAborted => Error::Closed,
            _ => Error::IoError(err.to_string()),
        }
    }
}
