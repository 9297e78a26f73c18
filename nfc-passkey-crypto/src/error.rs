//! Error types for cryptographic operations

use thiserror::Error;

/// Cryptographic operation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Peer public key is not a valid P-256 point
    #[error("Invalid public key")]
    InvalidPublicKey,

    /// Decryption or tag verification failed
    #[error("Decryption failed")]
    DecryptionFailed,

    /// Encryption failed
    #[error("Encryption failed")]
    EncryptionFailed,

    /// Invalid key length
    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    /// Input to a no-padding CBC operation is not block aligned
    #[error("Input of {0} bytes is not a multiple of the AES block size")]
    UnalignedInput(usize),

    /// ECDH key agreement failed
    #[error("ECDH key agreement failed")]
    KeyAgreementFailed,

    /// Unknown PIN/UV auth protocol number
    #[error("Unsupported PIN/UV auth protocol {0}")]
    UnsupportedProtocol(u8),

    /// DEFLATE stream could not be produced or consumed
    #[error("Compression error: {0}")]
    Compression(String),
}

/// Result type alias for cryptographic operations
pub type Result<T> = core::result::Result<T, CryptoError>;
