//! Large-blob entry sealing
//!
//! Each entry of the authenticator's serialized large-blob array is the raw
//! DEFLATE compression of the blob, encrypted with AES-256-GCM under the
//! credential's `largeBlobKey`. The associated data is `"blob" || uint64LE(origSize)`.
//!
//! <https://fidoalliance.org/specs/fido-v2.2-rd-20230321/fido-client-to-authenticator-protocol-v2.2-rd-20230321.html#large-blob>

use crate::error::{CryptoError, Result};

use std::io::{Read, Write};

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit, Payload},
};
use flate2::{Compression, read::DeflateDecoder, write::DeflateEncoder};
use rand::RngCore;

/// AES-GCM nonce length used for large-blob entries
pub const NONCE_LEN: usize = 12;

/// One encrypted entry of the large-blob array
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedBlob {
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_LEN],
    pub orig_size: u64,
}

fn associated_data(orig_size: u64) -> [u8; 12] {
    let mut aad = [0u8; 12];
    aad[..4].copy_from_slice(b"blob");
    aad[4..].copy_from_slice(&orig_size.to_le_bytes());
    aad
}

fn cipher(key: &[u8]) -> Result<Aes256Gcm> {
    Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyLength {
        expected: 32,
        actual: key.len(),
    })
}

/// Compress and encrypt `blob` with a fresh random nonce
pub fn seal(key: &[u8], blob: &[u8]) -> Result<SealedBlob> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(blob)
        .map_err(|e| CryptoError::Compression(e.to_string()))?;
    let compressed = encoder
        .finish()
        .map_err(|e| CryptoError::Compression(e.to_string()))?;

    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);

    let orig_size = blob.len() as u64;
    let aad = associated_data(orig_size);
    let ciphertext = cipher(key)?
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: &compressed,
                aad: &aad,
            },
        )
        .map_err(|_| CryptoError::EncryptionFailed)?;

    Ok(SealedBlob {
        ciphertext,
        nonce,
        orig_size,
    })
}

/// Decrypt and inflate an entry
///
/// Fails with [`CryptoError::DecryptionFailed`] when the entry was sealed
/// under a different key, which is the normal case while scanning the array.
pub fn open(key: &[u8], sealed: &SealedBlob) -> Result<Vec<u8>> {
    let aad = associated_data(sealed.orig_size);
    let compressed = cipher(key)?
        .decrypt(
            Nonce::from_slice(&sealed.nonce),
            Payload {
                msg: &sealed.ciphertext,
                aad: &aad,
            },
        )
        .map_err(|_| CryptoError::DecryptionFailed)?;

    let mut blob = Vec::new();
    DeflateDecoder::new(compressed.as_slice())
        .read_to_end(&mut blob)
        .map_err(|e| CryptoError::Compression(e.to_string()))?;

    if blob.len() as u64 != sealed.orig_size {
        return Err(CryptoError::Compression(format!(
            "inflated {} bytes, expected {}",
            blob.len(),
            sealed.orig_size
        )));
    }
    Ok(blob)
}
