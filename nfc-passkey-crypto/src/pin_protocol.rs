//! PIN/UV auth protocols one and two, platform side
//!
//! <https://fidoalliance.org/specs/fido-v2.2-rd-20230321/fido-client-to-authenticator-protocol-v2.2-rd-20230321.html#authenticatorClientPIN>
//!
//! Protocol V1: `SHA-256(Z)` as both keys, AES-256-CBC with a zero IV,
//! HMAC-SHA-256 truncated to 16 bytes.
//! Protocol V2: HKDF-SHA-256 separates the HMAC and AES keys, a random IV is
//! prepended to every ciphertext, and the HMAC is not truncated.

use crate::error::{CryptoError, Result};

use aes::Aes256;
use cbc::{
    Decryptor, Encryptor,
    cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::NoPadding},
};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

type HmacSha256 = Hmac<Sha256>;
type Aes256CbcEnc = Encryptor<Aes256>;
type Aes256CbcDec = Decryptor<Aes256>;

const BLOCK: usize = 16;

/// PIN/UV auth protocol version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum PinUvAuthProtocol {
    V1 = 1,
    V2 = 2,
}

impl PinUvAuthProtocol {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::V1),
            2 => Ok(Self::V2),
            other => Err(CryptoError::UnsupportedProtocol(other)),
        }
    }

    /// `authenticate(key, message)` for this protocol
    ///
    /// V1 yields 16 bytes, V2 yields the full 32.
    pub fn authenticate(self, key: &[u8], message: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::V1 => v1::authenticate(key, message).map(|mac| mac.to_vec()),
            Self::V2 => v2::authenticate(key, message).map(|mac| mac.to_vec()),
        }
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<[u8; 32]> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyLength {
        expected: 32,
        actual: key.len(),
    })?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().into())
}

fn check_aligned(data: &[u8]) -> Result<()> {
    if !data.len().is_multiple_of(BLOCK) {
        return Err(CryptoError::UnalignedInput(data.len()));
    }
    Ok(())
}

fn cbc_encrypt(key: &[u8; 32], iv: &[u8; 16], plaintext: &[u8]) -> Result<Vec<u8>> {
    check_aligned(plaintext)?;
    let mut buffer = plaintext.to_vec();
    let len = buffer.len();
    Aes256CbcEnc::new(key.into(), iv.into())
        .encrypt_padded_mut::<NoPadding>(&mut buffer, len)
        .map_err(|_| CryptoError::EncryptionFailed)?;
    Ok(buffer)
}

fn cbc_decrypt(key: &[u8; 32], iv: &[u8; 16], ciphertext: &[u8]) -> Result<Vec<u8>> {
    check_aligned(ciphertext)?;
    let mut buffer = ciphertext.to_vec();
    Aes256CbcDec::new(key.into(), iv.into())
        .decrypt_padded_mut::<NoPadding>(&mut buffer)
        .map_err(|_| CryptoError::DecryptionFailed)?;
    Ok(buffer)
}

/// PIN/UV auth protocol one
pub mod v1 {
    use super::*;

    /// AES-256-CBC with a zero IV and no padding
    ///
    /// ```
    /// use nfc_passkey_crypto::pin_protocol::v1;
    ///
    /// let key = [0x42u8; 32];
    /// let ciphertext = v1::encrypt(&key, &[0u8; 16]).unwrap();
    /// assert_eq!(ciphertext.len(), 16);
    /// assert_eq!(v1::decrypt(&key, &ciphertext).unwrap(), [0u8; 16]);
    /// ```
    pub fn encrypt(key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>> {
        cbc_encrypt(key, &[0u8; 16], plaintext)
    }

    pub fn decrypt(key: &[u8; 32], ciphertext: &[u8]) -> Result<Vec<u8>> {
        cbc_decrypt(key, &[0u8; 16], ciphertext)
    }

    /// First 16 bytes of HMAC-SHA-256
    pub fn authenticate(key: &[u8], data: &[u8]) -> Result<[u8; 16]> {
        let full = hmac_sha256(key, data)?;
        let mut out = [0u8; 16];
        out.copy_from_slice(&full[..16]);
        Ok(out)
    }

    /// `SHA-256(Z)`, used as both the HMAC and the AES key
    pub fn derive_key(z: &[u8; 32]) -> [u8; 32] {
        Sha256::digest(z).into()
    }
}

/// PIN/UV auth protocol two
pub mod v2 {
    use super::*;
    use hkdf::Hkdf;

    const HMAC_INFO: &[u8] = b"CTAP2 HMAC key";
    const AES_INFO: &[u8] = b"CTAP2 AES key";

    fn hkdf_expand(z: &[u8; 32], info: &[u8]) -> Result<[u8; 32]> {
        let hkdf = Hkdf::<Sha256>::new(Some(&[0u8; 32][..]), z);
        let mut key = [0u8; 32];
        hkdf.expand(info, &mut key)
            .map_err(|_| CryptoError::KeyAgreementFailed)?;
        Ok(key)
    }

    /// `HKDF-SHA-256(salt = 32 zero bytes, IKM = Z, info = "CTAP2 HMAC key")`
    pub fn derive_hmac_key(z: &[u8; 32]) -> Result<[u8; 32]> {
        hkdf_expand(z, HMAC_INFO)
    }

    /// `HKDF-SHA-256(salt = 32 zero bytes, IKM = Z, info = "CTAP2 AES key")`
    pub fn derive_encryption_key(z: &[u8; 32]) -> Result<[u8; 32]> {
        hkdf_expand(z, AES_INFO)
    }

    /// Full 32-byte HMAC-SHA-256
    pub fn authenticate(key: &[u8], data: &[u8]) -> Result<[u8; 32]> {
        hmac_sha256(key, data)
    }

    /// AES-256-CBC with a random IV; output is `IV || ciphertext`
    pub fn encrypt(key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut iv = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut iv);
        let ciphertext = cbc_encrypt(key, &iv, plaintext)?;

        let mut output = Vec::with_capacity(BLOCK + ciphertext.len());
        output.extend_from_slice(&iv);
        output.extend_from_slice(&ciphertext);
        Ok(output)
    }

    pub fn decrypt(key: &[u8; 32], ciphertext: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.len() < BLOCK {
            return Err(CryptoError::DecryptionFailed);
        }
        let (iv, body) = ciphertext.split_at(BLOCK);
        let mut iv_block = [0u8; 16];
        iv_block.copy_from_slice(iv);
        cbc_decrypt(key, &iv_block, body)
    }
}

/// Keys derived from one ECDH exchange with the authenticator
///
/// Wiped on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret {
    #[zeroize(skip)]
    protocol: PinUvAuthProtocol,
    hmac_key: [u8; 32],
    aes_key: [u8; 32],
}

impl SharedSecret {
    /// Run the protocol's KDF over the ECDH x-coordinate
    pub fn derive(protocol: PinUvAuthProtocol, z: &[u8; 32]) -> Result<Self> {
        let (hmac_key, aes_key) = match protocol {
            PinUvAuthProtocol::V1 => {
                let key = v1::derive_key(z);
                (key, key)
            }
            PinUvAuthProtocol::V2 => (v2::derive_hmac_key(z)?, v2::derive_encryption_key(z)?),
        };
        Ok(Self {
            protocol,
            hmac_key,
            aes_key,
        })
    }

    pub fn protocol(&self) -> PinUvAuthProtocol {
        self.protocol
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        match self.protocol {
            PinUvAuthProtocol::V1 => v1::encrypt(&self.aes_key, plaintext),
            PinUvAuthProtocol::V2 => v2::encrypt(&self.aes_key, plaintext),
        }
    }

    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        match self.protocol {
            PinUvAuthProtocol::V1 => v1::decrypt(&self.aes_key, ciphertext),
            PinUvAuthProtocol::V2 => v2::decrypt(&self.aes_key, ciphertext),
        }
    }

    /// Authenticate `message` under the shared HMAC key
    pub fn authenticate(&self, message: &[u8]) -> Result<Vec<u8>> {
        self.protocol.authenticate(&self.hmac_key, message)
    }
}

impl core::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SharedSecret")
            .field("protocol", &self.protocol)
            .finish_non_exhaustive()
    }
}
