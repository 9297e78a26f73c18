//! P-256 ECDH for PIN/UV auth protocol key agreement
//!
//! The platform generates an ephemeral key pair per session, sends its public
//! half to the authenticator as a COSE_Key and combines it with the
//! authenticator's `keyAgreement` key.
//!
//! <https://fidoalliance.org/specs/fido-v2.2-rd-20230321/fido-client-to-authenticator-protocol-v2.2-rd-20230321.html#sctn-pin-protocol>

use crate::error::{CryptoError, Result};

use p256::{PublicKey, SecretKey, elliptic_curve::sec1::ToEncodedPoint};
use rand::rngs::OsRng;
use zeroize::Zeroizing;

/// Ephemeral P-256 key pair held by the platform for one session
pub struct KeyPair {
    secret: SecretKey,
    public: PublicKey,
}

impl KeyPair {
    /// Generate a fresh key pair from the OS random source
    ///
    /// ```
    /// use nfc_passkey_crypto::ecdh::KeyPair;
    ///
    /// let keypair = KeyPair::generate();
    /// assert_eq!(keypair.public_key_bytes().len(), 65);
    /// ```
    pub fn generate() -> Self {
        let secret = SecretKey::random(&mut OsRng);
        let public = secret.public_key();
        Self { secret, public }
    }

    /// Public key as raw affine coordinates `(x, y)`
    ///
    /// These go into the COSE_Key (kty 2, alg -25, crv 1) sent as `keyAgreement`.
    pub fn public_key_cose(&self) -> ([u8; 32], [u8; 32]) {
        let encoded = self.public_key_bytes();
        let mut x = [0u8; 32];
        let mut y = [0u8; 32];
        x.copy_from_slice(&encoded[1..33]);
        y.copy_from_slice(&encoded[33..65]);
        (x, y)
    }

    /// Public key in uncompressed SEC1 form (`0x04 || x || y`)
    pub fn public_key_bytes(&self) -> Vec<u8> {
        self.public.to_encoded_point(false).as_bytes().to_vec()
    }

    /// ECDH with a peer key in SEC1 form, returning the x-coordinate `Z`
    pub fn shared_secret(&self, peer_public_key: &[u8]) -> Result<Zeroizing<[u8; 32]>> {
        let peer_public = PublicKey::from_sec1_bytes(peer_public_key)
            .map_err(|_| CryptoError::InvalidPublicKey)?;

        let shared =
            p256::ecdh::diffie_hellman(self.secret.to_nonzero_scalar(), peer_public.as_affine());

        let raw = shared.raw_secret_bytes();
        if raw.len() != 32 {
            return Err(CryptoError::KeyAgreementFailed);
        }
        let mut z = Zeroizing::new([0u8; 32]);
        z.copy_from_slice(raw);
        Ok(z)
    }

    /// ECDH with a peer key given as COSE coordinates
    pub fn shared_secret_cose(&self, x: &[u8], y: &[u8]) -> Result<Zeroizing<[u8; 32]>> {
        self.shared_secret(&sec1_from_coordinates(x, y)?)
    }
}

/// Check that `(x, y)` is a point on P-256
///
/// Used when validating EC2 credential public keys returned at registration.
pub fn validate_point(x: &[u8], y: &[u8]) -> Result<()> {
    let encoded = sec1_from_coordinates(x, y)?;
    PublicKey::from_sec1_bytes(&encoded)
        .map(|_| ())
        .map_err(|_| CryptoError::InvalidPublicKey)
}

fn sec1_from_coordinates(x: &[u8], y: &[u8]) -> Result<Vec<u8>> {
    for coordinate in [x, y] {
        if coordinate.len() != 32 {
            return Err(CryptoError::InvalidKeyLength {
                expected: 32,
                actual: coordinate.len(),
            });
        }
    }
    let mut encoded = Vec::with_capacity(65);
    encoded.push(0x04);
    encoded.extend_from_slice(x);
    encoded.extend_from_slice(y);
    Ok(encoded)
}
