//! COSE_Key handling
//!
//! Two directions: the platform encodes its ephemeral ECDH key as a
//! `keyAgreement` COSE_Key, and decodes/validates the credential public keys
//! and authenticator key-agreement keys it receives.

use crate::cbor::{MapBuilder, MapParser};
use crate::status::{Result, StatusCode};

use nfc_passkey_crypto::ecdh;

pub mod alg {
    pub const ES256: i64 = -7;
    pub const EDDSA: i64 = -8;
    pub const ECDH_ES_HKDF_256: i64 = -25;
    pub const RS256: i64 = -257;
}

pub mod kty {
    pub const OKP: i64 = 1;
    pub const EC2: i64 = 2;
    pub const RSA: i64 = 3;
}

const CRV_P256: i64 = 1;
const CRV_ED25519: i64 = 6;

/// DER prefix of a P-256 SubjectPublicKeyInfo, followed by the 65-byte point
const P256_SPKI_PREFIX: [u8; 26] = [
    0x30, 0x59, 0x30, 0x13, 0x06, 0x07, 0x2a, 0x86, 0x48, 0xce, 0x3d, 0x02, 0x01, 0x06, 0x08,
    0x2a, 0x86, 0x48, 0xce, 0x3d, 0x03, 0x01, 0x07, 0x03, 0x42, 0x00,
];

/// DER prefix of an Ed25519 SubjectPublicKeyInfo, followed by the 32-byte key
const ED25519_SPKI_PREFIX: [u8; 12] = [
    0x30, 0x2a, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x03, 0x21, 0x00,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoseKey {
    Ec2 {
        alg: i64,
        crv: i64,
        x: Vec<u8>,
        y: Vec<u8>,
    },
    Okp {
        alg: i64,
        crv: i64,
        x: Vec<u8>,
    },
    Rsa {
        alg: i64,
        n: Vec<u8>,
        e: Vec<u8>,
    },
}

impl CoseKey {
    /// Platform key-agreement key: kty EC2, alg ECDH-ES+HKDF-256, crv P-256
    pub fn key_agreement(x: [u8; 32], y: [u8; 32]) -> Self {
        Self::Ec2 {
            alg: alg::ECDH_ES_HKDF_256,
            crv: CRV_P256,
            x: x.to_vec(),
            y: y.to_vec(),
        }
    }

    pub fn from_cbor(data: &[u8]) -> Result<Self> {
        Self::from_parser(&MapParser::from_bytes(data)?)
    }

    pub fn from_parser(parser: &MapParser) -> Result<Self> {
        let key_type = parser.get_int(1)?;
        // alg is optional on key-agreement keys
        let algorithm = parser.get_int_opt(3)?.unwrap_or(alg::ECDH_ES_HKDF_256);
        match key_type {
            kty::EC2 => Ok(Self::Ec2 {
                alg: algorithm,
                crv: parser.get_int(-1)?,
                x: parser.get_bytes(-2)?,
                y: parser.get_bytes(-3)?,
            }),
            kty::OKP => Ok(Self::Okp {
                alg: algorithm,
                crv: parser.get_int(-1)?,
                x: parser.get_bytes(-2)?,
            }),
            kty::RSA => Ok(Self::Rsa {
                alg: algorithm,
                n: parser.get_bytes(-1)?,
                e: parser.get_bytes(-2)?,
            }),
            _ => Err(StatusCode::UnsupportedAlgorithm),
        }
    }

    pub fn to_cbor(&self) -> Result<Vec<u8>> {
        match self {
            Self::Ec2 { alg, crv, x, y } => MapBuilder::new()
                .insert(1, kty::EC2)?
                .insert(3, alg)?
                .insert(-1, crv)?
                .insert_bytes(-2, x)?
                .insert_bytes(-3, y)?
                .build(),
            Self::Okp { alg, crv, x } => MapBuilder::new()
                .insert(1, kty::OKP)?
                .insert(3, alg)?
                .insert(-1, crv)?
                .insert_bytes(-2, x)?
                .build(),
            Self::Rsa { alg, n, e } => MapBuilder::new()
                .insert(1, kty::RSA)?
                .insert(3, alg)?
                .insert_bytes(-1, n)?
                .insert_bytes(-2, e)?
                .build(),
        }
    }

    pub fn algorithm(&self) -> i64 {
        match self {
            Self::Ec2 { alg, .. } | Self::Okp { alg, .. } | Self::Rsa { alg, .. } => *alg,
        }
    }

    /// Structural and curve checks on a credential public key
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Ec2 { crv, x, y, .. } => {
                if *crv != CRV_P256 {
                    return Err(StatusCode::UnsupportedAlgorithm);
                }
                ecdh::validate_point(x, y).map_err(StatusCode::from)
            }
            Self::Okp { crv, x, .. } => {
                if *crv != CRV_ED25519 {
                    return Err(StatusCode::UnsupportedAlgorithm);
                }
                if x.len() != 32 {
                    return Err(StatusCode::InvalidLength);
                }
                Ok(())
            }
            Self::Rsa { n, e, .. } => {
                if n.len() < 256 || e.is_empty() {
                    return Err(StatusCode::InvalidLength);
                }
                Ok(())
            }
        }
    }

    /// SubjectPublicKeyInfo DER for keys WebAuthn's `getPublicKey()` can express
    ///
    /// RSA keys return `None`; building their DER needs a full ASN.1 encoder.
    pub fn to_spki_der(&self) -> Option<Vec<u8>> {
        match self {
            Self::Ec2 { crv, x, y, .. } if *crv == CRV_P256 && x.len() == 32 && y.len() == 32 => {
                let mut der = P256_SPKI_PREFIX.to_vec();
                der.push(0x04);
                der.extend_from_slice(x);
                der.extend_from_slice(y);
                Some(der)
            }
            Self::Okp { crv, x, .. } if *crv == CRV_ED25519 && x.len() == 32 => {
                let mut der = ED25519_SPKI_PREFIX.to_vec();
                der.extend_from_slice(x);
                Some(der)
            }
            _ => None,
        }
    }
}
