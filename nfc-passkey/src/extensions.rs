//! Client extension processing
//!
//! Maps WebAuthn client extensions onto CTAP authenticator extensions:
//! `prf` onto `hmac-secret`, `largeBlob` onto `largeBlobKey`. Extensions
//! the client does not interpret are forwarded only when getInfo lists them.

use crate::error::{Error, Result};
use crate::options::{CreationExtensions, LargeBlobSupport, PrfInputs, RequestExtensions};
use crate::pin::KeyAgreement;

use nfc_passkey_ctap::extensions::{ext_ids, hmac_secret_keys, prf_salt};
use nfc_passkey_ctap::{AuthenticatorInfo, MapBuilder, TextMapBuilder};

use std::collections::BTreeMap;
use zeroize::Zeroizing;

/// PRF results after decryption
#[derive(Clone, PartialEq, Eq)]
pub struct PrfOutputs {
    pub first: Vec<u8>,
    pub second: Option<Vec<u8>>,
}

impl std::fmt::Debug for PrfOutputs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrfOutputs")
            .field("second", &self.second.is_some())
            .finish_non_exhaustive()
    }
}

pub(crate) fn large_blobs_available(info: &AuthenticatorInfo) -> bool {
    info.supports_large_blobs() && info.supports_extension(ext_ids::LARGE_BLOB_KEY)
}

/// Authenticator extension map for makeCredential
pub(crate) fn creation_inputs(info: &AuthenticatorInfo, ext: &CreationExtensions) -> Result<Option<Vec<u8>>> {
    let mut builder = TextMapBuilder::new();

    if ext.prf.is_some() && info.supports_extension(ext_ids::HMAC_SECRET) {
        builder = builder.insert(ext_ids::HMAC_SECRET, true).map_err(Error::encoding)?;
    }
    match ext.large_blob {
        Some(_) if large_blobs_available(info) => {
            builder = builder.insert(ext_ids::LARGE_BLOB_KEY, true).map_err(Error::encoding)?;
        }
        Some(LargeBlobSupport::Required) => return Err(Error::DeviceIneligible),
        _ => {}
    }
    builder = forward_opaque(builder, info, &ext.opaque);

    finish(builder)
}

/// Authenticator extension map for getAssertion
///
/// `hmac_secret` is the already-built hmac-secret input, if PRF is evaluated.
pub(crate) fn request_inputs(
    info: &AuthenticatorInfo,
    ext: &RequestExtensions,
    hmac_secret: Option<Vec<u8>>,
) -> Result<Option<Vec<u8>>> {
    let mut builder = TextMapBuilder::new();

    if let Some(input) = hmac_secret {
        builder = builder.insert_raw(ext_ids::HMAC_SECRET, input);
    }
    if ext.large_blob.is_some() && large_blobs_available(info) {
        builder = builder.insert(ext_ids::LARGE_BLOB_KEY, true).map_err(Error::encoding)?;
    }
    builder = forward_opaque(builder, info, &ext.opaque);

    finish(builder)
}

fn forward_opaque(
    mut builder: TextMapBuilder,
    info: &AuthenticatorInfo,
    opaque: &BTreeMap<String, Vec<u8>>,
) -> TextMapBuilder {
    for (name, value) in opaque {
        if info.supports_extension(name) {
            builder = builder.insert_raw(name, value.clone());
        } else {
            tracing::debug!(extension = %name, "Extension not supported by authenticator, dropped");
        }
    }
    builder
}

fn finish(builder: TextMapBuilder) -> Result<Option<Vec<u8>>> {
    if builder.is_empty() {
        return Ok(None);
    }
    builder.build().map(Some).map_err(Error::encoding)
}

/// hmac-secret input `{1: keyAgreement, 2: saltEnc, 3: saltAuth, 4: protocol}`
pub(crate) fn hmac_secret_input(agreement: &KeyAgreement, prf: &PrfInputs) -> Result<Vec<u8>> {
    let mut salts = Zeroizing::new(prf_salt(&prf.first).to_vec());
    if let Some(second) = &prf.second {
        salts.extend_from_slice(&prf_salt(second));
    }

    let salt_enc = agreement.shared().encrypt(&salts)?;
    let salt_auth = agreement.shared().authenticate(&salt_enc)?;

    MapBuilder::new()
        .insert_raw(hmac_secret_keys::KEY_AGREEMENT, agreement.platform_key_cbor()?)
        .insert_bytes(hmac_secret_keys::SALT_ENC, &salt_enc)
        .and_then(|b| b.insert_bytes(hmac_secret_keys::SALT_AUTH, &salt_auth))
        .and_then(|b| b.insert(hmac_secret_keys::PIN_UV_AUTH_PROTOCOL, agreement.protocol().as_u8()))
        .and_then(MapBuilder::build)
        .map_err(Error::encoding)
}

/// Decrypt the hmac-secret output into PRF results
pub(crate) fn prf_outputs(agreement: &KeyAgreement, encrypted: &[u8], has_second: bool) -> Result<PrfOutputs> {
    let plain = Zeroizing::new(
        agreement
            .shared()
            .decrypt(encrypted)
            .map_err(|_| Error::MalformedResponse("hmac-secret"))?,
    );
    let expected = if has_second { 64 } else { 32 };
    if plain.len() != expected {
        return Err(Error::MalformedResponse("hmac-secret"));
    }
    Ok(PrfOutputs {
        first: plain[..32].to_vec(),
        second: has_second.then(|| plain[32..].to_vec()),
    })
}
