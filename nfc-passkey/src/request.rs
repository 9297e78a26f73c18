//! authenticatorMakeCredential / authenticatorGetAssertion request encoding

use crate::client_data::ClientDataHash;
use crate::error::{Error, Result};
use crate::options::{CredentialDescriptor, RelyingParty, UserEntity};

use nfc_passkey_ctap::cbor::{encode_array, encode_bytes};
use nfc_passkey_ctap::{MapBuilder, TextMapBuilder};

const PUBLIC_KEY: &str = "public-key";

mod make_credential_keys {
    pub const CLIENT_DATA_HASH: i32 = 0x01;
    pub const RP: i32 = 0x02;
    pub const USER: i32 = 0x03;
    pub const PUB_KEY_CRED_PARAMS: i32 = 0x04;
    pub const EXCLUDE_LIST: i32 = 0x05;
    pub const EXTENSIONS: i32 = 0x06;
    pub const OPTIONS: i32 = 0x07;
    pub const PIN_UV_AUTH_PARAM: i32 = 0x08;
    pub const PIN_UV_AUTH_PROTOCOL: i32 = 0x09;
    pub const ENTERPRISE_ATTESTATION: i32 = 0x0A;
}

mod get_assertion_keys {
    pub const RP_ID: i32 = 0x01;
    pub const CLIENT_DATA_HASH: i32 = 0x02;
    pub const ALLOW_LIST: i32 = 0x03;
    pub const EXTENSIONS: i32 = 0x04;
    pub const OPTIONS: i32 = 0x05;
    pub const PIN_UV_AUTH_PARAM: i32 = 0x06;
    pub const PIN_UV_AUTH_PROTOCOL: i32 = 0x07;
}

/// pinUvAuthParam with the protocol that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinUvAuth {
    pub param: Vec<u8>,
    pub protocol: u8,
}

#[derive(Debug, Clone)]
pub struct MakeCredentialRequest<'a> {
    pub client_data_hash: ClientDataHash,
    pub rp: &'a RelyingParty,
    pub user: &'a UserEntity,
    /// Already filtered to what the authenticator supports, caller order
    pub algorithms: Vec<i64>,
    pub exclude_list: &'a [CredentialDescriptor],
    /// Encoded extensions map
    pub extensions: Option<Vec<u8>>,
    pub rk: bool,
    pub uv: bool,
    pub pin_uv_auth: Option<PinUvAuth>,
    pub enterprise_attestation: Option<u8>,
}

impl MakeCredentialRequest<'_> {
    pub fn to_cbor(&self) -> Result<Vec<u8>> {
        use make_credential_keys as k;

        let rp = TextMapBuilder::new()
            .insert("id", self.rp.id.as_str())
            .and_then(|b| b.insert_opt("name", self.rp.name.as_deref()))
            .and_then(TextMapBuilder::build)
            .map_err(Error::encoding)?;
        let user = TextMapBuilder::new()
            .insert_bytes("id", &self.user.id)
            .and_then(|b| b.insert_opt("name", self.user.name.as_deref()))
            .and_then(|b| b.insert_opt("displayName", self.user.display_name.as_deref()))
            .and_then(TextMapBuilder::build)
            .map_err(Error::encoding)?;
        let params = self
            .algorithms
            .iter()
            .map(|alg| {
                TextMapBuilder::new()
                    .insert("alg", alg)
                    .and_then(|b| b.insert("type", PUBLIC_KEY))
                    .and_then(TextMapBuilder::build)
                    .map_err(Error::encoding)
            })
            .collect::<Result<Vec<_>>>()?;

        let mut builder = MapBuilder::new()
            .insert_raw(k::CLIENT_DATA_HASH, encode_bytes(&self.client_data_hash))
            .insert_raw(k::RP, rp)
            .insert_raw(k::USER, user)
            .insert_raw(k::PUB_KEY_CRED_PARAMS, encode_array(&params));

        if !self.exclude_list.is_empty() {
            builder = builder.insert_raw(k::EXCLUDE_LIST, descriptor_list(self.exclude_list)?);
        }
        if let Some(extensions) = &self.extensions {
            builder = builder.insert_raw(k::EXTENSIONS, extensions.clone());
        }
        if let Some(options) = option_map(self.rk.then_some(true), None, self.uv)? {
            builder = builder.insert_raw(k::OPTIONS, options);
        }
        if let Some(auth) = &self.pin_uv_auth {
            builder = builder
                .insert_bytes(k::PIN_UV_AUTH_PARAM, &auth.param)
                .and_then(|b| b.insert(k::PIN_UV_AUTH_PROTOCOL, auth.protocol))
                .map_err(Error::encoding)?;
        }
        builder = builder
            .insert_opt(k::ENTERPRISE_ATTESTATION, self.enterprise_attestation)
            .map_err(Error::encoding)?;

        builder.build().map_err(Error::encoding)
    }
}

#[derive(Debug, Clone)]
pub struct GetAssertionRequest<'a> {
    pub rp_id: &'a str,
    pub client_data_hash: ClientDataHash,
    pub allow_list: &'a [CredentialDescriptor],
    pub extensions: Option<Vec<u8>>,
    pub uv: bool,
    /// `up: false`, for checking which listed credentials are present
    pub silent: bool,
    pub pin_uv_auth: Option<PinUvAuth>,
}

impl GetAssertionRequest<'_> {
    pub fn to_cbor(&self) -> Result<Vec<u8>> {
        use get_assertion_keys as k;

        let mut builder = MapBuilder::new()
            .insert(k::RP_ID, self.rp_id)
            .map_err(Error::encoding)?
            .insert_raw(k::CLIENT_DATA_HASH, encode_bytes(&self.client_data_hash));

        if !self.allow_list.is_empty() {
            builder = builder.insert_raw(k::ALLOW_LIST, descriptor_list(self.allow_list)?);
        }
        if let Some(extensions) = &self.extensions {
            builder = builder.insert_raw(k::EXTENSIONS, extensions.clone());
        }
        if let Some(options) = option_map(None, self.silent.then_some(false), self.uv)? {
            builder = builder.insert_raw(k::OPTIONS, options);
        }
        if let Some(auth) = &self.pin_uv_auth {
            builder = builder
                .insert_bytes(k::PIN_UV_AUTH_PARAM, &auth.param)
                .and_then(|b| b.insert(k::PIN_UV_AUTH_PROTOCOL, auth.protocol))
                .map_err(Error::encoding)?;
        }

        builder.build().map_err(Error::encoding)
    }
}

fn descriptor_list(descriptors: &[CredentialDescriptor]) -> Result<Vec<u8>> {
    let items = descriptors
        .iter()
        .map(|d| {
            let mut entry = TextMapBuilder::new()
                .insert_bytes("id", &d.id)
                .and_then(|b| b.insert("type", PUBLIC_KEY))
                .map_err(Error::encoding)?;
            if !d.transports.is_empty() {
                entry = entry
                    .insert("transports", &d.transports)
                    .map_err(Error::encoding)?;
            }
            entry.build().map_err(Error::encoding)
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(encode_array(&items))
}

/// Options map with only the entries that differ from the defaults
fn option_map(rk: Option<bool>, up: Option<bool>, uv: bool) -> Result<Option<Vec<u8>>> {
    let builder = TextMapBuilder::new()
        .insert_opt("rk", rk)
        .and_then(|b| b.insert_opt("up", up))
        .and_then(|b| b.insert_opt("uv", uv.then_some(true)))
        .map_err(Error::encoding)?;
    if builder.is_empty() {
        return Ok(None);
    }
    builder.build().map(Some).map_err(Error::encoding)
}
