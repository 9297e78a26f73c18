//! Options normalization
//!
//! Turns the JSON form of `PublicKeyCredentialCreationOptions` /
//! `PublicKeyCredentialRequestOptions` into typed, validated options. All
//! checks here run before any channel traffic.

use crate::challenge::Challenge;
use crate::config::{ClientConfig, ResidentKeyRequirement, UserVerificationRequirement};
use crate::encoding::decode_b64;
use crate::error::{Error, Result};

use nfc_passkey_ctap::TextMapBuilder;
use nfc_passkey_ctap::cbor;

use serde_json::{Map, Value as Json};

use std::collections::BTreeMap;
use std::time::Duration;

const PUBLIC_KEY: &str = "public-key";
const MAX_USER_ID_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelyingParty {
    pub id: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserEntity {
    pub id: Vec<u8>,
    pub name: Option<String>,
    pub display_name: Option<String>,
}

/// A `public-key` credential parameter; other types are dropped while parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PubKeyCredParam {
    pub alg: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialDescriptor {
    pub id: Vec<u8>,
    pub transports: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttestationConveyance {
    #[default]
    None,
    Indirect,
    Direct,
    Enterprise,
}

impl AttestationConveyance {
    pub fn parse(value: &str) -> Self {
        match value {
            "indirect" => Self::Indirect,
            "direct" => Self::Direct,
            "enterprise" => Self::Enterprise,
            _ => Self::None,
        }
    }
}

/// PRF evaluation inputs (`eval.first`, `eval.second`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrfInputs {
    pub first: Vec<u8>,
    pub second: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LargeBlobSupport {
    Required,
    Preferred,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LargeBlobRequest {
    Read,
    Write(Vec<u8>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreationExtensions {
    /// `prf` present; inner value is the optional `eval`
    pub prf: Option<Option<PrfInputs>>,
    pub large_blob: Option<LargeBlobSupport>,
    pub cred_props: bool,
    /// Unrecognized extensions, already CBOR encoded
    pub opaque: BTreeMap<String, Vec<u8>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestExtensions {
    pub prf: Option<PrfInputs>,
    pub large_blob: Option<LargeBlobRequest>,
    pub opaque: BTreeMap<String, Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct CredentialCreationOptions {
    pub rp: RelyingParty,
    pub user: UserEntity,
    pub challenge: Challenge,
    /// Caller order preserved
    pub pub_key_cred_params: Vec<PubKeyCredParam>,
    pub exclude_credentials: Vec<CredentialDescriptor>,
    pub resident_key: ResidentKeyRequirement,
    pub user_verification: UserVerificationRequirement,
    pub extensions: CreationExtensions,
    pub timeout: Duration,
    pub attestation: AttestationConveyance,
}

#[derive(Debug, Clone)]
pub struct CredentialRequestOptions {
    pub challenge: Challenge,
    pub timeout: Duration,
    pub rp_id: Option<String>,
    pub allow_credentials: Vec<CredentialDescriptor>,
    pub user_verification: UserVerificationRequirement,
    pub extensions: RequestExtensions,
}

impl CredentialCreationOptions {
    pub fn from_json(options: &Json, config: &ClientConfig) -> Result<Self> {
        let root = options.as_object().ok_or(Error::InvalidOptions("options"))?;

        let rp = root.get("rp").and_then(Json::as_object);
        let rp_id = rp
            .and_then(|rp| text(rp, "id"))
            .filter(|id| !id.is_empty())
            .ok_or(Error::InvalidEntity("rp.id"))?;
        let rp = RelyingParty {
            id: rp_id.to_string(),
            name: rp.and_then(|rp| text(rp, "name")).map(str::to_string),
        };

        let user = root
            .get("user")
            .and_then(Json::as_object)
            .ok_or(Error::InvalidEntity("user"))?;
        let user_id = text(user, "id")
            .and_then(decode_b64)
            .filter(|id| !id.is_empty() && id.len() <= MAX_USER_ID_LEN)
            .ok_or(Error::InvalidEntity("user.id"))?;
        let user = UserEntity {
            id: user_id,
            name: text(user, "name").map(str::to_string),
            display_name: text(user, "displayName").map(str::to_string),
        };

        let pub_key_cred_params = parse_cred_params(root.get("pubKeyCredParams"))?;
        let challenge = parse_challenge(root)?;
        let exclude_credentials = parse_descriptors(root.get("excludeCredentials"), "excludeCredentials")?;

        let selection = root.get("authenticatorSelection").and_then(Json::as_object);
        let resident_key = match selection {
            Some(sel) => match text(sel, "residentKey") {
                Some(rk) => ResidentKeyRequirement::parse(rk),
                None if sel.get("requireResidentKey").and_then(Json::as_bool) == Some(true) => {
                    ResidentKeyRequirement::Required
                }
                None => config.resident_key,
            },
            None => config.resident_key,
        };
        let user_verification = selection
            .and_then(|sel| text(sel, "userVerification"))
            .map(UserVerificationRequirement::parse)
            .unwrap_or(config.create_user_verification);

        let attestation = text(root, "attestation")
            .map(AttestationConveyance::parse)
            .unwrap_or_default();

        let extensions = match root.get("extensions") {
            Some(Json::Object(ext)) => parse_creation_extensions(ext)?,
            Some(Json::Null) | None => CreationExtensions::default(),
            Some(_) => return Err(Error::InvalidOptions("extensions")),
        };

        Ok(Self {
            rp,
            user,
            challenge,
            pub_key_cred_params,
            exclude_credentials,
            resident_key,
            user_verification,
            extensions,
            timeout: config.effective_timeout(root.get("timeout").and_then(Json::as_u64)),
            attestation,
        })
    }
}

impl CredentialRequestOptions {
    pub fn from_json(options: &Json, config: &ClientConfig) -> Result<Self> {
        let root = options.as_object().ok_or(Error::InvalidOptions("options"))?;

        let challenge = parse_challenge(root)?;
        let rp_id = match root.get("rpId") {
            Some(Json::String(id)) if !id.is_empty() => Some(id.clone()),
            Some(Json::String(_)) | Some(Json::Null) | None => None,
            Some(_) => return Err(Error::InvalidEntity("rpId")),
        };
        let allow_credentials = parse_descriptors(root.get("allowCredentials"), "allowCredentials")?;
        let user_verification = text(root, "userVerification")
            .map(UserVerificationRequirement::parse)
            .unwrap_or(config.get_user_verification);

        let extensions = match root.get("extensions") {
            Some(Json::Object(ext)) => parse_request_extensions(ext)?,
            Some(Json::Null) | None => RequestExtensions::default(),
            Some(_) => return Err(Error::InvalidOptions("extensions")),
        };

        Ok(Self {
            challenge,
            timeout: config.effective_timeout(root.get("timeout").and_then(Json::as_u64)),
            rp_id,
            allow_credentials,
            user_verification,
            extensions,
        })
    }
}

/// Check that `rp_id` is `host` or a registrable suffix of it
pub fn check_rp_id(rp_id: &str, host: &str) -> Result<()> {
    let rp_id = rp_id.to_ascii_lowercase();
    let host = host.to_ascii_lowercase();
    if rp_id == host {
        return Ok(());
    }
    match host.strip_suffix(rp_id.as_str()) {
        // A bare label such as "com" is never a registrable domain
        Some(prefix) if prefix.ends_with('.') && rp_id.contains('.') => Ok(()),
        _ => Err(Error::InvalidEntity("rp.id")),
    }
}

fn text<'a>(map: &'a Map<String, Json>, key: &str) -> Option<&'a str> {
    map.get(key).and_then(Json::as_str)
}

fn parse_challenge(root: &Map<String, Json>) -> Result<Challenge> {
    text(root, "challenge")
        .and_then(Challenge::from_base64)
        .ok_or(Error::InvalidOptions("challenge"))
}

fn parse_cred_params(value: Option<&Json>) -> Result<Vec<PubKeyCredParam>> {
    let entries = value
        .and_then(Json::as_array)
        .filter(|entries| !entries.is_empty())
        .ok_or(Error::InvalidEntity("pubKeyCredParams"))?;

    let mut params = Vec::with_capacity(entries.len());
    for entry in entries {
        let entry = entry
            .as_object()
            .ok_or(Error::InvalidOptions("pubKeyCredParams"))?;
        let alg = entry
            .get("alg")
            .and_then(Json::as_i64)
            .ok_or(Error::InvalidOptions("pubKeyCredParams"))?;
        if text(entry, "type") == Some(PUBLIC_KEY) {
            params.push(PubKeyCredParam { alg });
        }
    }

    if params.is_empty() {
        return Err(Error::UnsupportedAlgorithm);
    }
    Ok(params)
}

fn parse_descriptors(value: Option<&Json>, field: &'static str) -> Result<Vec<CredentialDescriptor>> {
    let entries = match value {
        None | Some(Json::Null) => return Ok(Vec::new()),
        Some(Json::Array(entries)) => entries,
        Some(_) => return Err(Error::InvalidOptions(field)),
    };

    let mut descriptors = Vec::with_capacity(entries.len());
    for entry in entries {
        let entry = entry.as_object().ok_or(Error::InvalidOptions(field))?;
        if text(entry, "type") != Some(PUBLIC_KEY) {
            continue;
        }
        let id = text(entry, "id")
            .and_then(decode_b64)
            .filter(|id| !id.is_empty())
            .ok_or(Error::InvalidOptions(field))?;
        let transports = entry
            .get("transports")
            .and_then(Json::as_array)
            .map(|list| list.iter().filter_map(Json::as_str).map(str::to_string).collect())
            .unwrap_or_default();
        descriptors.push(CredentialDescriptor { id, transports });
    }
    Ok(descriptors)
}

fn parse_prf_eval(prf: &Map<String, Json>) -> Result<Option<PrfInputs>> {
    let eval = match prf.get("eval") {
        None | Some(Json::Null) => return Ok(None),
        Some(Json::Object(eval)) => eval,
        Some(_) => return Err(Error::InvalidOptions("prf")),
    };
    let first = text(eval, "first")
        .and_then(decode_b64)
        .ok_or(Error::InvalidOptions("prf"))?;
    let second = match eval.get("second") {
        None | Some(Json::Null) => None,
        Some(Json::String(s)) => Some(decode_b64(s).ok_or(Error::InvalidOptions("prf"))?),
        Some(_) => return Err(Error::InvalidOptions("prf")),
    };
    Ok(Some(PrfInputs { first, second }))
}

fn parse_creation_extensions(ext: &Map<String, Json>) -> Result<CreationExtensions> {
    let mut out = CreationExtensions::default();
    for (name, value) in ext {
        match name.as_str() {
            "prf" => {
                let prf = value.as_object().ok_or(Error::InvalidOptions("prf"))?;
                out.prf = Some(parse_prf_eval(prf)?);
            }
            "largeBlob" => {
                let blob = value.as_object().ok_or(Error::InvalidOptions("largeBlob"))?;
                if blob.contains_key("read") || blob.contains_key("write") {
                    return Err(Error::InvalidOptions("largeBlob"));
                }
                out.large_blob = match text(blob, "support") {
                    Some("required") => Some(LargeBlobSupport::Required),
                    Some("preferred") => Some(LargeBlobSupport::Preferred),
                    // no `support` member leaves the extension unrequested
                    None => None,
                    Some(_) => return Err(Error::InvalidOptions("largeBlob")),
                };
            }
            "credProps" => {
                out.cred_props = value.as_bool().ok_or(Error::InvalidOptions("credProps"))?;
            }
            _ => {
                out.opaque.insert(name.clone(), json_to_cbor(value)?);
            }
        }
    }
    Ok(out)
}

fn parse_request_extensions(ext: &Map<String, Json>) -> Result<RequestExtensions> {
    let mut out = RequestExtensions::default();
    for (name, value) in ext {
        match name.as_str() {
            "prf" => {
                let prf = value.as_object().ok_or(Error::InvalidOptions("prf"))?;
                out.prf = parse_prf_eval(prf)?;
            }
            "largeBlob" => {
                let blob = value.as_object().ok_or(Error::InvalidOptions("largeBlob"))?;
                let read = match blob.get("read") {
                    None | Some(Json::Null) => false,
                    Some(Json::Bool(read)) => *read,
                    Some(_) => return Err(Error::InvalidOptions("largeBlob")),
                };
                let write = match blob.get("write") {
                    None | Some(Json::Null) => None,
                    Some(Json::String(data)) => {
                        Some(decode_b64(data).ok_or(Error::InvalidOptions("largeBlob"))?)
                    }
                    Some(_) => return Err(Error::InvalidOptions("largeBlob")),
                };
                out.large_blob = match (read, write) {
                    (true, Some(_)) => return Err(Error::InvalidOptions("largeBlob")),
                    (true, None) => Some(LargeBlobRequest::Read),
                    (false, Some(data)) => Some(LargeBlobRequest::Write(data)),
                    (false, None) => None,
                };
            }
            _ => {
                out.opaque.insert(name.clone(), json_to_cbor(value)?);
            }
        }
    }
    Ok(out)
}

/// Canonical CBOR for an arbitrary JSON value
pub fn json_to_cbor(value: &Json) -> Result<Vec<u8>> {
    match value {
        Json::Null => Ok(vec![0xf6]),
        Json::Bool(false) => Ok(vec![0xf4]),
        Json::Bool(true) => Ok(vec![0xf5]),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(cbor::encode_int(i))
            } else if let Some(u) = n.as_u64() {
                cbor::encode(&u).map_err(Error::encoding)
            } else {
                let f = n
                    .as_f64()
                    .ok_or_else(|| Error::EncodingError("unrepresentable number".to_string()))?;
                cbor::encode(&f).map_err(Error::encoding)
            }
        }
        Json::String(s) => Ok(cbor::encode_text(s)),
        Json::Array(items) => {
            let encoded = items.iter().map(json_to_cbor).collect::<Result<Vec<_>>>()?;
            Ok(cbor::encode_array(&encoded))
        }
        Json::Object(map) => {
            let mut builder = TextMapBuilder::new();
            for (key, item) in map {
                builder = builder.insert_raw(key, json_to_cbor(item)?);
            }
            builder.build().map_err(Error::encoding)
        }
    }
}
