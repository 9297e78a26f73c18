//! Credential materialization
//!
//! Decodes authenticatorMakeCredential / authenticatorGetAssertion responses
//! into credential records and renders their canonical JSON form: sorted
//! keys, binary fields as unpadded base64url.

use crate::encoding::b64url;
use crate::error::{Error, Result};
use crate::extensions::PrfOutputs;
use crate::options::{AttestationConveyance, CreationExtensions, CredentialDescriptor};

use nfc_passkey_ctap::cbor::{self, Value, encode_value};
use nfc_passkey_ctap::extensions::ext_ids;
use nfc_passkey_ctap::{AuthenticatorData, CoseKey, MapParser, TextMapBuilder};

use serde_json::{Map, Value as Json, json};
use sha2::{Digest, Sha256};

const PUBLIC_KEY: &str = "public-key";
const CROSS_PLATFORM: &str = "cross-platform";
const TRANSPORT_NFC: &str = "nfc";

mod make_credential_resp {
    pub const FMT: i64 = 0x01;
    pub const AUTH_DATA: i64 = 0x02;
    pub const ATT_STMT: i64 = 0x03;
    pub const EP_ATT: i64 = 0x04;
    pub const LARGE_BLOB_KEY: i64 = 0x05;
}

mod get_assertion_resp {
    pub const CREDENTIAL: i64 = 0x01;
    pub const AUTH_DATA: i64 = 0x02;
    pub const SIGNATURE: i64 = 0x03;
    pub const USER: i64 = 0x04;
    pub const NUMBER_OF_CREDENTIALS: i64 = 0x05;
    pub const LARGE_BLOB_KEY: i64 = 0x07;
}

/// Decoded makeCredential response
#[derive(Debug, Clone)]
pub(crate) struct MakeCredentialResponse {
    pub fmt: String,
    pub auth_data: AuthenticatorData,
    pub att_stmt: Value,
    pub ep_att: bool,
    pub large_blob_key: Option<Vec<u8>>,
}

/// Decoded getAssertion / getNextAssertion response
#[derive(Debug, Clone)]
pub(crate) struct AssertionResponse {
    pub credential_id: Option<Vec<u8>>,
    pub auth_data: AuthenticatorData,
    pub signature: Vec<u8>,
    pub user_handle: Option<Vec<u8>>,
    pub number_of_credentials: Option<usize>,
    pub large_blob_key: Option<Vec<u8>>,
}

fn parse_auth_data(bytes: &[u8], rp_id: &str) -> Result<AuthenticatorData> {
    let auth_data =
        AuthenticatorData::parse(bytes).map_err(|_| Error::MalformedResponse("authData"))?;
    if auth_data.rp_id_hash[..] != Sha256::digest(rp_id.as_bytes())[..] {
        return Err(Error::MalformedResponse("rpIdHash"));
    }
    Ok(auth_data)
}

pub(crate) fn decode_registration(body: &[u8], rp_id: &str) -> Result<MakeCredentialResponse> {
    use make_credential_resp as k;

    let mut parser =
        MapParser::from_bytes(body).map_err(|_| Error::MalformedResponse("makeCredential"))?;
    let fmt = parser
        .get_text(k::FMT)
        .map_err(|_| Error::MalformedResponse("fmt"))?;
    let auth_data = parser
        .get_bytes(k::AUTH_DATA)
        .map_err(|_| Error::MalformedResponse("authData"))?;
    let auth_data = parse_auth_data(&auth_data, rp_id)?;
    if auth_data.attested_credential.is_none() {
        return Err(Error::MalformedResponse("attestedCredentialData"));
    }

    let att_stmt = parser
        .take_value(k::ATT_STMT)
        .filter(|v| matches!(v, Value::Map(_)))
        .ok_or(Error::MalformedResponse("attStmt"))?;
    let ep_att = parser
        .get_bool_opt(k::EP_ATT)
        .map_err(|_| Error::MalformedResponse("epAtt"))?
        .unwrap_or(false);
    let large_blob_key = parser
        .get_bytes_opt(k::LARGE_BLOB_KEY)
        .map_err(|_| Error::MalformedResponse("largeBlobKey"))?;

    Ok(MakeCredentialResponse {
        fmt,
        auth_data,
        att_stmt,
        ep_att,
        large_blob_key,
    })
}

pub(crate) fn decode_assertion(body: &[u8], rp_id: &str) -> Result<AssertionResponse> {
    use get_assertion_resp as k;

    let parser =
        MapParser::from_bytes(body).map_err(|_| Error::MalformedResponse("getAssertion"))?;

    // credential and user are text-keyed maps
    let credential_id = match parser.get_value(k::CREDENTIAL) {
        Some(credential) => Some(
            cbor::text_entry(credential, "id")
                .and_then(|id| cbor::as_bytes(id).ok())
                .filter(|id| !id.is_empty())
                .ok_or(Error::MalformedResponse("credential"))?
                .to_vec(),
        ),
        None => None,
    };
    let user_handle = match parser.get_value(k::USER) {
        Some(user) => Some(
            cbor::text_entry(user, "id")
                .and_then(|id| cbor::as_bytes(id).ok())
                .ok_or(Error::MalformedResponse("user"))?
                .to_vec(),
        ),
        None => None,
    };

    let auth_data = parser
        .get_bytes(k::AUTH_DATA)
        .map_err(|_| Error::MalformedResponse("authData"))?;
    let auth_data = parse_auth_data(&auth_data, rp_id)?;
    let signature = parser
        .get_bytes(k::SIGNATURE)
        .ok()
        .filter(|sig| !sig.is_empty())
        .ok_or(Error::MalformedResponse("signature"))?;
    let number_of_credentials = parser
        .get_int_opt(k::NUMBER_OF_CREDENTIALS)
        .ok()
        .flatten()
        .and_then(|n| usize::try_from(n).ok());
    let large_blob_key = parser
        .get_bytes_opt(k::LARGE_BLOB_KEY)
        .map_err(|_| Error::MalformedResponse("largeBlobKey"))?;

    Ok(AssertionResponse {
        credential_id,
        auth_data,
        signature,
        user_handle,
        number_of_credentials,
        large_blob_key,
    })
}

/// `clientExtensionResults` of a registration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationExtensionResults {
    pub prf_enabled: Option<bool>,
    pub large_blob_supported: Option<bool>,
    pub cred_props_rk: Option<bool>,
}

impl RegistrationExtensionResults {
    fn to_json(&self) -> Json {
        let mut results = Map::new();
        if let Some(enabled) = self.prf_enabled {
            results.insert("prf".into(), json!({ "enabled": enabled }));
        }
        if let Some(supported) = self.large_blob_supported {
            results.insert("largeBlob".into(), json!({ "supported": supported }));
        }
        if let Some(rk) = self.cred_props_rk {
            results.insert("credProps".into(), json!({ "rk": rk }));
        }
        Json::Object(results)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LargeBlobOutput {
    /// Read requested; `None` when no entry opened under the credential's key
    Blob(Option<Vec<u8>>),
    Written(bool),
}

/// `clientExtensionResults` of an assertion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssertionExtensionResults {
    pub prf: Option<PrfOutputs>,
    pub large_blob: Option<LargeBlobOutput>,
}

impl AssertionExtensionResults {
    fn to_json(&self) -> Json {
        let mut results = Map::new();
        if let Some(prf) = &self.prf {
            let mut outputs = Map::new();
            outputs.insert("first".into(), Json::String(b64url(&prf.first)));
            if let Some(second) = &prf.second {
                outputs.insert("second".into(), Json::String(b64url(second)));
            }
            results.insert("prf".into(), json!({ "results": outputs }));
        }
        match &self.large_blob {
            Some(LargeBlobOutput::Blob(Some(blob))) => {
                results.insert("largeBlob".into(), json!({ "blob": b64url(blob) }));
            }
            Some(LargeBlobOutput::Blob(None)) => {
                results.insert("largeBlob".into(), json!({}));
            }
            Some(LargeBlobOutput::Written(written)) => {
                results.insert("largeBlob".into(), json!({ "written": written }));
            }
            None => {}
        }
        Json::Object(results)
    }
}

/// Result of a registration ceremony
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyCredential {
    pub raw_id: Vec<u8>,
    pub client_data_json: Vec<u8>,
    pub attestation_object: Vec<u8>,
    pub authenticator_data: Vec<u8>,
    /// SubjectPublicKeyInfo DER, when the algorithm has one
    pub public_key: Option<Vec<u8>>,
    pub public_key_algorithm: i64,
    pub transports: Vec<String>,
    pub aaguid: [u8; 16],
    pub client_extension_results: RegistrationExtensionResults,
}

impl PublicKeyCredential {
    pub fn id(&self) -> String {
        b64url(&self.raw_id)
    }

    pub fn to_json(&self) -> Json {
        let mut response = Map::new();
        response.insert("clientDataJSON".into(), Json::String(b64url(&self.client_data_json)));
        response.insert("attestationObject".into(), Json::String(b64url(&self.attestation_object)));
        response.insert("authenticatorData".into(), Json::String(b64url(&self.authenticator_data)));
        if let Some(public_key) = &self.public_key {
            response.insert("publicKey".into(), Json::String(b64url(public_key)));
        }
        response.insert("publicKeyAlgorithm".into(), json!(self.public_key_algorithm));
        response.insert("transports".into(), json!(self.transports));

        json!({
            "id": self.id(),
            "rawId": self.id(),
            "type": PUBLIC_KEY,
            "authenticatorAttachment": CROSS_PLATFORM,
            "response": response,
            "clientExtensionResults": self.client_extension_results.to_json(),
        })
    }

    /// Compact canonical JSON
    pub fn to_json_string(&self) -> String {
        self.to_json().to_string()
    }
}

/// Result of an authentication ceremony
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertionCredential {
    pub raw_id: Vec<u8>,
    pub client_data_json: Vec<u8>,
    pub authenticator_data: Vec<u8>,
    pub signature: Vec<u8>,
    pub user_handle: Option<Vec<u8>>,
    pub client_extension_results: AssertionExtensionResults,
}

impl AssertionCredential {
    pub fn id(&self) -> String {
        b64url(&self.raw_id)
    }

    pub fn to_json(&self) -> Json {
        let mut response = Map::new();
        response.insert("clientDataJSON".into(), Json::String(b64url(&self.client_data_json)));
        response.insert("authenticatorData".into(), Json::String(b64url(&self.authenticator_data)));
        response.insert("signature".into(), Json::String(b64url(&self.signature)));
        if let Some(user_handle) = &self.user_handle {
            response.insert("userHandle".into(), Json::String(b64url(user_handle)));
        }

        json!({
            "id": self.id(),
            "rawId": self.id(),
            "type": PUBLIC_KEY,
            "authenticatorAttachment": CROSS_PLATFORM,
            "response": response,
            "clientExtensionResults": self.client_extension_results.to_json(),
        })
    }

    pub fn to_json_string(&self) -> String {
        self.to_json().to_string()
    }
}

/// Canonical `{"fmt", "attStmt", "authData"}`
fn attestation_object(fmt: &str, att_stmt: &Value, auth_data: &[u8]) -> Result<Vec<u8>> {
    let att_stmt = encode_value(att_stmt).map_err(Error::encoding)?;
    TextMapBuilder::new()
        .insert("fmt", fmt)
        .and_then(|b| b.insert_raw("attStmt", att_stmt).insert_bytes("authData", auth_data))
        .and_then(TextMapBuilder::build)
        .map_err(Error::encoding)
}

pub(crate) fn registration_from(
    response: MakeCredentialResponse,
    client_data_json: Vec<u8>,
    attestation: AttestationConveyance,
    extensions: &CreationExtensions,
    rk: bool,
) -> Result<PublicKeyCredential> {
    let attested = response
        .auth_data
        .attested_credential
        .as_ref()
        .ok_or(Error::MalformedResponse("attestedCredentialData"))?;

    let key_map = MapParser::from_bytes(&attested.public_key)
        .map_err(|_| Error::MalformedResponse("credentialPublicKey"))?;
    if !key_map.contains_key(3) {
        return Err(Error::MalformedResponse("credentialPublicKey"));
    }
    let public_key = CoseKey::from_parser(&key_map)
        .and_then(|key| key.validate().map(|()| key))
        .map_err(|_| Error::MalformedResponse("credentialPublicKey"))?;

    let attestation_object = match attestation {
        AttestationConveyance::None => {
            attestation_object("none", &Value::Map(Vec::new()), response.auth_data.as_bytes())?
        }
        _ => attestation_object(&response.fmt, &response.att_stmt, response.auth_data.as_bytes())?,
    };
    if response.ep_att {
        tracing::debug!("Enterprise attestation returned");
    }

    let client_extension_results = RegistrationExtensionResults {
        prf_enabled: extensions.prf.as_ref().map(|_| {
            matches!(
                response.auth_data.extension(ext_ids::HMAC_SECRET),
                Some(Value::Bool(true))
            )
        }),
        large_blob_supported: extensions
            .large_blob
            .map(|_| response.large_blob_key.is_some()),
        cred_props_rk: extensions.cred_props.then_some(rk),
    };

    Ok(PublicKeyCredential {
        raw_id: attested.credential_id.clone(),
        client_data_json,
        attestation_object,
        authenticator_data: response.auth_data.as_bytes().to_vec(),
        public_key: public_key.to_spki_der(),
        public_key_algorithm: public_key.algorithm(),
        transports: vec![TRANSPORT_NFC.to_string()],
        aaguid: attested.aaguid,
        client_extension_results,
    })
}

pub(crate) fn assertion_from(
    response: AssertionResponse,
    client_data_json: Vec<u8>,
    allow_list: &[CredentialDescriptor],
    client_extension_results: AssertionExtensionResults,
) -> Result<AssertionCredential> {
    // The credential may be omitted when the allow list had exactly one entry
    let raw_id = match (response.credential_id, allow_list) {
        (Some(id), _) => id,
        (None, [only]) => only.id.clone(),
        (None, _) => return Err(Error::MalformedResponse("credential")),
    };

    Ok(AssertionCredential {
        raw_id,
        client_data_json,
        authenticator_data: response.auth_data.as_bytes().to_vec(),
        signature: response.signature,
        user_handle: response.user_handle,
        client_extension_results,
    })
}

/// Decode a makeCredential response body (status byte stripped)
pub fn materialize_registration(
    response: &[u8],
    client_data_json: Vec<u8>,
    rp_id: &str,
    attestation: AttestationConveyance,
) -> Result<PublicKeyCredential> {
    let decoded = decode_registration(response, rp_id)?;
    registration_from(
        decoded,
        client_data_json,
        attestation,
        &CreationExtensions::default(),
        false,
    )
}

/// Decode a getAssertion response body (status byte stripped)
pub fn materialize_assertion(
    response: &[u8],
    client_data_json: Vec<u8>,
    rp_id: &str,
    allow_list: &[CredentialDescriptor],
) -> Result<AssertionCredential> {
    let decoded = decode_assertion(response, rp_id)?;
    assertion_from(
        decoded,
        client_data_json,
        allow_list,
        AssertionExtensionResults::default(),
    )
}
