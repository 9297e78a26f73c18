//! In-memory NFC authenticator for integration tests
//!
//! Speaks ISO 7816 framing (SELECT, command chaining, GET RESPONSE) and
//! enough CTAP2 to drive the client: getInfo, clientPin with real PIN/UV
//! protocol crypto, makeCredential, getAssertion/getNextAssertion with
//! hmac-secret, and authenticatorLargeBlobs.

#![allow(dead_code)]

use nfc_passkey::{ClientConfig, WebAuthnClient};
use nfc_passkey_crypto::ecdh::KeyPair;
use nfc_passkey_crypto::{PinUvAuthProtocol, SharedSecret};
use nfc_passkey_ctap::cbor::{self, Value, as_array, as_bytes, as_text, encode_array, text_entry};
use nfc_passkey_ctap::{CoseKey, MapBuilder, MapParser, TextMapBuilder};
use nfc_passkey_transport::{Channel, Error, Result};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use serde_json::{Value as Json, json};
use sha2::{Digest, Sha256};

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const RP_ID: &str = "example.com";
pub const PIN: &str = "123456";
pub const AAGUID: [u8; 16] = [0x42; 16];

/// 32 zero bytes, base64url
pub const ZERO_CHALLENGE: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

/// Response chunk size before falling back to GET RESPONSE
const CHUNK: usize = 250;

const OK: u8 = 0x00;
const ERR_INVALID_PARAMETER: u8 = 0x02;
const ERR_LIMIT_EXCEEDED: u8 = 0x15;
const ERR_CREDENTIAL_EXCLUDED: u8 = 0x19;
const ERR_UNSUPPORTED_ALGORITHM: u8 = 0x26;
const ERR_INVALID_OPTION: u8 = 0x2C;
const ERR_NO_CREDENTIALS: u8 = 0x2E;
const ERR_NOT_ALLOWED: u8 = 0x30;
const ERR_PIN_INVALID: u8 = 0x31;
const ERR_PIN_BLOCKED: u8 = 0x32;
const ERR_PIN_AUTH_INVALID: u8 = 0x33;
const ERR_PUAT_REQUIRED: u8 = 0x36;
const ERR_INTEGRITY_FAILURE: u8 = 0x3D;

/// Capabilities advertised in getInfo
#[derive(Debug, Clone)]
pub struct FakeConfig {
    /// `None` omits the algorithms field
    pub algorithms: Option<Vec<i64>>,
    /// `Some` means clientPin is supported and set
    pub pin: Option<String>,
    pub uv: bool,
    pub token_api: bool,
    pub rk: bool,
    pub hmac_secret: bool,
    pub large_blobs: bool,
    pub ep: bool,
    pub protocols: Vec<u8>,
    pub max_msg_size: usize,
    /// Every APDU stalls for the full timeout
    pub hang: bool,
    /// Status returned by getPinUvAuthTokenUsingUvWithPermissions
    pub uv_error: Option<u8>,
    pub max_credential_count_in_list: Option<usize>,
    pub max_credential_id_length: Option<usize>,
    pub min_pin_length: Option<usize>,
    pub force_pin_change: bool,
    /// Overrides numberOfCredentials in the first assertion
    pub reported_credential_count: Option<usize>,
}

impl Default for FakeConfig {
    fn default() -> Self {
        Self {
            algorithms: Some(vec![-7]),
            pin: Some(PIN.to_string()),
            uv: false,
            token_api: true,
            rk: true,
            hmac_secret: true,
            large_blobs: true,
            ep: false,
            protocols: vec![2, 1],
            max_msg_size: 1200,
            hang: false,
            uv_error: None,
            max_credential_count_in_list: None,
            max_credential_id_length: None,
            min_pin_length: None,
            force_pin_change: false,
            reported_credential_count: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoredCredential {
    pub id: Vec<u8>,
    pub rp_id: String,
    pub user_id: Vec<u8>,
    pub resident: bool,
    pub cred_random: [u8; 32],
    pub large_blob_key: [u8; 32],
}

struct PinToken {
    token: [u8; 32],
    protocol: PinUvAuthProtocol,
    permissions: u8,
}

struct State {
    config: FakeConfig,
    retries: u8,
    key_agreement: Option<KeyPair>,
    pin_token: Option<PinToken>,
    credentials: Vec<StoredCredential>,
    incoming: Vec<u8>,
    outgoing: Vec<u8>,
    next_assertions: VecDeque<Vec<u8>>,
    large_blob_array: Vec<u8>,
    blob_upload: Vec<u8>,
    blob_expected: usize,
    commands: Vec<u8>,
    client_pin_log: Vec<u8>,
    apdus: usize,
}

fn empty_large_blob_array() -> Vec<u8> {
    let mut array = vec![0x80];
    array.extend_from_slice(&Sha256::digest([0x80])[..16]);
    array
}

#[derive(Clone)]
pub struct FakeAuthenticator {
    state: Arc<Mutex<State>>,
}

impl FakeAuthenticator {
    pub fn new(config: FakeConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                config,
                retries: 3,
                key_agreement: None,
                pin_token: None,
                credentials: Vec::new(),
                incoming: Vec::new(),
                outgoing: Vec::new(),
                next_assertions: VecDeque::new(),
                large_blob_array: empty_large_blob_array(),
                blob_upload: Vec::new(),
                blob_expected: 0,
                commands: Vec::new(),
                client_pin_log: Vec::new(),
                apdus: 0,
            })),
        }
    }

    /// A fresh channel to the same authenticator
    pub fn channel(&self) -> FakeChannel {
        FakeChannel {
            state: self.state.clone(),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// CTAP command bytes in the order received
    pub fn commands(&self) -> Vec<u8> {
        self.state.lock().unwrap().commands.clone()
    }

    /// clientPin subcommands in the order received
    pub fn client_pin_log(&self) -> Vec<u8> {
        self.state.lock().unwrap().client_pin_log.clone()
    }

    pub fn apdu_count(&self) -> usize {
        self.state.lock().unwrap().apdus
    }

    pub fn retries(&self) -> u8 {
        self.state.lock().unwrap().retries
    }

    /// Protocol of the last issued pinUvAuthToken
    pub fn token_protocol(&self) -> Option<u8> {
        let state = self.state.lock().unwrap();
        state.pin_token.as_ref().map(|token| token.protocol.as_u8())
    }

    pub fn credentials(&self) -> Vec<StoredCredential> {
        self.state.lock().unwrap().credentials.clone()
    }

    pub fn large_blob_array(&self) -> Vec<u8> {
        self.state.lock().unwrap().large_blob_array.clone()
    }

    pub fn set_large_blob_array(&self, array: Vec<u8>) {
        self.state.lock().unwrap().large_blob_array = array;
    }

    pub fn clear_log(&self) {
        let mut state = self.state.lock().unwrap();
        state.commands.clear();
        state.client_pin_log.clear();
        state.apdus = 0;
    }
}

#[derive(Clone)]
pub struct FakeChannel {
    state: Arc<Mutex<State>>,
    closed: Arc<AtomicBool>,
}

impl FakeChannel {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Channel for FakeChannel {
    fn send(&mut self, apdu: &[u8], timeout: Duration) -> Result<Vec<u8>> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        let mut state = self.state.lock().unwrap();
        state.apdus += 1;
        if state.config.hang {
            drop(state);
            std::thread::sleep(timeout);
            return Err(Error::Timeout);
        }

        let (cla, ins) = (apdu[0], apdu[1]);
        let data = if apdu.len() > 5 {
            let lc = apdu[4] as usize;
            &apdu[5..5 + lc]
        } else {
            &[][..]
        };

        match ins {
            0xA4 => {
                state.incoming.clear();
                state.outgoing.clear();
                Ok(with_sw(b"FIDO_2_0".to_vec(), 0x9000))
            }
            0xC0 => Ok(state.next_chunk()),
            0x10 if cla & 0x10 != 0 => {
                state.incoming.extend_from_slice(data);
                Ok(vec![0x90, 0x00])
            }
            0x10 => {
                state.incoming.extend_from_slice(data);
                let message = std::mem::take(&mut state.incoming);
                let response = state.handle(&message);
                state.outgoing = response;
                Ok(state.next_chunk())
            }
            _ => Ok(vec![0x6D, 0x00]),
        }
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

fn with_sw(mut data: Vec<u8>, sw: u16) -> Vec<u8> {
    data.extend_from_slice(&sw.to_be_bytes());
    data
}

fn status(code: u8) -> Vec<u8> {
    vec![code]
}

fn success(body: Vec<u8>) -> Vec<u8> {
    let mut response = vec![OK];
    response.extend_from_slice(&body);
    response
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; 32] {
    let mut mac = Hmac::<Sha256>::new_from_slice(key).unwrap();
    mac.update(data);
    mac.finalize().into_bytes().into()
}

fn text_bytes(map: &Value, key: &str) -> Option<Vec<u8>> {
    text_entry(map, key).and_then(|v| as_bytes(v).ok()).map(<[u8]>::to_vec)
}

fn text_flag(map: Option<&Value>, key: &str) -> bool {
    matches!(map.and_then(|m| text_entry(m, key)), Some(Value::Bool(true)))
}

impl State {
    fn next_chunk(&mut self) -> Vec<u8> {
        let take = self.outgoing.len().min(CHUNK);
        let chunk: Vec<u8> = self.outgoing.drain(..take).collect();
        match self.outgoing.len() {
            0 => with_sw(chunk, 0x9000),
            rest => with_sw(chunk, 0x6100 | (rest.min(256) % 256) as u16),
        }
    }

    fn handle(&mut self, message: &[u8]) -> Vec<u8> {
        let Some((&command, payload)) = message.split_first() else {
            return status(ERR_INVALID_PARAMETER);
        };
        self.commands.push(command);
        match command {
            0x04 => success(self.get_info()),
            0x06 => self.client_pin(payload),
            0x01 => self.make_credential(payload),
            0x02 => self.get_assertion(payload),
            0x08 => match self.next_assertions.pop_front() {
                Some(body) => success(body),
                None => status(ERR_NOT_ALLOWED),
            },
            0x0C => self.large_blobs(payload),
            _ => status(0x01),
        }
    }

    fn get_info(&self) -> Vec<u8> {
        let config = &self.config;
        let mut extensions = Vec::new();
        if config.hmac_secret {
            extensions.push(cbor::encode_text("hmac-secret"));
        }
        if config.large_blobs {
            extensions.push(cbor::encode_text("largeBlobKey"));
        }
        extensions.push(cbor::encode_text("credProtect"));

        let mut options = TextMapBuilder::new()
            .insert("rk", config.rk)
            .unwrap()
            .insert("up", true)
            .unwrap()
            .insert("clientPin", config.pin.is_some())
            .unwrap();
        if config.uv {
            options = options.insert("uv", true).unwrap();
        }
        if config.token_api {
            options = options.insert("pinUvAuthToken", true).unwrap();
        }
        if config.large_blobs {
            options = options.insert("largeBlobs", true).unwrap();
        }
        if config.ep {
            options = options.insert("ep", true).unwrap();
        }

        let mut builder = MapBuilder::new()
            .insert(1, vec!["FIDO_2_0", "FIDO_2_1"])
            .unwrap()
            .insert_raw(2, encode_array(&extensions))
            .insert_bytes(3, &AAGUID)
            .unwrap()
            .insert_raw(4, options.build().unwrap())
            .insert(5, config.max_msg_size)
            .unwrap()
            .insert(6, &config.protocols)
            .unwrap()
            .insert_opt(7, config.max_credential_count_in_list)
            .unwrap()
            .insert_opt(8, config.max_credential_id_length)
            .unwrap();
        if let Some(algorithms) = &config.algorithms {
            let params: Vec<Vec<u8>> = algorithms
                .iter()
                .map(|alg| {
                    TextMapBuilder::new()
                        .insert("alg", alg)
                        .unwrap()
                        .insert("type", "public-key")
                        .unwrap()
                        .build()
                        .unwrap()
                })
                .collect();
            builder = builder.insert_raw(0x0A, encode_array(&params));
        }
        if config.large_blobs {
            builder = builder.insert(0x0B, 4096).unwrap();
        }
        if config.force_pin_change {
            builder = builder.insert(0x0C, true).unwrap();
        }
        builder = builder.insert_opt(0x0D, config.min_pin_length).unwrap();
        builder.build().unwrap()
    }

    fn shared_secret(&self, protocol: PinUvAuthProtocol, platform_key: &MapParser) -> Option<SharedSecret> {
        let CoseKey::Ec2 { x, y, .. } = CoseKey::from_parser(platform_key).ok()? else {
            return None;
        };
        let z = self.key_agreement.as_ref()?.shared_secret_cose(&x, &y).ok()?;
        SharedSecret::derive(protocol, &z).ok()
    }

    fn client_pin(&mut self, payload: &[u8]) -> Vec<u8> {
        let Ok(parser) = MapParser::from_bytes(payload) else {
            return status(ERR_INVALID_PARAMETER);
        };
        let sub_command = parser.get_int(2).unwrap_or(0) as u8;
        self.client_pin_log.push(sub_command);
        let protocol = parser
            .get_int_opt(1)
            .ok()
            .flatten()
            .and_then(|p| PinUvAuthProtocol::from_u8(p as u8).ok());

        match sub_command {
            0x01 => success(MapBuilder::new().insert(3, self.retries).unwrap().build().unwrap()),
            0x02 => {
                let pair = KeyPair::generate();
                let (x, y) = pair.public_key_cose();
                self.key_agreement = Some(pair);
                let key = CoseKey::key_agreement(x, y).to_cbor().unwrap();
                success(MapBuilder::new().insert_raw(1, key).build().unwrap())
            }
            0x05 | 0x06 | 0x09 => {
                let Some(protocol) = protocol else {
                    return status(ERR_INVALID_PARAMETER);
                };
                let Some(shared) = parser
                    .get_map(3)
                    .ok()
                    .and_then(|key| self.shared_secret(protocol, &key))
                else {
                    return status(ERR_INVALID_PARAMETER);
                };

                if sub_command != 0x06 {
                    if self.retries == 0 {
                        return status(ERR_PIN_BLOCKED);
                    }
                    let Some(expected) = self.config.pin.as_deref() else {
                        return status(ERR_INVALID_PARAMETER);
                    };
                    let pin_hash = parser
                        .get_bytes(6)
                        .ok()
                        .and_then(|enc| shared.decrypt(&enc).ok())
                        .unwrap_or_default();
                    if pin_hash[..] != Sha256::digest(expected.as_bytes())[..16] {
                        self.retries -= 1;
                        self.key_agreement = None;
                        return status(if self.retries == 0 {
                            ERR_PIN_BLOCKED
                        } else {
                            ERR_PIN_INVALID
                        });
                    }
                    self.retries = 3;
                } else if !self.config.uv {
                    return status(ERR_INVALID_OPTION);
                } else if let Some(code) = self.config.uv_error {
                    return status(code);
                }

                let token: [u8; 32] = rand::random();
                let permissions = match sub_command {
                    0x05 => 0x03,
                    _ => parser.get_int_opt(9).ok().flatten().unwrap_or(0) as u8,
                };
                self.pin_token = Some(PinToken {
                    token,
                    protocol,
                    permissions,
                });
                let encrypted = shared.encrypt(&token).unwrap();
                success(MapBuilder::new().insert_bytes(2, &encrypted).unwrap().build().unwrap())
            }
            _ => status(ERR_INVALID_PARAMETER),
        }
    }

    fn over_list_limit(&self, list: &Value) -> bool {
        let entries = as_array(list).unwrap_or_default();
        self.config
            .max_credential_count_in_list
            .is_some_and(|max| entries.len() > max)
            || self.config.max_credential_id_length.is_some_and(|max| {
                entries
                    .iter()
                    .filter_map(|d| text_bytes(d, "id"))
                    .any(|id| id.len() > max)
            })
    }

    /// `Some(true)` on a valid pinUvAuthParam, `Some(false)` on a bad one
    fn check_pin_auth(&self, parser: &MapParser, param_key: i64, message: &[u8], permission: u8) -> Option<bool> {
        let param = parser.get_bytes_opt(param_key).ok().flatten()?;
        let valid = self.pin_token.as_ref().is_some_and(|token| {
            token.permissions & permission != 0
                && token.protocol.authenticate(&token.token, message).ok() == Some(param.clone())
        });
        Some(valid)
    }

    fn auth_data(&self, rp_id: &str, flags: u8, attested: Option<&[u8]>, extensions: Option<Vec<u8>>) -> Vec<u8> {
        let mut data = Sha256::digest(rp_id.as_bytes()).to_vec();
        let mut flags = flags | 0x01;
        if attested.is_some() {
            flags |= 0x40;
        }
        if extensions.is_some() {
            flags |= 0x80;
        }
        data.push(flags);
        data.extend_from_slice(&1u32.to_be_bytes());
        if let Some(attested) = attested {
            data.extend_from_slice(attested);
        }
        if let Some(extensions) = extensions {
            data.extend_from_slice(&extensions);
        }
        data
    }

    fn make_credential(&mut self, payload: &[u8]) -> Vec<u8> {
        let Ok(parser) = MapParser::from_bytes(payload) else {
            return status(ERR_INVALID_PARAMETER);
        };
        let (Ok(hash), Some(rp), Some(user), Some(params)) = (
            parser.get_bytes(1),
            parser.get_value(2),
            parser.get_value(3),
            parser.get_value(4),
        ) else {
            return status(0x14);
        };
        let rp_id = text_entry(rp, "id").and_then(|v| as_text(v).ok()).unwrap_or_default().to_string();
        let user_id = text_bytes(user, "id").unwrap_or_default();

        let supported = self.config.algorithms.clone().unwrap_or_else(|| vec![-7]);
        let Some(alg) = as_array(params)
            .unwrap_or_default()
            .iter()
            .filter_map(|p| text_entry(p, "alg").and_then(|a| cbor::as_int(a).ok()))
            .find(|alg| supported.contains(alg))
        else {
            return status(ERR_UNSUPPORTED_ALGORITHM);
        };

        if let Some(exclude) = parser.get_value(5) {
            if self.over_list_limit(exclude) {
                return status(ERR_LIMIT_EXCEEDED);
            }
            let excluded = as_array(exclude).unwrap_or_default().iter().any(|d| {
                text_bytes(d, "id").is_some_and(|id| self.credentials.iter().any(|c| c.id == id))
            });
            if excluded {
                return status(ERR_CREDENTIAL_EXCLUDED);
            }
        }

        let options = parser.get_value(7);
        let rk = text_flag(options, "rk");
        let uv_option = text_flag(options, "uv");
        if uv_option && !self.config.uv {
            return status(ERR_INVALID_OPTION);
        }

        let mut flags = 0u8;
        match self.check_pin_auth(&parser, 8, &hash, 0x01) {
            Some(true) => flags |= 0x04,
            Some(false) => return status(ERR_PIN_AUTH_INVALID),
            None if self.config.pin.is_some() && rk => return status(ERR_PUAT_REQUIRED),
            None if uv_option => flags |= 0x04,
            None => {}
        }

        let extensions = parser.get_value(6);
        let mut ext_out = TextMapBuilder::new();
        if self.config.hmac_secret && text_flag(extensions, "hmac-secret") {
            ext_out = ext_out.insert("hmac-secret", true).unwrap();
        }
        let want_large_blob_key = self.config.large_blobs && text_flag(extensions, "largeBlobKey");

        let credential = StoredCredential {
            id: rand::random::<[u8; 16]>().to_vec(),
            rp_id: rp_id.clone(),
            user_id,
            resident: rk,
            cred_random: rand::random(),
            large_blob_key: rand::random(),
        };

        let public_key = match alg {
            -8 => CoseKey::Okp {
                alg,
                crv: 6,
                x: rand::random::<[u8; 32]>().to_vec(),
            },
            -257 => CoseKey::Rsa {
                alg,
                n: vec![0xC5; 256],
                e: vec![0x01, 0x00, 0x01],
            },
            _ => {
                let (x, y) = KeyPair::generate().public_key_cose();
                CoseKey::Ec2 {
                    alg,
                    crv: 1,
                    x: x.to_vec(),
                    y: y.to_vec(),
                }
            }
        };
        let mut attested = AAGUID.to_vec();
        attested.extend_from_slice(&(credential.id.len() as u16).to_be_bytes());
        attested.extend_from_slice(&credential.id);
        attested.extend_from_slice(&public_key.to_cbor().unwrap());

        let ext_bytes = (!ext_out.is_empty()).then(|| ext_out.build().unwrap());
        let auth_data = self.auth_data(&rp_id, flags, Some(&attested), ext_bytes);

        let att_stmt = TextMapBuilder::new()
            .insert("alg", -7)
            .unwrap()
            .insert_bytes("sig", &[0x30, 0x45, 0x02, 0x20])
            .unwrap()
            .build()
            .unwrap();
        let mut response = MapBuilder::new()
            .insert(1, "packed")
            .unwrap()
            .insert_bytes(2, &auth_data)
            .unwrap()
            .insert_raw(3, att_stmt);
        if self.config.ep && parser.contains_key(0x0A) {
            response = response.insert(4, true).unwrap();
        }
        if want_large_blob_key {
            response = response.insert_bytes(5, &credential.large_blob_key).unwrap();
        }

        self.credentials.push(credential);
        success(response.build().unwrap())
    }

    fn hmac_secret_output(&self, input: &Value, credential: &StoredCredential) -> Option<Vec<u8>> {
        let parser = MapParser::from_value(input.clone()).ok()?;
        let protocol = PinUvAuthProtocol::from_u8(parser.get_int_opt(4).ok()?.unwrap_or(1) as u8).ok()?;
        let shared = self.shared_secret(protocol, &parser.get_map(1).ok()?)?;
        let salt_enc = parser.get_bytes(2).ok()?;
        if shared.authenticate(&salt_enc).ok()? != parser.get_bytes(3).ok()? {
            return None;
        }
        let salts = shared.decrypt(&salt_enc).ok()?;
        let mut output = Vec::new();
        for salt in salts.chunks(32) {
            output.extend_from_slice(&hmac_sha256(&credential.cred_random, salt));
        }
        shared.encrypt(&output).ok()
    }

    fn assertion_body(
        &self,
        credential: &StoredCredential,
        flags: u8,
        extensions: Option<&Value>,
        count: Option<usize>,
    ) -> Vec<u8> {
        let mut ext_out = TextMapBuilder::new();
        if let Some(input) = extensions.and_then(|e| text_entry(e, "hmac-secret")) {
            if let Some(output) = self.hmac_secret_output(input, credential) {
                ext_out = ext_out.insert_bytes("hmac-secret", &output).unwrap();
            }
        }
        let ext_bytes = (!ext_out.is_empty()).then(|| ext_out.build().unwrap());
        let auth_data = self.auth_data(&credential.rp_id, flags, None, ext_bytes);

        let descriptor = TextMapBuilder::new()
            .insert_bytes("id", &credential.id)
            .unwrap()
            .insert("type", "public-key")
            .unwrap()
            .build()
            .unwrap();
        let mut body = MapBuilder::new()
            .insert_raw(1, descriptor)
            .insert_bytes(2, &auth_data)
            .unwrap()
            .insert_bytes(3, &[0x30, 0x44, 0x02, 0x20, 0x01])
            .unwrap();
        if credential.resident {
            let user = TextMapBuilder::new()
                .insert_bytes("id", &credential.user_id)
                .unwrap()
                .build()
                .unwrap();
            body = body.insert_raw(4, user);
        }
        if let Some(count) = count {
            body = body.insert(5, count).unwrap();
        }
        if self.config.large_blobs && text_flag(extensions, "largeBlobKey") {
            body = body.insert_bytes(7, &credential.large_blob_key).unwrap();
        }
        body.build().unwrap()
    }

    fn get_assertion(&mut self, payload: &[u8]) -> Vec<u8> {
        let Ok(parser) = MapParser::from_bytes(payload) else {
            return status(ERR_INVALID_PARAMETER);
        };
        let (Ok(rp_id), Ok(hash)) = (parser.get_text(1), parser.get_bytes(2)) else {
            return status(0x14);
        };

        let matches: Vec<StoredCredential> = match parser.get_value(3) {
            Some(allow) if self.over_list_limit(allow) => return status(ERR_LIMIT_EXCEEDED),
            Some(allow) => {
                let ids: Vec<Vec<u8>> = as_array(allow)
                    .unwrap_or_default()
                    .iter()
                    .filter_map(|d| text_bytes(d, "id"))
                    .collect();
                self.credentials
                    .iter()
                    .filter(|c| c.rp_id == rp_id && ids.contains(&c.id))
                    .cloned()
                    .collect()
            }
            None => self
                .credentials
                .iter()
                .filter(|c| c.rp_id == rp_id && c.resident)
                .cloned()
                .collect(),
        };
        if matches.is_empty() {
            return status(ERR_NO_CREDENTIALS);
        }

        let uv_option = text_flag(parser.get_value(5), "uv");
        let mut flags = 0u8;
        match self.check_pin_auth(&parser, 6, &hash, 0x02) {
            Some(true) => flags |= 0x04,
            Some(false) => return status(ERR_PIN_AUTH_INVALID),
            None if uv_option && self.config.uv => flags |= 0x04,
            None if uv_option => return status(ERR_INVALID_OPTION),
            None => {}
        }

        let extensions = parser.get_value(4).cloned();
        let count = self
            .config
            .reported_credential_count
            .or((matches.len() > 1).then_some(matches.len()));
        self.next_assertions = matches[1..]
            .iter()
            .map(|c| self.assertion_body(c, flags, extensions.as_ref(), None))
            .collect();
        success(self.assertion_body(&matches[0], flags, extensions.as_ref(), count))
    }

    fn large_blobs(&mut self, payload: &[u8]) -> Vec<u8> {
        let Ok(parser) = MapParser::from_bytes(payload) else {
            return status(ERR_INVALID_PARAMETER);
        };
        let Ok(offset) = parser.get_int(3).map(|o| o as usize) else {
            return status(0x14);
        };

        if let Ok(Some(get)) = parser.get_int_opt(1) {
            let end = (offset + get as usize).min(self.large_blob_array.len());
            let start = offset.min(end);
            let fragment = &self.large_blob_array[start..end];
            return success(MapBuilder::new().insert_bytes(1, fragment).unwrap().build().unwrap());
        }

        let Ok(Some(fragment)) = parser.get_bytes_opt(2) else {
            return status(ERR_INVALID_PARAMETER);
        };
        let mut message = vec![0xff; 32];
        message.extend_from_slice(&[0x0c, 0x00]);
        message.extend_from_slice(&(offset as u32).to_le_bytes());
        message.extend_from_slice(&Sha256::digest(&fragment));
        if self.check_pin_auth(&parser, 5, &message, 0x10) != Some(true) {
            return status(ERR_PIN_AUTH_INVALID);
        }

        if offset == 0 {
            let Ok(length) = parser.get_int(4) else {
                return status(ERR_INVALID_PARAMETER);
            };
            self.blob_expected = length as usize;
            self.blob_upload.clear();
        }
        if offset != self.blob_upload.len() {
            return status(ERR_INVALID_PARAMETER);
        }
        self.blob_upload.extend_from_slice(&fragment);

        if self.blob_upload.len() == self.blob_expected {
            let upload = std::mem::take(&mut self.blob_upload);
            let (array, hash) = upload.split_at(upload.len().saturating_sub(16));
            if Sha256::digest(array)[..16] != *hash {
                return status(ERR_INTEGRITY_FAILURE);
            }
            self.large_blob_array = upload;
        }
        status(OK)
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

pub fn client() -> WebAuthnClient {
    init_tracing();
    WebAuthnClient::new(ClientConfig::default().with_poll_interval(Duration::from_millis(1)))
}

pub fn b64(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

pub fn unb64(text: &str) -> Vec<u8> {
    URL_SAFE_NO_PAD.decode(text).unwrap()
}

pub fn prf_output(cred_random: &[u8; 32], input: &[u8]) -> [u8; 32] {
    hmac_sha256(cred_random, &nfc_passkey_ctap::extensions::prf_salt(input))
}

/// Creation options for `RP_ID` with ES256
pub fn creation_options(user_verification: &str, resident_key: &str) -> Json {
    json!({
        "challenge": ZERO_CHALLENGE,
        "rp": {"id": RP_ID, "name": "Example"},
        "user": {"id": b64(b"user-1"), "name": "alice", "displayName": "Alice"},
        "pubKeyCredParams": [{"type": "public-key", "alg": -7}],
        "authenticatorSelection": {
            "residentKey": resident_key,
            "userVerification": user_verification,
        },
    })
}

pub fn request_options(user_verification: &str, allow: &[&[u8]]) -> Json {
    let allow: Vec<Json> = allow
        .iter()
        .map(|id| json!({"type": "public-key", "id": b64(id)}))
        .collect();
    json!({
        "challenge": ZERO_CHALLENGE,
        "rpId": RP_ID,
        "allowCredentials": allow,
        "userVerification": user_verification,
    })
}
