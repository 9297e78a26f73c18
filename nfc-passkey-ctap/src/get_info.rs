//! authenticatorGetInfo response
//!
//! The platform issues getInfo once per session to learn supported
//! algorithms, extensions, PIN/UV protocols and option flags.
//!
//! Spec: <https://fidoalliance.org/specs/fido-v2.2-rd-20230321/fido-client-to-authenticator-protocol-v2.2-rd-20230321.html#authenticatorGetInfo>

use crate::cbor::{MapParser, Value, as_array, as_bool, as_int, as_text, text_entry};
use crate::status::{Result, StatusCode};

/// GetInfo response keys
mod keys {
    pub const VERSIONS: i64 = 0x01;
    pub const EXTENSIONS: i64 = 0x02;
    pub const AAGUID: i64 = 0x03;
    pub const OPTIONS: i64 = 0x04;
    pub const MAX_MSG_SIZE: i64 = 0x05;
    pub const PIN_UV_AUTH_PROTOCOLS: i64 = 0x06;
    pub const MAX_CREDENTIAL_COUNT_IN_LIST: i64 = 0x07;
    pub const MAX_CREDENTIAL_ID_LENGTH: i64 = 0x08;
    pub const TRANSPORTS: i64 = 0x09;
    pub const ALGORITHMS: i64 = 0x0A;
    pub const MAX_SERIALIZED_LARGE_BLOB_ARRAY: i64 = 0x0B;
    pub const FORCE_PIN_CHANGE: i64 = 0x0C;
    pub const MIN_PIN_LENGTH: i64 = 0x0D;
    pub const FIRMWARE_VERSION: i64 = 0x0E;
}

/// ES256, assumed when the authenticator does not list algorithms
pub const DEFAULT_ALGORITHM: i64 = -7;

/// Default maxMsgSize when the authenticator omits it
pub const DEFAULT_MAX_MSG_SIZE: usize = 1024;

/// Option flags reported under getInfo key 0x04
///
/// `None` means the authenticator did not mention the option.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthenticatorOptions {
    pub plat: Option<bool>,
    pub rk: Option<bool>,
    /// `Some(true)`: a PIN is set; `Some(false)`: supported but not set
    pub client_pin: Option<bool>,
    pub up: Option<bool>,
    /// `Some(true)`: built-in UV configured; `Some(false)`: capable but not configured
    pub uv: Option<bool>,
    pub pin_uv_auth_token: Option<bool>,
    pub large_blobs: Option<bool>,
    pub ep: Option<bool>,
    pub always_uv: Option<bool>,
    pub make_cred_uv_not_rqd: Option<bool>,
}

impl AuthenticatorOptions {
    fn from_value(value: &Value) -> Result<Self> {
        let flag = |name: &str| text_entry(value, name).map(as_bool).transpose();
        Ok(Self {
            plat: flag("plat")?,
            rk: flag("rk")?,
            client_pin: flag("clientPin")?,
            up: flag("up")?,
            uv: flag("uv")?,
            pin_uv_auth_token: flag("pinUvAuthToken")?,
            large_blobs: flag("largeBlobs")?,
            ep: flag("ep")?,
            always_uv: flag("alwaysUv")?,
            make_cred_uv_not_rqd: flag("makeCredUvNotRqd")?,
        })
    }
}

/// Decoded authenticatorGetInfo response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthenticatorInfo {
    pub versions: Vec<String>,
    pub extensions: Vec<String>,
    pub aaguid: [u8; 16],
    pub options: AuthenticatorOptions,
    pub max_msg_size: Option<usize>,
    pub pin_uv_auth_protocols: Vec<u8>,
    pub max_credential_count_in_list: Option<usize>,
    pub max_credential_id_length: Option<usize>,
    pub transports: Vec<String>,
    /// COSE algorithm identifiers from the `{type, alg}` entries
    pub algorithms: Option<Vec<i64>>,
    pub max_serialized_large_blob_array: Option<usize>,
    pub force_pin_change: bool,
    pub min_pin_length: Option<usize>,
    pub firmware_version: Option<u64>,
}

fn text_list(value: &Value) -> Result<Vec<String>> {
    as_array(value)?
        .iter()
        .map(|item| as_text(item).map(str::to_string))
        .collect()
}

fn as_usize(value: i64) -> Result<usize> {
    usize::try_from(value).map_err(|_| StatusCode::InvalidParameter)
}

impl AuthenticatorInfo {
    /// Parse the CBOR payload that follows the status byte
    pub fn from_cbor(data: &[u8]) -> Result<Self> {
        let parser = MapParser::from_bytes(data)?;

        let versions = parser
            .get_value(keys::VERSIONS)
            .ok_or(StatusCode::MissingParameter)
            .and_then(text_list)?;

        let extensions = parser
            .get_value(keys::EXTENSIONS)
            .map(text_list)
            .transpose()?
            .unwrap_or_default();

        let aaguid_bytes = parser.get_bytes(keys::AAGUID)?;
        let aaguid: [u8; 16] = aaguid_bytes
            .as_slice()
            .try_into()
            .map_err(|_| StatusCode::InvalidLength)?;

        let options = parser
            .get_value(keys::OPTIONS)
            .map(AuthenticatorOptions::from_value)
            .transpose()?
            .unwrap_or_default();

        let pin_uv_auth_protocols = match parser.get_value(keys::PIN_UV_AUTH_PROTOCOLS) {
            Some(value) => as_array(value)?
                .iter()
                .map(|p| as_int(p).and_then(|p| u8::try_from(p).map_err(|_| StatusCode::InvalidParameter)))
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };

        let transports = parser
            .get_value(keys::TRANSPORTS)
            .map(text_list)
            .transpose()?
            .unwrap_or_default();

        // Entries are PublicKeyCredentialParameters maps; unknown types are skipped
        let algorithms = match parser.get_value(keys::ALGORITHMS) {
            Some(value) => {
                let mut algs = Vec::new();
                for entry in as_array(value)? {
                    let is_public_key = text_entry(entry, "type")
                        .map(as_text)
                        .transpose()?
                        == Some("public-key");
                    if let (true, Some(alg)) = (is_public_key, text_entry(entry, "alg")) {
                        algs.push(as_int(alg)?);
                    }
                }
                Some(algs)
            }
            None => None,
        };

        let opt_usize = |key| -> Result<Option<usize>> {
            parser.get_int_opt(key)?.map(as_usize).transpose()
        };

        Ok(Self {
            versions,
            extensions,
            aaguid,
            options,
            max_msg_size: opt_usize(keys::MAX_MSG_SIZE)?,
            pin_uv_auth_protocols,
            max_credential_count_in_list: opt_usize(keys::MAX_CREDENTIAL_COUNT_IN_LIST)?,
            max_credential_id_length: opt_usize(keys::MAX_CREDENTIAL_ID_LENGTH)?,
            transports,
            algorithms,
            max_serialized_large_blob_array: opt_usize(keys::MAX_SERIALIZED_LARGE_BLOB_ARRAY)?,
            force_pin_change: parser.get_bool_opt(keys::FORCE_PIN_CHANGE)?.unwrap_or(false),
            min_pin_length: opt_usize(keys::MIN_PIN_LENGTH)?,
            firmware_version: parser
                .get_int_opt(keys::FIRMWARE_VERSION)?
                .and_then(|v| u64::try_from(v).ok()),
        })
    }

    /// Algorithms the authenticator accepts, defaulting to ES256
    pub fn supported_algorithms(&self) -> Vec<i64> {
        self.algorithms
            .clone()
            .unwrap_or_else(|| vec![DEFAULT_ALGORITHM])
    }

    pub fn supports_algorithm(&self, alg: i64) -> bool {
        match &self.algorithms {
            Some(algs) => algs.contains(&alg),
            None => alg == DEFAULT_ALGORITHM,
        }
    }

    pub fn supports_extension(&self, id: &str) -> bool {
        self.extensions.iter().any(|e| e == id)
    }

    pub fn supports_version(&self, version: &str) -> bool {
        self.versions.iter().any(|v| v == version)
    }

    /// CTAP 2.1 token commands with permissions are available
    pub fn has_pin_uv_auth_token(&self) -> bool {
        self.options.pin_uv_auth_token == Some(true)
    }

    pub fn pin_is_set(&self) -> bool {
        self.options.client_pin == Some(true)
    }

    pub fn uv_configured(&self) -> bool {
        self.options.uv == Some(true)
    }

    pub fn supports_resident_keys(&self) -> bool {
        self.options.rk == Some(true)
    }

    pub fn supports_large_blobs(&self) -> bool {
        self.options.large_blobs == Some(true)
    }

    pub fn max_msg_size(&self) -> usize {
        self.max_msg_size.unwrap_or(DEFAULT_MAX_MSG_SIZE)
    }

    /// Pick a PIN/UV auth protocol, honouring `preferred` when listed
    ///
    /// Authenticators that predate the field implicitly speak protocol one.
    pub fn select_pin_protocol(&self, preferred: u8) -> Option<u8> {
        if self.pin_uv_auth_protocols.is_empty() {
            return Some(1);
        }
        if self.pin_uv_auth_protocols.contains(&preferred) {
            return Some(preferred);
        }
        self.pin_uv_auth_protocols
            .iter()
            .copied()
            .find(|p| matches!(p, 1 | 2))
    }
}
