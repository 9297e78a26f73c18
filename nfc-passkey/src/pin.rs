//! PIN/UV auth token negotiation
//!
//! Decides how user verification is obtained for an operation (built-in UV,
//! a PIN-derived token, or nothing) and runs the clientPin exchanges:
//! getKeyAgreement, then one of getPinToken / getPinUvAuthTokenUsing*WithPermissions.

use crate::config::UserVerificationRequirement;
use crate::error::{Error, Result};
use crate::session::{Session, SessionState};

use nfc_passkey_crypto::ecdh::KeyPair;
use nfc_passkey_crypto::{PinUvAuthProtocol, SharedSecret};
use nfc_passkey_ctap::command::client_pin_keys as keys;
use nfc_passkey_ctap::{
    AuthenticatorInfo, ClientPinSubCommand, CoseKey, CtapCommand, MapBuilder, MapParser,
    Permissions, SecBytes,
};

use sha2::{Digest, Sha256};
use zeroize::{Zeroize, Zeroizing};

/// CTAP2_ERR_PIN_INVALID
const PIN_INVALID: u8 = 0x31;
const UV_BLOCKED: u8 = 0x3C;
const UV_INVALID: u8 = 0x3F;

/// User PIN, wiped from memory on drop
pub struct Pin(Zeroizing<String>);

impl Pin {
    pub fn new(pin: impl Into<String>) -> Self {
        Self(Zeroizing::new(pin.into()))
    }

    /// Take the PIN from a character buffer and zero the buffer
    pub fn from_chars(chars: &mut [char]) -> Self {
        let pin: String = chars.iter().collect();
        chars.zeroize();
        Self::new(pin)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn code_points(&self) -> usize {
        self.0.chars().count()
    }

    /// `LEFT(SHA-256(pin), 16)`
    fn hash_prefix(&self) -> Zeroizing<[u8; 16]> {
        let digest = Zeroizing::new(<[u8; 32]>::from(Sha256::digest(self.0.as_bytes())));
        let mut prefix = Zeroizing::new([0u8; 16]);
        prefix.copy_from_slice(&digest[..16]);
        prefix
    }
}

impl std::fmt::Debug for Pin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Pin(<redacted>)")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TokenMethod {
    /// getPinUvAuthTokenUsingUvWithPermissions
    Uv,
    /// getPinUvAuthTokenUsingPinWithPermissions
    Pin,
    /// CTAP 2.0 getPinToken
    LegacyPin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UvPlan {
    None,
    /// Ask the authenticator for built-in UV through the `uv` option
    UvOption,
    Token(TokenMethod),
}

/// Choose how user verification is obtained
///
/// `make_credential_rk` is `Some(rk)` for registrations. `force_token`
/// requests a token even when verification is discouraged.
pub(crate) fn plan_user_verification(
    info: &AuthenticatorInfo,
    requirement: UserVerificationRequirement,
    make_credential_rk: Option<bool>,
    force_token: bool,
) -> Result<UvPlan> {
    let always_uv = info.options.always_uv == Some(true);
    let mc_needs_token = make_credential_rk.is_some_and(|rk| {
        info.pin_is_set() && info.options.make_cred_uv_not_rqd != Some(true) && (rk || always_uv)
    });

    let wants_uv = requirement != UserVerificationRequirement::Discouraged
        || always_uv
        || mc_needs_token
        || force_token;
    if !wants_uv {
        return Ok(UvPlan::None);
    }

    if info.uv_configured() {
        return Ok(if info.has_pin_uv_auth_token() {
            UvPlan::Token(TokenMethod::Uv)
        } else {
            UvPlan::UvOption
        });
    }

    if info.pin_is_set() {
        return Ok(UvPlan::Token(if info.has_pin_uv_auth_token() {
            TokenMethod::Pin
        } else {
            TokenMethod::LegacyPin
        }));
    }

    if requirement == UserVerificationRequirement::Required {
        return Err(Error::UserVerificationUnavailable);
    }
    Ok(UvPlan::None)
}

/// Pick the PIN/UV auth protocol both sides speak
pub(crate) fn select_protocol(info: &AuthenticatorInfo, preferred: u8) -> Result<PinUvAuthProtocol> {
    let protocol = info
        .select_pin_protocol(preferred)
        .ok_or(Error::DeviceIneligible)?;
    PinUvAuthProtocol::from_u8(protocol).map_err(|_| Error::DeviceIneligible)
}

/// Shared secret established with getKeyAgreement
#[derive(Debug)]
pub(crate) struct KeyAgreement {
    shared: SharedSecret,
    platform_key: CoseKey,
}

impl KeyAgreement {
    pub(crate) fn negotiate(session: &mut Session<'_>, protocol: PinUvAuthProtocol) -> Result<Self> {
        let request = MapBuilder::new()
            .insert(keys::PIN_UV_AUTH_PROTOCOL, protocol.as_u8())
            .and_then(|b| b.insert(keys::SUB_COMMAND, ClientPinSubCommand::GetKeyAgreement.as_u8()))
            .and_then(MapBuilder::build)
            .map_err(Error::encoding)?;
        let body = session.command(CtapCommand::ClientPin, &request)?;

        let (x, y) = MapParser::from_bytes(&body)
            .and_then(|parser| parser.get_map(keys::RESP_KEY_AGREEMENT))
            .and_then(|key| CoseKey::from_parser(&key))
            .ok()
            .and_then(|key| match key {
                CoseKey::Ec2 { x, y, .. } => Some((x, y)),
                _ => None,
            })
            .ok_or(Error::MalformedResponse("keyAgreement"))?;

        let pair = KeyPair::generate();
        let z = pair
            .shared_secret_cose(&x, &y)
            .map_err(|_| Error::MalformedResponse("keyAgreement"))?;
        let shared = SharedSecret::derive(protocol, &z)?;
        let (px, py) = pair.public_key_cose();

        tracing::debug!(protocol = protocol.as_u8(), "Key agreement established");
        Ok(Self {
            shared,
            platform_key: CoseKey::key_agreement(px, py),
        })
    }

    pub(crate) fn shared(&self) -> &SharedSecret {
        &self.shared
    }

    pub(crate) fn protocol(&self) -> PinUvAuthProtocol {
        self.shared.protocol()
    }

    /// Platform public key as a COSE_Key, for `keyAgreement` parameters
    pub(crate) fn platform_key_cbor(&self) -> Result<Vec<u8>> {
        self.platform_key.to_cbor().map_err(Error::encoding)
    }
}

/// pinUvAuthToken for the current session
#[derive(Debug)]
pub(crate) struct PinUvAuthToken {
    protocol: PinUvAuthProtocol,
    token: SecBytes,
}

impl PinUvAuthToken {
    pub(crate) fn protocol(&self) -> PinUvAuthProtocol {
        self.protocol
    }

    /// pinUvAuthParam over `message`
    pub(crate) fn authenticate(&self, message: &[u8]) -> Result<Vec<u8>> {
        Ok(self
            .token
            .with_bytes(|token| self.protocol.authenticate(token, message))?)
    }
}

/// Run the token subcommand selected by `method`
///
/// A failed or blocked built-in UV falls back to the PIN when one is set on
/// the authenticator and the caller supplied it.
pub(crate) fn obtain_token(
    session: &mut Session<'_>,
    agreement: &KeyAgreement,
    method: TokenMethod,
    pin: Option<&Pin>,
    permissions: Permissions,
    rp_id: &str,
) -> Result<PinUvAuthToken> {
    let result = request_token(session, agreement, method, pin, permissions, rp_id);
    let pin_available = session.info().pin_is_set() && pin.is_some_and(|p| !p.is_empty());
    match result {
        Err(Error::DeviceError(status @ (UV_BLOCKED | UV_INVALID)))
            if method == TokenMethod::Uv && pin_available =>
        {
            tracing::debug!(status, "Built-in UV failed, using PIN");
            request_token(session, agreement, TokenMethod::Pin, pin, permissions, rp_id)
        }
        other => other,
    }
}

fn request_token(
    session: &mut Session<'_>,
    agreement: &KeyAgreement,
    method: TokenMethod,
    pin: Option<&Pin>,
    permissions: Permissions,
    rp_id: &str,
) -> Result<PinUvAuthToken> {
    let protocol = agreement.protocol();
    let mut request = MapBuilder::new()
        .insert(keys::PIN_UV_AUTH_PROTOCOL, protocol.as_u8())
        .map_err(Error::encoding)?
        .insert_raw(keys::KEY_AGREEMENT, agreement.platform_key_cbor()?);

    let sub_command = match method {
        TokenMethod::Uv => ClientPinSubCommand::GetPinUvAuthTokenUsingUvWithPermissions,
        TokenMethod::Pin => ClientPinSubCommand::GetPinUvAuthTokenUsingPinWithPermissions,
        TokenMethod::LegacyPin => ClientPinSubCommand::GetPinToken,
    };
    request = request
        .insert(keys::SUB_COMMAND, sub_command.as_u8())
        .map_err(Error::encoding)?;

    if matches!(method, TokenMethod::Pin | TokenMethod::LegacyPin) {
        let pin = pin.filter(|p| !p.is_empty()).ok_or(Error::PinRequired)?;
        let info = session.info();
        // Rejected locally so a PIN the card would refuse keeps its retry
        if info.force_pin_change || info.min_pin_length.is_some_and(|min| pin.code_points() < min) {
            return Err(Error::PinPolicyViolation);
        }
        let pin_hash_enc = agreement.shared().encrypt(pin.hash_prefix().as_slice())?;
        request = request
            .insert_bytes(keys::PIN_HASH_ENC, &pin_hash_enc)
            .map_err(Error::encoding)?;
    }
    if method != TokenMethod::LegacyPin {
        request = request
            .insert(keys::PERMISSIONS, permissions.bits())
            .and_then(|b| b.insert(keys::RP_ID, rp_id))
            .map_err(Error::encoding)?;
    }
    let request = request.build().map_err(Error::encoding)?;

    let (status, body) = session.transceive(CtapCommand::ClientPin, &request)?;
    match status {
        0x00 => {}
        PIN_INVALID => return Err(pin_invalid(session, protocol)),
        other => return Err(Error::from_ctap_status(other)),
    }

    let encrypted = MapParser::from_bytes(&body)
        .and_then(|parser| parser.get_bytes(keys::RESP_PIN_UV_AUTH_TOKEN))
        .map_err(|_| Error::MalformedResponse("pinUvAuthToken"))?;
    let token = Zeroizing::new(
        agreement
            .shared()
            .decrypt(&encrypted)
            .map_err(|_| Error::MalformedResponse("pinUvAuthToken"))?,
    );
    let valid_len = match protocol {
        PinUvAuthProtocol::V1 => token.len() == 16 || token.len() == 32,
        PinUvAuthProtocol::V2 => token.len() == 32,
    };
    if !valid_len {
        return Err(Error::MalformedResponse("pinUvAuthToken"));
    }

    session.transition(SessionState::PinNegotiated);
    tracing::debug!(?method, permissions = permissions.bits(), "pinUvAuthToken obtained");
    Ok(PinUvAuthToken {
        protocol,
        token: SecBytes::from_slice(&token),
    })
}

/// getPinRetries
pub(crate) fn pin_retries(session: &mut Session<'_>, protocol: PinUvAuthProtocol) -> Result<u8> {
    let request = MapBuilder::new()
        .insert(keys::PIN_UV_AUTH_PROTOCOL, protocol.as_u8())
        .and_then(|b| b.insert(keys::SUB_COMMAND, ClientPinSubCommand::GetPinRetries.as_u8()))
        .and_then(MapBuilder::build)
        .map_err(Error::encoding)?;
    let body = session.command(CtapCommand::ClientPin, &request)?;
    MapParser::from_bytes(&body)
        .and_then(|parser| parser.get_int(keys::RESP_PIN_RETRIES))
        .ok()
        .and_then(|retries| u8::try_from(retries).ok())
        .ok_or(Error::MalformedResponse("pinRetries"))
}

fn pin_invalid(session: &mut Session<'_>, protocol: PinUvAuthProtocol) -> Error {
    match pin_retries(session, protocol) {
        Ok(0) => Error::PinBlocked,
        Ok(retries) => {
            tracing::debug!(retries, "Wrong PIN");
            Error::PinInvalid {
                retries_remaining: Some(retries),
            }
        }
        Err(e) => {
            tracing::debug!(error = %e, "PIN retries query failed");
            Error::PinInvalid {
                retries_remaining: None,
            }
        }
    }
}
