//! Authentication ceremony over an open session

use super::credential_list;

use crate::client_data::ClientDataHash;
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::extensions::{self, hmac_secret_input, large_blobs_available, prf_outputs, request_inputs};
use crate::large_blob;
use crate::materialize::{
    AssertionCredential, AssertionExtensionResults, AssertionResponse, LargeBlobOutput,
    assertion_from, decode_assertion,
};
use crate::options::{CredentialDescriptor, CredentialRequestOptions, LargeBlobRequest, PrfInputs};
use crate::pin::{self, KeyAgreement, Pin, PinUvAuthToken, UvPlan};
use crate::request::{GetAssertionRequest, PinUvAuth};
use crate::session::{Session, SessionState};

use nfc_passkey_ctap::extensions::ext_ids;
use nfc_passkey_ctap::{AuthenticatorInfo, CtapCommand, Permissions, Value};

/// Upper bound on numberOfCredentials before getNextAssertion is trusted
const MAX_ASSERTIONS: usize = 256;

pub(super) struct Authentication<'a> {
    pub config: &'a ClientConfig,
    pub options: &'a CredentialRequestOptions,
    pub rp_id: &'a str,
    pub pin: Option<&'a Pin>,
    pub client_data_hash: ClientDataHash,
    pub collect_all: bool,
}

impl Authentication<'_> {
    pub(super) fn run(
        &self,
        session: &mut Session<'_>,
        client_data_json: &[u8],
    ) -> Result<Vec<AssertionCredential>> {
        let info = session.info().clone();
        let ext = &self.options.extensions;

        let allow_list = self.allow_list(session)?;

        let prf = ext
            .prf
            .as_ref()
            .filter(|_| info.supports_extension(ext_ids::HMAC_SECRET));
        let blob_request = ext.large_blob.as_ref();
        let writing = matches!(blob_request, Some(LargeBlobRequest::Write(_)))
            && large_blobs_available(&info);

        let plan = pin::plan_user_verification(&info, self.options.user_verification, None, writing)?;
        tracing::debug!(?plan, prf = prf.is_some(), "Authentication plan");

        // hmac-secret needs the shared secret even when no token is requested
        let agreement = if matches!(plan, UvPlan::Token(_)) || prf.is_some() {
            let protocol = pin::select_protocol(&info, self.config.preferred_pin_protocol)?;
            Some(KeyAgreement::negotiate(session, protocol)?)
        } else {
            None
        };

        let token = match (plan, &agreement) {
            (UvPlan::Token(method), Some(agreement)) => {
                let permissions = if writing {
                    Permissions::GET_ASSERTION | Permissions::LARGE_BLOB_WRITE
                } else {
                    Permissions::GET_ASSERTION
                };
                Some(pin::obtain_token(
                    session,
                    agreement,
                    method,
                    self.pin,
                    permissions,
                    self.rp_id,
                )?)
            }
            _ => None,
        };

        let hmac_secret = match (prf, &agreement) {
            (Some(inputs), Some(agreement)) => Some(hmac_secret_input(agreement, inputs)?),
            _ => None,
        };
        let pin_uv_auth = match &token {
            Some(token) => Some(PinUvAuth {
                param: token.authenticate(&self.client_data_hash)?,
                protocol: token.protocol().as_u8(),
            }),
            None => None,
        };

        let request = GetAssertionRequest {
            rp_id: self.rp_id,
            client_data_hash: self.client_data_hash,
            allow_list: &allow_list,
            extensions: request_inputs(&info, ext, hmac_secret)?,
            uv: plan == UvPlan::UvOption,
            silent: false,
            pin_uv_auth,
        }
        .to_cbor()?;

        session.transition(SessionState::CommandInFlight);
        let responses = self.collect(session, &request)?;

        let blob_array = match blob_request {
            Some(LargeBlobRequest::Read)
                if large_blobs_available(&info)
                    && responses.iter().any(|r| r.large_blob_key.is_some()) =>
            {
                Some(large_blob::read_array(session)?)
            }
            _ => None,
        };

        let mut credentials = Vec::with_capacity(responses.len());
        for response in responses {
            let mut results = AssertionExtensionResults::default();

            if let (Some(inputs), Some(agreement)) = (prf, &agreement) {
                results.prf = prf_result(&response, agreement, inputs)?;
            }
            results.large_blob = match blob_request {
                Some(LargeBlobRequest::Read) => Some(LargeBlobOutput::Blob(
                    match (&blob_array, &response.large_blob_key) {
                        (Some(entries), Some(key)) => large_blob::find_blob(entries, key),
                        _ => None,
                    },
                )),
                Some(LargeBlobRequest::Write(blob)) => Some(LargeBlobOutput::Written(
                    write_large_blob(session, &info, token.as_ref(), &response, blob),
                )),
                None => None,
            };

            credentials.push(assertion_from(
                response,
                client_data_json.to_vec(),
                &allow_list,
                results,
            )?);
        }

        Ok(credentials)
    }

    /// The allow list as sent; a non-empty list with nothing usable fails early
    fn allow_list(&self, session: &mut Session<'_>) -> Result<Vec<CredentialDescriptor>> {
        let requested = &self.options.allow_credentials;
        if requested.is_empty() {
            return Ok(Vec::new());
        }
        let fitted = credential_list::fit_to_authenticator(
            session,
            self.rp_id,
            &self.client_data_hash,
            requested,
        )?;
        if fitted.is_empty() {
            tracing::debug!("No listed credential on this authenticator");
            return Err(Error::DeviceIneligible);
        }
        Ok(fitted)
    }

    /// getAssertion, then getNextAssertion for the remaining credentials
    fn collect(&self, session: &mut Session<'_>, request: &[u8]) -> Result<Vec<AssertionResponse>> {
        let body = session.command(CtapCommand::GetAssertion, request)?;
        let first = decode_assertion(&body, self.rp_id)?;

        let count = if self.collect_all {
            first.number_of_credentials.unwrap_or(1).max(1)
        } else {
            1
        };
        tracing::debug!(count, "Assertion received");
        if count > MAX_ASSERTIONS {
            tracing::warn!(count, "Implausible numberOfCredentials");
            return Err(Error::MalformedResponse("numberOfCredentials"));
        }

        let mut responses = Vec::with_capacity(count);
        responses.push(first);
        for _ in 1..count {
            let body = session.command(CtapCommand::GetNextAssertion, &[])?;
            responses.push(decode_assertion(&body, self.rp_id)?);
        }
        Ok(responses)
    }
}

fn prf_result(
    response: &AssertionResponse,
    agreement: &KeyAgreement,
    inputs: &PrfInputs,
) -> Result<Option<extensions::PrfOutputs>> {
    match response.auth_data.extension(ext_ids::HMAC_SECRET) {
        Some(Value::Bytes(encrypted)) => {
            prf_outputs(agreement, encrypted, inputs.second.is_some()).map(Some)
        }
        Some(_) => {
            tracing::warn!("hmac-secret output is not a byte string");
            Ok(None)
        }
        None => Ok(None),
    }
}

/// Store `blob` for this credential; failures are reported, not raised
fn write_large_blob(
    session: &mut Session<'_>,
    info: &AuthenticatorInfo,
    token: Option<&PinUvAuthToken>,
    response: &AssertionResponse,
    blob: &[u8],
) -> bool {
    let (Some(token), Some(key)) = (token, response.large_blob_key.as_ref()) else {
        tracing::debug!("Large-blob write skipped: no token or largeBlobKey");
        return false;
    };
    if !large_blobs_available(info) {
        return false;
    }
    match large_blob::write_blob(session, token, key, blob) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Large-blob write failed");
            false
        }
    }
}
