//! Registration ceremony over an open session

use super::EnterpriseAttestation;
use super::credential_list;

use crate::client_data::ClientDataHash;
use crate::config::{ClientConfig, ResidentKeyRequirement};
use crate::error::{Error, Result};
use crate::extensions::creation_inputs;
use crate::materialize::{PublicKeyCredential, decode_registration, registration_from};
use crate::options::{AttestationConveyance, CredentialCreationOptions};
use crate::pin::{self, KeyAgreement, Pin, UvPlan};
use crate::request::{MakeCredentialRequest, PinUvAuth};
use crate::session::{Session, SessionState};

use nfc_passkey_ctap::{AuthenticatorInfo, CtapCommand, Permissions};

pub(super) struct Registration<'a> {
    pub config: &'a ClientConfig,
    pub options: &'a CredentialCreationOptions,
    pub pin: Option<&'a Pin>,
    pub enterprise_attestation: Option<EnterpriseAttestation>,
    pub client_data_hash: ClientDataHash,
}

impl Registration<'_> {
    pub(super) fn run(
        &self,
        session: &mut Session<'_>,
        client_data_json: Vec<u8>,
    ) -> Result<PublicKeyCredential> {
        let info = session.info().clone();
        let options = self.options;

        // Resolved before any PIN traffic
        let algorithms = self.algorithms(&info)?;
        let rk = resident_key(&info, options.resident_key)?;
        let (attestation, enterprise_attestation) = self.attestation(&info);
        let extensions = creation_inputs(&info, &options.extensions)?;
        let exclude_list = credential_list::fit_to_authenticator(
            session,
            &options.rp.id,
            &self.client_data_hash,
            &options.exclude_credentials,
        )?;

        let plan = pin::plan_user_verification(&info, options.user_verification, Some(rk), false)?;
        tracing::debug!(?plan, rk, "Registration plan");

        let pin_uv_auth = match plan {
            UvPlan::Token(method) => {
                let protocol = pin::select_protocol(&info, self.config.preferred_pin_protocol)?;
                let agreement = KeyAgreement::negotiate(session, protocol)?;
                let token = pin::obtain_token(
                    session,
                    &agreement,
                    method,
                    self.pin,
                    Permissions::MAKE_CREDENTIAL,
                    &options.rp.id,
                )?;
                Some(PinUvAuth {
                    param: token.authenticate(&self.client_data_hash)?,
                    protocol: token.protocol().as_u8(),
                })
            }
            UvPlan::UvOption | UvPlan::None => None,
        };

        let request = MakeCredentialRequest {
            client_data_hash: self.client_data_hash,
            rp: &options.rp,
            user: &options.user,
            algorithms,
            exclude_list: &exclude_list,
            extensions,
            rk,
            uv: plan == UvPlan::UvOption,
            pin_uv_auth,
            enterprise_attestation,
        }
        .to_cbor()?;

        session.transition(SessionState::CommandInFlight);
        let body = session.command(CtapCommand::MakeCredential, &request)?;
        let response = decode_registration(&body, &options.rp.id)?;
        tracing::debug!(fmt = %response.fmt, "Credential created");

        registration_from(response, client_data_json, attestation, &options.extensions, rk)
    }

    /// Requested algorithms the authenticator supports, caller order
    fn algorithms(&self, info: &AuthenticatorInfo) -> Result<Vec<i64>> {
        let algorithms: Vec<i64> = self
            .options
            .pub_key_cred_params
            .iter()
            .map(|param| param.alg)
            .filter(|alg| info.supports_algorithm(*alg))
            .collect();
        if algorithms.is_empty() {
            tracing::debug!(supported = ?info.supported_algorithms(), "No common algorithm");
            return Err(Error::UnsupportedAlgorithm);
        }
        Ok(algorithms)
    }

    /// Attestation to report, and the enterpriseAttestation parameter to send
    fn attestation(&self, info: &AuthenticatorInfo) -> (AttestationConveyance, Option<u8>) {
        match self.options.attestation {
            AttestationConveyance::Enterprise if info.options.ep == Some(true) => {
                let mode = self.enterprise_attestation.unwrap_or_default();
                (AttestationConveyance::Enterprise, Some(mode as u8))
            }
            AttestationConveyance::Enterprise => {
                tracing::debug!("Enterprise attestation unavailable, using none");
                (AttestationConveyance::None, None)
            }
            other => (other, None),
        }
    }
}

fn resident_key(info: &AuthenticatorInfo, requirement: ResidentKeyRequirement) -> Result<bool> {
    match requirement {
        ResidentKeyRequirement::Required if !info.supports_resident_keys() => {
            Err(Error::DeviceIneligible)
        }
        ResidentKeyRequirement::Required => Ok(true),
        ResidentKeyRequirement::Preferred => Ok(info.supports_resident_keys()),
        ResidentKeyRequirement::Discouraged => Ok(false),
    }
}
