//! WebAuthn client API
//!
//! Entry points for the two ceremonies. Each call validates its options,
//! builds client data, then runs one [`Session`] over the supplied channel:
//!
//! - **Registration**: algorithm and capability checks, PIN/UV token,
//!   authenticatorMakeCredential
//! - **Authentication**: PIN/UV token and extension key agreement,
//!   authenticatorGetAssertion (+ getNextAssertion), large-blob access
//!
//! The channel is closed when the call returns, successful or not.

mod authenticate;
mod credential_list;
mod register;

use crate::client_data::{ClientDataType, build_client_data, client_data_hash};
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::materialize::{AssertionCredential, PublicKeyCredential};
use crate::options::{CredentialCreationOptions, CredentialRequestOptions, check_rp_id};
use crate::pin::Pin;
use crate::session::Session;

use nfc_passkey_transport::{CancelToken, Channel};

use serde_json::Value as Json;

/// `enterpriseAttestation` values for authenticatorMakeCredential
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum EnterpriseAttestation {
    #[default]
    VendorFacilitated = 1,
    PlatformManaged = 2,
}

/// Registration inputs that do not come from the creation options
#[derive(Debug, Clone, Default)]
pub struct CreateExtras {
    /// Used only when the options ask for `enterprise` attestation
    pub enterprise_attestation: Option<EnterpriseAttestation>,
    pub cancel: Option<CancelToken>,
}

#[derive(Debug, Clone, Default)]
pub struct WebAuthnClient {
    config: ClientConfig,
}

impl WebAuthnClient {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Register a new credential (`navigator.credentials.create`)
    ///
    /// `rp_id_host` is the host the request is made for; `rp.id` must be it
    /// or a registrable suffix of it.
    pub fn create_credential(
        &self,
        channel: &mut dyn Channel,
        options: &Json,
        rp_id_host: &str,
        pin: Option<&Pin>,
        extra: Option<&CreateExtras>,
    ) -> Result<PublicKeyCredential> {
        let options = CredentialCreationOptions::from_json(options, &self.config)?;
        check_rp_id(&options.rp.id, rp_id_host)?;

        let origin = self.config.origin_for(rp_id_host);
        let client_data_json = build_client_data(
            ClientDataType::Create,
            &origin,
            &options.challenge.to_base64url(),
        )?;
        let hash = client_data_hash(&client_data_json);
        tracing::debug!(rp_id = %options.rp.id, timeout = ?options.timeout, "Registration");

        let cancel = extra.and_then(|e| e.cancel.clone());
        let mut session = Session::open(channel, &self.config, options.timeout, cancel)?;
        let ceremony = register::Registration {
            config: &self.config,
            options: &options,
            pin,
            enterprise_attestation: extra.and_then(|e| e.enterprise_attestation),
            client_data_hash: hash,
        };
        let result = ceremony.run(&mut session, client_data_json);
        session.finish(result)
    }

    /// Get one assertion (`navigator.credentials.get`)
    pub fn get_assertion(
        &self,
        channel: &mut dyn Channel,
        options: &Json,
        rp_id_host: &str,
        pin: Option<&Pin>,
    ) -> Result<AssertionCredential> {
        self.assert(channel, options, rp_id_host, pin, false)?
            .into_iter()
            .next()
            .ok_or(Error::MalformedResponse("getAssertion"))
    }

    /// Every assertion the authenticator offers for the request
    ///
    /// With an empty allow list a discoverable-credential authenticator may
    /// report several accounts; each is fetched with getNextAssertion.
    pub fn get_assertions(
        &self,
        channel: &mut dyn Channel,
        options: &Json,
        rp_id_host: &str,
        pin: Option<&Pin>,
    ) -> Result<Vec<AssertionCredential>> {
        self.assert(channel, options, rp_id_host, pin, true)
    }

    fn assert(
        &self,
        channel: &mut dyn Channel,
        options: &Json,
        rp_id_host: &str,
        pin: Option<&Pin>,
        collect_all: bool,
    ) -> Result<Vec<AssertionCredential>> {
        let options = CredentialRequestOptions::from_json(options, &self.config)?;
        let rp_id = options
            .rp_id
            .clone()
            .unwrap_or_else(|| rp_id_host.to_string());
        check_rp_id(&rp_id, rp_id_host)?;

        let origin = self.config.origin_for(rp_id_host);
        let client_data_json = build_client_data(
            ClientDataType::Get,
            &origin,
            &options.challenge.to_base64url(),
        )?;
        let hash = client_data_hash(&client_data_json);
        tracing::debug!(%rp_id, timeout = ?options.timeout, "Authentication");

        let mut session = Session::open(channel, &self.config, options.timeout, None)?;
        let ceremony = authenticate::Authentication {
            config: &self.config,
            options: &options,
            rp_id: &rp_id,
            pin,
            client_data_hash: hash,
            collect_all,
        };
        let result = ceremony.run(&mut session, &client_data_json);
        session.finish(result)
    }
}
