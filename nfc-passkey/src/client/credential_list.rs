//! Allow / exclude lists fitted to the authenticator's advertised limits
//!
//! Ids longer than `maxCredentialIdLength` cannot have been issued by the
//! authenticator and are dropped. A list longer than
//! `maxCredentialCountInList` is checked batch by batch with silent
//! getAssertion requests, and narrowed to the first credential found.

use crate::client_data::ClientDataHash;
use crate::error::{Error, Result};
use crate::materialize::decode_assertion;
use crate::options::CredentialDescriptor;
use crate::request::GetAssertionRequest;
use crate::session::Session;

use nfc_passkey_ctap::{AuthenticatorInfo, CtapCommand};

const NO_CREDENTIALS: u8 = 0x2E;

/// Entries of `list` worth sending; empty when none can be present
pub(super) fn fit_to_authenticator(
    session: &mut Session<'_>,
    rp_id: &str,
    client_data_hash: &ClientDataHash,
    list: &[CredentialDescriptor],
) -> Result<Vec<CredentialDescriptor>> {
    let info = session.info().clone();
    let usable = usable_ids(&info, list);
    if usable.len() < list.len() {
        tracing::debug!(dropped = list.len() - usable.len(), "Credential ids over maxCredentialIdLength");
    }

    let max_count = info.max_credential_count_in_list.unwrap_or(usize::MAX).max(1);
    if usable.len() <= max_count {
        return Ok(usable);
    }

    tracing::debug!(entries = usable.len(), max_count, "Checking credential list in batches");
    for batch in usable.chunks(max_count) {
        if let Some(found) = preflight(session, rp_id, client_data_hash, batch)? {
            return Ok(vec![found]);
        }
    }
    Ok(Vec::new())
}

fn usable_ids(info: &AuthenticatorInfo, list: &[CredentialDescriptor]) -> Vec<CredentialDescriptor> {
    match info.max_credential_id_length {
        Some(max) => list.iter().filter(|d| d.id.len() <= max).cloned().collect(),
        None => list.to_vec(),
    }
}

/// Silent getAssertion against one batch
fn preflight(
    session: &mut Session<'_>,
    rp_id: &str,
    client_data_hash: &ClientDataHash,
    batch: &[CredentialDescriptor],
) -> Result<Option<CredentialDescriptor>> {
    let request = GetAssertionRequest {
        rp_id,
        client_data_hash: *client_data_hash,
        allow_list: batch,
        extensions: None,
        uv: false,
        silent: true,
        pin_uv_auth: None,
    }
    .to_cbor()?;

    let (status, body) = session.transceive(CtapCommand::GetAssertion, &request)?;
    match status {
        0x00 => {}
        NO_CREDENTIALS => return Ok(None),
        other => return Err(Error::from_ctap_status(other)),
    }

    let response = decode_assertion(&body, rp_id)?;
    let found = match (&response.credential_id, batch) {
        (Some(id), _) => batch.iter().find(|d| &d.id == id).cloned(),
        (None, [only]) => Some(only.clone()),
        (None, _) => None,
    };
    found.map(Some).ok_or(Error::MalformedResponse("credential"))
}
