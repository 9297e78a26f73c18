//! Registration against the in-memory NFC authenticator

mod common;

use common::{FakeAuthenticator, FakeConfig, PIN, RP_ID, ZERO_CHALLENGE, b64, client, creation_options, unb64};

use nfc_passkey::{CreateExtras, EnterpriseAttestation, Error, ErrorKind, Pin};
use nfc_passkey_ctap::cbor::{self, Value, text_entry};

use serde_json::json;

fn attestation_fmt(attestation_object: &[u8]) -> String {
    let object: Value = cbor::decode(attestation_object).unwrap();
    match text_entry(&object, "fmt") {
        Some(Value::Text(fmt)) => fmt.clone(),
        other => panic!("unexpected fmt {other:?}"),
    }
}

#[test]
fn test_registration_with_pin_token() {
    let fake = FakeAuthenticator::new(FakeConfig::default());
    let mut channel = fake.channel();
    let pin = Pin::new(PIN);

    let credential = client()
        .create_credential(
            &mut channel,
            &creation_options("required", "required"),
            RP_ID,
            Some(&pin),
            None,
        )
        .unwrap();

    // Token negotiated before makeCredential
    assert_eq!(fake.commands(), vec![0x04, 0x06, 0x06, 0x01]);
    assert_eq!(fake.client_pin_log(), vec![0x02, 0x09]);
    assert!(channel.is_closed());

    let stored = fake.credentials();
    assert_eq!(stored.len(), 1);
    assert_eq!(credential.raw_id, stored[0].id);
    assert!(stored[0].resident);
    assert_eq!(stored[0].user_id, b"user-1");
    assert_eq!(credential.aaguid, common::AAGUID);
    // UV flag set by the token
    assert_ne!(credential.authenticator_data[32] & 0x04, 0);

    let expected_client_data = format!(
        "{{\"type\":\"webauthn.create\",\"challenge\":\"{ZERO_CHALLENGE}\",\"origin\":\"https://example.com\"}}"
    );
    assert_eq!(credential.client_data_json, expected_client_data.as_bytes());

    let json = credential.to_json();
    assert_eq!(json["id"], b64(&stored[0].id));
    assert_eq!(json["rawId"], json["id"]);
    assert_eq!(json["type"], "public-key");
    assert_eq!(json["authenticatorAttachment"], "cross-platform");
    assert_eq!(json["response"]["transports"], json!(["nfc"]));
    assert_eq!(json["response"]["publicKeyAlgorithm"], -7);
    assert_eq!(unb64(json["response"]["publicKey"].as_str().unwrap()).len(), 91);
    assert_eq!(
        unb64(json["response"]["clientDataJSON"].as_str().unwrap()),
        expected_client_data.as_bytes()
    );
    assert_eq!(attestation_fmt(&credential.attestation_object), "none");
}

#[test]
fn test_missing_pub_key_cred_params_sends_nothing() {
    let fake = FakeAuthenticator::new(FakeConfig::default());
    let mut channel = fake.channel();
    let mut options = creation_options("preferred", "discouraged");
    options.as_object_mut().unwrap().remove("pubKeyCredParams");

    let err = client()
        .create_credential(&mut channel, &options, RP_ID, None, None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidEntity);
    assert_eq!(fake.apdu_count(), 0);
}

#[test]
fn test_unsupported_algorithm_before_pin() {
    let fake = FakeAuthenticator::new(FakeConfig {
        algorithms: Some(vec![-257]),
        ..Default::default()
    });
    let mut channel = fake.channel();
    let pin = Pin::new(PIN);

    let err = client()
        .create_credential(
            &mut channel,
            &creation_options("required", "required"),
            RP_ID,
            Some(&pin),
            None,
        )
        .unwrap_err();

    assert_eq!(err, Error::UnsupportedAlgorithm);
    assert_eq!(fake.commands(), vec![0x04]);
    assert!(fake.client_pin_log().is_empty());
    assert!(channel.is_closed());
}

#[test]
fn test_algorithm_intersection_keeps_caller_order() {
    let fake = FakeAuthenticator::new(FakeConfig {
        algorithms: Some(vec![-7, -8]),
        ..Default::default()
    });
    let mut options = creation_options("discouraged", "discouraged");
    options["pubKeyCredParams"] = json!([
        {"type": "public-key", "alg": -257},
        {"type": "public-key", "alg": -8},
        {"type": "public-key", "alg": -7},
    ]);

    let credential = client()
        .create_credential(&mut fake.channel(), &options, RP_ID, None, None)
        .unwrap();
    assert_eq!(credential.public_key_algorithm, -8);
    assert_eq!(credential.public_key.unwrap().len(), 44);
}

#[test]
fn test_rsa_key_spans_get_response() {
    let fake = FakeAuthenticator::new(FakeConfig {
        algorithms: Some(vec![-257]),
        ..Default::default()
    });
    let mut options = creation_options("discouraged", "discouraged");
    options["pubKeyCredParams"] = json!([{"type": "public-key", "alg": -257}]);

    let credential = client()
        .create_credential(&mut fake.channel(), &options, RP_ID, None, None)
        .unwrap();
    assert_eq!(credential.public_key_algorithm, -257);
    assert!(credential.public_key.is_none());
    assert!(credential.to_json()["response"].get("publicKey").is_none());
}

#[test]
fn test_long_request_is_chained() {
    let fake = FakeAuthenticator::new(FakeConfig::default());
    let mut options = creation_options("discouraged", "discouraged");
    let exclude: Vec<_> = (0..6u8)
        .map(|i| json!({"type": "public-key", "id": b64(&[i; 64])}))
        .collect();
    options["excludeCredentials"] = json!(exclude);

    let credential = client()
        .create_credential(&mut fake.channel(), &options, RP_ID, None, None)
        .unwrap();
    assert_eq!(credential.raw_id, fake.credentials()[0].id);
}

#[test]
fn test_rp_id_must_match_host() {
    let fake = FakeAuthenticator::new(FakeConfig::default());
    let err = client()
        .create_credential(
            &mut fake.channel(),
            &creation_options("preferred", "discouraged"),
            "other.org",
            None,
            None,
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidEntity);
    assert_eq!(fake.apdu_count(), 0);

    // A registrable suffix of the host is fine
    let fake = FakeAuthenticator::new(FakeConfig {
        pin: None,
        ..Default::default()
    });
    client()
        .create_credential(
            &mut fake.channel(),
            &creation_options("discouraged", "discouraged"),
            "login.example.com",
            None,
            None,
        )
        .unwrap();
}

#[test]
fn test_resident_key_required_without_rk() {
    let fake = FakeAuthenticator::new(FakeConfig {
        rk: false,
        ..Default::default()
    });
    let err = client()
        .create_credential(
            &mut fake.channel(),
            &creation_options("discouraged", "required"),
            RP_ID,
            None,
            None,
        )
        .unwrap_err();
    assert_eq!(err, Error::DeviceIneligible);
    assert_eq!(fake.commands(), vec![0x04]);
}

#[test]
fn test_discouraged_uv_skips_pin() {
    let fake = FakeAuthenticator::new(FakeConfig::default());
    let credential = client()
        .create_credential(
            &mut fake.channel(),
            &creation_options("discouraged", "discouraged"),
            RP_ID,
            None,
            None,
        )
        .unwrap();
    assert_eq!(fake.commands(), vec![0x04, 0x01]);
    assert_eq!(credential.authenticator_data[32] & 0x04, 0);
}

#[test]
fn test_discouraged_uv_with_rk_still_needs_token() {
    let fake = FakeAuthenticator::new(FakeConfig::default());
    let pin = Pin::new(PIN);
    client()
        .create_credential(
            &mut fake.channel(),
            &creation_options("discouraged", "required"),
            RP_ID,
            Some(&pin),
            None,
        )
        .unwrap();
    assert_eq!(fake.client_pin_log(), vec![0x02, 0x09]);
}

#[test]
fn test_required_uv_unavailable() {
    let fake = FakeAuthenticator::new(FakeConfig {
        pin: None,
        ..Default::default()
    });
    let err = client()
        .create_credential(
            &mut fake.channel(),
            &creation_options("required", "discouraged"),
            RP_ID,
            None,
            None,
        )
        .unwrap_err();
    assert_eq!(err, Error::UserVerificationUnavailable);
    assert_eq!(fake.commands(), vec![0x04]);
}

#[test]
fn test_preferred_uv_without_pin_value() {
    let fake = FakeAuthenticator::new(FakeConfig::default());
    let err = client()
        .create_credential(
            &mut fake.channel(),
            &creation_options("preferred", "discouraged"),
            RP_ID,
            None,
            None,
        )
        .unwrap_err();
    assert_eq!(err, Error::PinRequired);
    assert!(!fake.commands().contains(&0x01));
}

#[test]
fn test_built_in_uv_token() {
    let fake = FakeAuthenticator::new(FakeConfig {
        uv: true,
        ..Default::default()
    });
    let credential = client()
        .create_credential(
            &mut fake.channel(),
            &creation_options("required", "discouraged"),
            RP_ID,
            None,
            None,
        )
        .unwrap();
    assert_eq!(fake.client_pin_log(), vec![0x02, 0x06]);
    assert_ne!(credential.authenticator_data[32] & 0x04, 0);
}

#[test]
fn test_uv_option_without_token_api() {
    let fake = FakeAuthenticator::new(FakeConfig {
        uv: true,
        token_api: false,
        pin: None,
        ..Default::default()
    });
    let credential = client()
        .create_credential(
            &mut fake.channel(),
            &creation_options("required", "discouraged"),
            RP_ID,
            None,
            None,
        )
        .unwrap();
    assert_eq!(fake.commands(), vec![0x04, 0x01]);
    assert_ne!(credential.authenticator_data[32] & 0x04, 0);
}

#[test]
fn test_legacy_pin_token() {
    let fake = FakeAuthenticator::new(FakeConfig {
        token_api: false,
        ..Default::default()
    });
    let pin = Pin::new(PIN);
    client()
        .create_credential(
            &mut fake.channel(),
            &creation_options("required", "discouraged"),
            RP_ID,
            Some(&pin),
            None,
        )
        .unwrap();
    assert_eq!(fake.client_pin_log(), vec![0x02, 0x05]);
}

#[test]
fn test_excluded_credential() {
    let fake = FakeAuthenticator::new(FakeConfig::default());
    let options = creation_options("discouraged", "discouraged");
    let first = client()
        .create_credential(&mut fake.channel(), &options, RP_ID, None, None)
        .unwrap();

    let mut again = options.clone();
    again["excludeCredentials"] = json!([{"type": "public-key", "id": b64(&first.raw_id)}]);
    let err = client()
        .create_credential(&mut fake.channel(), &again, RP_ID, None, None)
        .unwrap_err();
    assert_eq!(err, Error::DeviceIneligible);
}

#[test]
fn test_exclude_list_checked_in_batches() {
    let fake = FakeAuthenticator::new(FakeConfig {
        max_credential_count_in_list: Some(1),
        ..Default::default()
    });
    let options = creation_options("discouraged", "discouraged");
    let first = client()
        .create_credential(&mut fake.channel(), &options, RP_ID, None, None)
        .unwrap();
    fake.clear_log();

    let mut again = options.clone();
    again["excludeCredentials"] = json!([
        {"type": "public-key", "id": b64(&[1; 16])},
        {"type": "public-key", "id": b64(&first.raw_id)},
        {"type": "public-key", "id": b64(&[2; 16])},
    ]);
    let err = client()
        .create_credential(&mut fake.channel(), &again, RP_ID, None, None)
        .unwrap_err();
    assert_eq!(err, Error::DeviceIneligible);
    // Two silent preflights, then makeCredential with the match only
    assert_eq!(fake.commands(), vec![0x04, 0x02, 0x02, 0x01]);

    fake.clear_log();
    again["excludeCredentials"] = json!([
        {"type": "public-key", "id": b64(&[1; 16])},
        {"type": "public-key", "id": b64(&[2; 16])},
    ]);
    client()
        .create_credential(&mut fake.channel(), &again, RP_ID, None, None)
        .unwrap();
    assert_eq!(fake.commands(), vec![0x04, 0x02, 0x02, 0x01]);
    assert_eq!(fake.credentials().len(), 2);
}

#[test]
fn test_enterprise_attestation() {
    let mut options = creation_options("discouraged", "discouraged");
    options["attestation"] = json!("enterprise");

    // Downgraded when the authenticator lacks ep
    let fake = FakeAuthenticator::new(FakeConfig::default());
    let credential = client()
        .create_credential(&mut fake.channel(), &options, RP_ID, None, None)
        .unwrap();
    assert_eq!(attestation_fmt(&credential.attestation_object), "none");

    let fake = FakeAuthenticator::new(FakeConfig {
        ep: true,
        ..Default::default()
    });
    let extras = CreateExtras {
        enterprise_attestation: Some(EnterpriseAttestation::PlatformManaged),
        cancel: None,
    };
    let credential = client()
        .create_credential(&mut fake.channel(), &options, RP_ID, None, Some(&extras))
        .unwrap();
    assert_eq!(attestation_fmt(&credential.attestation_object), "packed");
}

#[test]
fn test_direct_attestation_is_kept() {
    let fake = FakeAuthenticator::new(FakeConfig::default());
    let mut options = creation_options("discouraged", "discouraged");
    options["attestation"] = json!("direct");
    let credential = client()
        .create_credential(&mut fake.channel(), &options, RP_ID, None, None)
        .unwrap();

    let object: Value = cbor::decode(&credential.attestation_object).unwrap();
    let att_stmt = text_entry(&object, "attStmt").unwrap();
    assert!(text_entry(att_stmt, "sig").is_some());
    assert!(matches!(text_entry(&object, "authData"), Some(Value::Bytes(data)) if *data == credential.authenticator_data));
}

#[test]
fn test_extension_results() {
    let fake = FakeAuthenticator::new(FakeConfig::default());
    let pin = Pin::new(PIN);
    let mut options = creation_options("preferred", "required");
    options["extensions"] = json!({
        "prf": {},
        "largeBlob": {"support": "required"},
        "credProps": true,
    });

    let credential = client()
        .create_credential(&mut fake.channel(), &options, RP_ID, Some(&pin), None)
        .unwrap();
    assert_eq!(
        credential.to_json()["clientExtensionResults"],
        json!({
            "prf": {"enabled": true},
            "largeBlob": {"supported": true},
            "credProps": {"rk": true},
        })
    );
}

#[test]
fn test_large_blob_required_but_unsupported() {
    let fake = FakeAuthenticator::new(FakeConfig {
        large_blobs: false,
        ..Default::default()
    });
    let mut options = creation_options("discouraged", "discouraged");
    options["extensions"] = json!({"largeBlob": {"support": "required"}});

    let err = client()
        .create_credential(&mut fake.channel(), &options, RP_ID, None, None)
        .unwrap_err();
    assert_eq!(err, Error::DeviceIneligible);
    assert!(!fake.commands().contains(&0x01));
}

#[test]
fn test_invalid_extension_shape() {
    let fake = FakeAuthenticator::new(FakeConfig::default());
    let mut options = creation_options("discouraged", "discouraged");
    options["extensions"] = json!({"prf": true});

    let err = client()
        .create_credential(&mut fake.channel(), &options, RP_ID, None, None)
        .unwrap_err();
    assert_eq!(err, Error::InvalidOptions("prf"));
    assert_eq!(fake.apdu_count(), 0);
}
