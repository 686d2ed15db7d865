use ring::digest;
use ring::signature::{ECDSA_P256_SHA256_FIXED, UnparsedPublicKey};
use serde_json::json;

use wallet_passkey::{
    AuthenticationOutcome, ChallengeMetadata, CredentialDeviceType, PasskeyConfig, PasskeyError,
    PasskeyService, RegistrationOutcome, WalletUser,
};

use crate::common::{
    FLAG_BE, FLAG_BS, FLAG_UP, FLAG_UV, ORIGIN, RP_NAME, SoftwareAuthenticator, b64,
    challenge_of, init_tracing,
};

fn service() -> PasskeyService {
    init_tracing();
    PasskeyService::in_memory(PasskeyConfig::new(ORIGIN, RP_NAME).expect("valid config"))
}

async fn register(
    service: &PasskeyService,
    email: &str,
    authenticator: &SoftwareAuthenticator,
) -> wallet_passkey::PasskeyCredential {
    let user = service.load_user(email).await.unwrap();
    let options = service
        .registration()
        .generate_options(&user, Some("Laptop"))
        .await
        .unwrap();
    let response = authenticator.register(&challenge_of(&options), FLAG_UP | FLAG_UV);
    match service.registration().complete(&user, &response).await.unwrap() {
        RegistrationOutcome::Registered { passkey, .. } => passkey,
        RegistrationOutcome::UserNotVerified => panic!("registration was declined"),
    }
}

#[tokio::test]
async fn test_register_then_authenticate() {
    // Given a registered passkey
    let service = service();
    let authenticator = SoftwareAuthenticator::new(b"integration-credential");
    let passkey = register(&service, "Alice@Example.com", &authenticator).await;
    assert_eq!(passkey.user_email, "alice@example.com");
    assert_eq!(passkey.label, format!("{RP_NAME} | Laptop"));
    assert_eq!(
        passkey.hex_public_key.as_deref(),
        Some(authenticator.public_key_hex().as_str())
    );

    // When authenticating with it
    let user = service.load_user("alice@example.com").await.unwrap();
    assert_eq!(user.passkeys.len(), 1);
    let options = service
        .authentication()
        .generate_options(&user, None, None)
        .await
        .unwrap();
    let response = authenticator.authenticate(&challenge_of(&options), FLAG_UP | FLAG_UV, 1);
    let outcome = service
        .authentication()
        .complete(&user, &response)
        .await
        .unwrap();

    // Then the compact signature verifies over the signed data
    let AuthenticationOutcome::Authenticated(result) = outcome else {
        panic!("expected Authenticated outcome");
    };
    assert_eq!(result.passkey.counter, 1);
    assert_eq!(result.compact_signature.to_vec().len(), 64);

    let client_data_hash = digest::digest(&digest::SHA256, &result.client_data_json);
    let signed = [result.authenticator_data.as_slice(), client_data_hash.as_ref()].concat();
    UnparsedPublicKey::new(&ECDSA_P256_SHA256_FIXED, authenticator.public_key())
        .verify(&signed, result.compact_signature.as_bytes())
        .expect("compact signature verifies");
}

#[tokio::test]
async fn test_transaction_authorization_echoes_metadata() {
    // Given a registered passkey and a transaction hash to authorize
    let service = service();
    let authenticator = SoftwareAuthenticator::new(b"tx-credential");
    register(&service, "bob@example.com", &authenticator).await;
    let user = service.load_user("bob@example.com").await.unwrap();
    let tx_hash = digest::digest(&digest::SHA256, b"soroban authorization entry");
    let metadata = ChallengeMetadata::Soroban {
        tx: "AAAAAgAAAAA".to_string(),
        simulation_response: json!({"transactionData": "AAAA", "minResourceFee": "1200"}),
    };

    // When the hash is used as the challenge
    let options = service
        .authentication()
        .generate_options(&user, Some(tx_hash.as_ref()), Some(metadata.clone()))
        .await
        .unwrap();
    assert_eq!(challenge_of(&options), b64(tx_hash.as_ref()));
    let response = authenticator.authenticate(&challenge_of(&options), FLAG_UP | FLAG_UV, 0);
    let outcome = service
        .authentication()
        .complete(&user, &response)
        .await
        .unwrap();

    // Then the metadata comes back unchanged
    let AuthenticationOutcome::Authenticated(result) = outcome else {
        panic!("expected Authenticated outcome");
    };
    assert_eq!(result.custom_metadata, Some(metadata));
}

#[tokio::test]
async fn test_backed_up_passkey_is_multi_device() {
    let service = service();
    let authenticator = SoftwareAuthenticator::new(b"synced-credential");
    let user = WalletUser::new("carol@example.com");
    let options = service
        .registration()
        .generate_options(&user, None)
        .await
        .unwrap();
    let response = authenticator.register(
        &challenge_of(&options),
        FLAG_UP | FLAG_UV | FLAG_BE | FLAG_BS,
    );

    let outcome = service.registration().complete(&user, &response).await.unwrap();

    let RegistrationOutcome::Registered { passkey, .. } = outcome else {
        panic!("expected Registered outcome");
    };
    assert_eq!(passkey.device_type, CredentialDeviceType::MultiDevice);
    assert!(passkey.backed_up);
}

#[tokio::test]
async fn test_unverified_registration_stores_nothing() {
    let service = service();
    let authenticator = SoftwareAuthenticator::new(b"unverified-credential");
    let user = WalletUser::new("dave@example.com");
    let options = service
        .registration()
        .generate_options(&user, None)
        .await
        .unwrap();

    let outcome = service
        .registration()
        .complete(&user, &authenticator.register(&challenge_of(&options), FLAG_UP))
        .await
        .unwrap();

    assert!(matches!(outcome, RegistrationOutcome::UserNotVerified));
    assert!(
        service
            .load_user("dave@example.com")
            .await
            .unwrap()
            .passkeys
            .is_empty()
    );
}

#[tokio::test]
async fn test_replayed_assertion_is_rejected() {
    // Given a completed authentication
    let service = service();
    let authenticator = SoftwareAuthenticator::new(b"replay-credential");
    register(&service, "erin@example.com", &authenticator).await;
    let user = service.load_user("erin@example.com").await.unwrap();
    let options = service
        .authentication()
        .generate_options(&user, None, None)
        .await
        .unwrap();
    let response = authenticator.authenticate(&challenge_of(&options), FLAG_UP | FLAG_UV, 3);
    service
        .authentication()
        .complete(&user, &response)
        .await
        .unwrap();

    // When the same assertion is posted again
    let replay = service.authentication().complete(&user, &response).await;

    // Then no challenge is pending
    assert!(matches!(replay, Err(PasskeyError::MissingChallenge(_))));

    // And a fresh challenge with a stale counter is refused
    let options = service
        .authentication()
        .generate_options(&user, None, None)
        .await
        .unwrap();
    let stale = authenticator.authenticate(&challenge_of(&options), FLAG_UP | FLAG_UV, 3);
    let result = service.authentication().complete(&user, &stale).await;
    assert!(matches!(result, Err(PasskeyError::Authentication(_))));
}

#[tokio::test]
async fn test_registration_excludes_known_credentials() {
    let service = service();
    let authenticator = SoftwareAuthenticator::new(b"known-credential");
    register(&service, "frank@example.com", &authenticator).await;
    let user = service.load_user("frank@example.com").await.unwrap();

    let options = service
        .registration()
        .generate_options(&user, None)
        .await
        .unwrap();

    let value: serde_json::Value = serde_json::from_str(&options).unwrap();
    assert_eq!(
        value["excludeCredentials"][0]["id"],
        authenticator.credential_id()
    );
    assert_eq!(
        value["excludeCredentials"][0]["transports"],
        json!(["internal", "hybrid"])
    );
}

#[tokio::test]
async fn test_expired_challenge_is_missing() {
    // Given a service whose challenges expire after one second
    init_tracing();
    let config = PasskeyConfig::new(ORIGIN, RP_NAME)
        .unwrap()
        .with_challenge_ttl(1);
    let service = PasskeyService::in_memory(config);
    let authenticator = SoftwareAuthenticator::new(b"late-credential");
    let user = WalletUser::new("heidi@example.com");
    let options = service
        .registration()
        .generate_options(&user, None)
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;

    // When completing after expiry
    let result = service
        .registration()
        .complete(
            &user,
            &authenticator.register(&challenge_of(&options), FLAG_UP | FLAG_UV),
        )
        .await;

    // Then the challenge is treated as absent
    assert!(matches!(result, Err(PasskeyError::MissingChallenge(_))));
}
