use std::sync::Arc;

use wallet_passkey::{
    AuthenticationOutcome, CredentialRepository, InMemoryChallengeStore, PasskeyConfig,
    PasskeyService, RegistrationOutcome, SqliteCredentialRepository, WalletUser,
};

use crate::common::{FLAG_UP, FLAG_UV, ORIGIN, RP_NAME, SoftwareAuthenticator, challenge_of, init_tracing};

#[tokio::test]
async fn test_ceremonies_against_sqlite_repository() {
    init_tracing();

    // Given a service persisting credentials in SQLite
    let repository = Arc::new(
        SqliteCredentialRepository::connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite"),
    );
    let service = PasskeyService::new(
        PasskeyConfig::new(ORIGIN, RP_NAME).unwrap(),
        Arc::new(InMemoryChallengeStore::new()),
        repository.clone(),
    );
    let authenticator = SoftwareAuthenticator::new(b"sqlite-credential");
    let user = WalletUser::new("grace@example.com");

    // When registering
    let options = service
        .registration()
        .generate_options(&user, None)
        .await
        .unwrap();
    let outcome = service
        .registration()
        .complete(
            &user,
            &authenticator.register(&challenge_of(&options), FLAG_UP | FLAG_UV),
        )
        .await
        .unwrap();
    assert!(matches!(outcome, RegistrationOutcome::Registered { .. }));

    // Then the row round-trips through SQLite
    let stored = repository
        .get_by_id(&authenticator.credential_id())
        .await
        .unwrap()
        .expect("credential stored");
    assert_eq!(stored.hex_public_key.as_deref(), Some(authenticator.public_key_hex().as_str()));
    assert_eq!(stored.counter, 0);

    // When authenticating twice with increasing counters
    let user = service.load_user("grace@example.com").await.unwrap();
    for counter in [1u32, 2] {
        let options = service
            .authentication()
            .generate_options(&user, None, None)
            .await
            .unwrap();
        let outcome = service
            .authentication()
            .complete(
                &user,
                &authenticator.authenticate(&challenge_of(&options), FLAG_UP | FLAG_UV, counter),
            )
            .await
            .unwrap();
        assert!(matches!(outcome, AuthenticationOutcome::Authenticated(_)));
    }

    // Then the persisted counter follows the authenticator
    let stored = repository
        .get_by_id(&authenticator.credential_id())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.counter, 2);

    // And deleting the credential removes it from the user
    let removed = repository
        .delete_many(&[authenticator.credential_id()])
        .await
        .unwrap();
    assert_eq!(removed, 1);
    assert!(
        service
            .load_user("grace@example.com")
            .await
            .unwrap()
            .passkeys
            .is_empty()
    );
}
