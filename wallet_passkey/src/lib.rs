//! wallet_passkey - WebAuthn passkey ceremonies for smart-contract wallets
//!
//! This crate issues and consumes passkey challenges, verifies registration and
//! authentication responses, and turns the resulting ECDSA assertions into the 64-byte
//! low-S signatures that on-chain verifiers (e.g. Soroban account contracts) accept.
//!
//! Storage is injected: challenges go through a [`ChallengeStore`] and credentials through
//! a [`CredentialRepository`]. [`PasskeyService`] wires both flows to shared stores.

mod config;
mod passkey;
mod storage;
mod utils;

use std::env;
use std::sync::Arc;

pub use config::PasskeyConfig;

pub use passkey::{
    AuthResult, AuthenticationFlow, AuthenticationOptions, AuthenticationOutcome,
    AuthenticationResponse, AuthenticatorTransport, COMPACT_SIGNATURE_LEN, CompactSignature,
    CredentialDeviceType, CredentialRepository, DB_TABLE_PASSKEY_CREDENTIALS,
    InMemoryCredentialRepository, NewPasskeyCredential, PasskeyCredential, PasskeyError,
    RegistrationFlow, RegistrationOptions, RegistrationOutcome, RegistrationResponse,
    SqliteCredentialRepository, WalletUser, compact_signature,
};

pub use storage::{
    Challenge, ChallengeMetadata, ChallengeStore, InMemoryChallengeStore, StorageError,
};

pub use utils::{UtilError, gen_random_string, normalize_identifier};

/// Registration and authentication flows sharing one challenge store.
pub struct PasskeyService {
    registration: RegistrationFlow,
    authentication: AuthenticationFlow,
    credentials: Arc<dyn CredentialRepository>,
}

impl PasskeyService {
    pub fn new(
        config: PasskeyConfig,
        challenges: Arc<dyn ChallengeStore>,
        credentials: Arc<dyn CredentialRepository>,
    ) -> Self {
        let config = Arc::new(config);
        Self {
            registration: RegistrationFlow::new(
                config.clone(),
                challenges.clone(),
                credentials.clone(),
            ),
            authentication: AuthenticationFlow::new(config, challenges, credentials.clone()),
            credentials,
        }
    }

    /// Service backed by in-process stores only.
    pub fn in_memory(config: PasskeyConfig) -> Self {
        Self::new(
            config,
            Arc::new(InMemoryChallengeStore::new()),
            Arc::new(InMemoryCredentialRepository::new()),
        )
    }

    pub fn registration(&self) -> &RegistrationFlow {
        &self.registration
    }

    pub fn authentication(&self) -> &AuthenticationFlow {
        &self.authentication
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialRepository> {
        &self.credentials
    }

    /// Loads `email` together with the passkeys registered to it.
    pub async fn load_user(&self, email: &str) -> Result<WalletUser, PasskeyError> {
        let passkeys = self
            .credentials
            .get_by_user(&normalize_identifier(email))
            .await?;
        Ok(WalletUser::new(email).with_passkeys(passkeys))
    }
}

/// Builds a [`PasskeyService`] from the environment.
///
/// Loads `.env` if present, reads [`PasskeyConfig::from_env`] and selects the credential
/// store from `PASSKEY_CREDENTIAL_STORE_URL` (`memory`, the default, or a `sqlite:` URL).
pub async fn init() -> Result<PasskeyService, PasskeyError> {
    dotenvy::dotenv().ok();

    let config = PasskeyConfig::from_env()?;

    let store_url =
        env::var("PASSKEY_CREDENTIAL_STORE_URL").unwrap_or_else(|_| "memory".to_string());
    let credentials: Arc<dyn CredentialRepository> = match store_url.as_str() {
        "memory" => Arc::new(InMemoryCredentialRepository::new()),
        url if url.starts_with("sqlite:") => {
            Arc::new(SqliteCredentialRepository::connect(url).await?)
        }
        other => {
            return Err(PasskeyError::Config(format!(
                "Unsupported credential store URL: {other}"
            )));
        }
    };

    tracing::info!(
        "Passkey service initialized for RP ID {} ({} credential store)",
        config.rp_id(),
        store_url
    );

    Ok(PasskeyService::new(
        config,
        Arc::new(InMemoryChallengeStore::new()),
        credentials,
    ))
}
