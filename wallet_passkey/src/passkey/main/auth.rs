use std::sync::Arc;
use std::time::Duration;

use ring::{digest, signature::UnparsedPublicKey};

use super::public_key::CoseEc2Key;
use super::signature::{CompactSignature, compact_signature};
use super::types::{
    AuthenticationInfo, AuthenticationOptions, AuthenticationResponse, AuthenticatorData,
    CredentialDescriptor, ParsedClientData,
};

use crate::config::PasskeyConfig;
use crate::passkey::errors::PasskeyError;
use crate::passkey::storage::CredentialRepository;
use crate::passkey::types::{PasskeyCredential, WalletUser};
use crate::storage::{Challenge, ChallengeMetadata, ChallengeStore};
use crate::utils::{base64url_decode, base64url_encode};

/// Proof material produced by a successful assertion.
///
/// `client_data_json` and `authenticator_data` are the raw bytes the authenticator signed
/// over, and `compact_signature` is that signature in the low-S `r || s` form expected by
/// on-chain verifiers.
#[derive(Debug, Clone)]
pub struct AuthResult {
    pub passkey: PasskeyCredential,
    pub client_data_json: Vec<u8>,
    pub authenticator_data: Vec<u8>,
    pub compact_signature: CompactSignature,
    /// Metadata bound by [`AuthenticationFlow::generate_options`], unchanged
    pub custom_metadata: Option<ChallengeMetadata>,
}

/// Result of [`AuthenticationFlow::complete`].
#[derive(Debug, Clone)]
pub enum AuthenticationOutcome {
    Authenticated(AuthResult),
    /// The assertion was valid but the authenticator did not verify the user.
    /// The stored counter is left untouched.
    UserNotVerified,
}

/// Passkey authentication ceremony.
pub struct AuthenticationFlow {
    config: Arc<PasskeyConfig>,
    challenges: Arc<dyn ChallengeStore>,
    credentials: Arc<dyn CredentialRepository>,
}

impl AuthenticationFlow {
    pub fn new(
        config: Arc<PasskeyConfig>,
        challenges: Arc<dyn ChallengeStore>,
        credentials: Arc<dyn CredentialRepository>,
    ) -> Self {
        Self {
            config,
            challenges,
            credentials,
        }
    }

    /// Issues a challenge for `user` and returns the JSON request options.
    ///
    /// `custom_challenge` replaces the random nonce, e.g. with the hash of a transaction
    /// to authorize. `custom_metadata` is bound to the challenge and returned by
    /// [`complete`](Self::complete).
    pub async fn generate_options(
        &self,
        user: &WalletUser,
        custom_challenge: Option<&[u8]>,
        custom_metadata: Option<ChallengeMetadata>,
    ) -> Result<String, PasskeyError> {
        let id = user.identifier();

        let nonce = match custom_challenge {
            Some([]) => {
                return Err(PasskeyError::Challenge(
                    "Custom challenge must not be empty".into(),
                ));
            }
            Some(bytes) => base64url_encode(bytes),
            None => self.challenges.create_challenge(&id).await?,
        };

        let options = AuthenticationOptions {
            challenge: nonce.clone(),
            timeout: self.config.authentication_timeout_ms,
            rp_id: self.config.rp_id.clone(),
            allow_credentials: user
                .passkeys
                .iter()
                .map(|p| CredentialDescriptor::public_key(&p.credential_id, &p.transports))
                .collect(),
            user_verification: self.config.user_verification.clone(),
        };

        self.challenges
            .store_challenge(
                &id,
                &nonce,
                Some(Duration::from_secs(self.config.challenge_ttl_secs)),
            )
            .await?;
        if let Some(metadata) = custom_metadata {
            self.challenges.set_metadata(&id, metadata).await?;
        }

        tracing::debug!("Auth options: {:?}", options);

        Ok(serde_json::to_string(&options)?)
    }

    /// Verifies an assertion, records the new signature counter and returns the proof.
    ///
    /// The pending challenge is consumed by every attempt that finds one, successful or not.
    pub async fn complete(
        &self,
        user: &WalletUser,
        response_json: &str,
    ) -> Result<AuthenticationOutcome, PasskeyError> {
        let id = user.identifier();

        let challenge = self.challenges.get_challenge(&id).await?.ok_or_else(|| {
            tracing::warn!("No pending authentication challenge for {}", id);
            PasskeyError::MissingChallenge("No pending authentication challenge".into())
        })?;

        let verified = self.verify(&id, &challenge, response_json).await;

        self.challenges.delete_challenge(&id).await?;

        let (passkey, response, info) = verified?;

        if !info.user_verified {
            tracing::info!("Authentication for {} declined: user not verified", id);
            return Ok(AuthenticationOutcome::UserNotVerified);
        }

        let signature = base64url_decode(&response.response.signature)?;
        let compact_signature = compact_signature(&signature)?;

        let passkey = if info.new_counter != passkey.counter {
            self.credentials
                .update_counter(&passkey.credential_id, info.new_counter)
                .await?
        } else {
            passkey
        };

        tracing::info!(
            "Authenticated {} with passkey {} (counter {})",
            id,
            passkey.credential_id,
            passkey.counter
        );

        Ok(AuthenticationOutcome::Authenticated(AuthResult {
            passkey,
            client_data_json: base64url_decode(&response.response.client_data_json)?,
            authenticator_data: base64url_decode(&response.response.authenticator_data)?,
            compact_signature,
            custom_metadata: challenge.metadata,
        }))
    }

    async fn verify(
        &self,
        id: &str,
        challenge: &Challenge,
        response_json: &str,
    ) -> Result<(PasskeyCredential, AuthenticationResponse, AuthenticationInfo), PasskeyError> {
        let response: AuthenticationResponse = serde_json::from_str(response_json)?;

        let passkey = self
            .credentials
            .get_by_id(&response.id)
            .await?
            .ok_or_else(|| {
                tracing::error!("Credential not found: {}", response.id);
                PasskeyError::MissingCredential(format!("Unknown credential {}", response.id))
            })?;

        if passkey.user_email != id {
            tracing::error!(
                "Credential {} belongs to another user than {}",
                passkey.credential_id,
                id
            );
            return Err(PasskeyError::Authentication(
                "Credential does not belong to this user".into(),
            ));
        }

        let info =
            verify_authentication_response(&response, &challenge.nonce, &passkey, &self.config)?;

        Ok((passkey, response, info))
    }
}

/// Checks an assertion against the stored challenge and credential.
///
/// Verifies client data, authenticator data, the ECDSA signature over
/// `authenticatorData || SHA-256(clientDataJSON)` and the signature counter.
pub(super) fn verify_authentication_response(
    response: &AuthenticationResponse,
    expected_challenge: &str,
    credential: &PasskeyCredential,
    config: &PasskeyConfig,
) -> Result<AuthenticationInfo, PasskeyError> {
    let client_data = ParsedClientData::from_base64(&response.response.client_data_json)?;
    tracing::debug!("Parsed client data: {:?}", client_data);
    client_data.verify("webauthn.get", expected_challenge, &config.origin)?;

    let auth_data = AuthenticatorData::from_base64(&response.response.authenticator_data)?;
    tracing::debug!("Parsed authenticator data: {:?}", auth_data);
    auth_data.verify(&config.rp_id)?;

    verify_user_handle(response, credential)?;

    let cose_key = base64url_decode(&credential.public_key)
        .map_err(|e| PasskeyError::Format(format!("Invalid stored public key: {e}")))?;
    let point = CoseEc2Key::from_bytes(&cose_key)?.to_uncompressed();

    let signature = base64url_decode(&response.response.signature)
        .map_err(|e| PasskeyError::Format(format!("Invalid signature: {e}")))?;

    let client_data_hash = digest::digest(&digest::SHA256, &client_data.raw_data);
    let mut signed_data = auth_data.raw_data.clone();
    signed_data.extend_from_slice(client_data_hash.as_ref());

    UnparsedPublicKey::new(&ring::signature::ECDSA_P256_SHA256_ASN1, point)
        .verify(&signed_data, &signature)
        .map_err(|e| {
            tracing::error!("Signature verification failed: {:?}", e);
            PasskeyError::Verification(
                "Signature verification failed. For more details, run with RUST_LOG=debug".into(),
            )
        })?;

    verify_counter(credential.counter, auth_data.counter)?;

    Ok(AuthenticationInfo {
        new_counter: auth_data.counter,
        user_verified: auth_data.is_user_verified(),
    })
}

fn verify_user_handle(
    response: &AuthenticationResponse,
    credential: &PasskeyCredential,
) -> Result<(), PasskeyError> {
    match response.response.user_handle.as_deref() {
        Some(handle) if !handle.is_empty() && handle != credential.webauthn_user_id => {
            tracing::error!(
                "User handle mismatch: stored {}, received {}",
                credential.webauthn_user_id,
                handle
            );
            Err(PasskeyError::Authentication(
                "User handle does not match the credential".into(),
            ))
        }
        _ => Ok(()),
    }
}

/// A counter of zero on both sides means the authenticator does not keep one.
fn verify_counter(stored: u32, received: u32) -> Result<(), PasskeyError> {
    tracing::debug!(
        "Counter verification - stored: {}, received: {}",
        stored,
        received
    );
    if (stored > 0 || received > 0) && received <= stored {
        tracing::warn!(
            "Counter verification failed - stored: {}, received: {}",
            stored,
            received
        );
        return Err(PasskeyError::Authentication(
            "Counter value did not increase - possible credential cloning".into(),
        ));
    }
    Ok(())
}
