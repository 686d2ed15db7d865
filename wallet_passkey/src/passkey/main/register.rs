use std::sync::Arc;
use std::time::Duration;

use super::attestation::{format_aaguid, verify_attestation};
use super::public_key::{CoseEc2Key, extract_public_key};
use super::types::{
    AttestationObject, AuthenticatorData, AuthenticatorSelection, CredentialDescriptor,
    ParsedClientData, PubKeyCredParam, PublicKeyCredentialUserEntity, RegistrationInfo,
    RegistrationOptions, RegistrationResponse, RelyingParty,
};

use crate::config::PasskeyConfig;
use crate::passkey::errors::PasskeyError;
use crate::passkey::storage::CredentialRepository;
use crate::passkey::types::{
    AuthenticatorTransport, NewPasskeyCredential, PasskeyCredential, WalletUser,
};
use crate::storage::{ChallengeMetadata, ChallengeStore};
use crate::utils::{base64url_decode, base64url_encode};

const DEFAULT_DEVICE_NAME: &str = "My Device";

/// COSE algorithm identifier for ECDSA P-256 with SHA-256
const COSE_ALG_ES256: i32 = -7;

/// Result of [`RegistrationFlow::complete`].
#[derive(Debug, Clone)]
pub enum RegistrationOutcome {
    /// The credential was verified and stored.
    ///
    /// `public_key_hex` is the uncompressed P-256 point (`04 || x || y`) when it could be
    /// recovered from the response.
    Registered {
        passkey: PasskeyCredential,
        public_key_hex: Option<String>,
    },
    /// The ceremony was valid but the authenticator did not verify the user.
    /// Nothing was stored.
    UserNotVerified,
}

/// Passkey registration ceremony.
pub struct RegistrationFlow {
    config: Arc<PasskeyConfig>,
    challenges: Arc<dyn ChallengeStore>,
    credentials: Arc<dyn CredentialRepository>,
}

impl RegistrationFlow {
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

    /// Issues a fresh challenge for `user` and returns the JSON creation options.
    ///
    /// Any challenge already pending for the user is replaced.
    pub async fn generate_options(
        &self,
        user: &WalletUser,
        device: Option<&str>,
    ) -> Result<String, PasskeyError> {
        let id = user.identifier();
        let nonce = self.challenges.create_challenge(&id).await?;

        let user_entity = PublicKeyCredentialUserEntity {
            id: base64url_encode(id.as_bytes()),
            name: id.clone(),
            display_name: format!(
                "{} | {}",
                self.config.rp_name,
                device.unwrap_or(DEFAULT_DEVICE_NAME)
            ),
        };

        let options = RegistrationOptions {
            challenge: nonce.clone(),
            rp: RelyingParty {
                name: self.config.rp_name.clone(),
                id: self.config.rp_id.clone(),
            },
            user: user_entity.clone(),
            pub_key_cred_params: vec![PubKeyCredParam {
                type_: "public-key".to_string(),
                alg: COSE_ALG_ES256,
            }],
            timeout: self.config.registration_timeout_ms,
            attestation: self.config.attestation.clone(),
            exclude_credentials: user
                .passkeys
                .iter()
                .map(|p| CredentialDescriptor::public_key(&p.credential_id, &p.transports))
                .collect(),
            authenticator_selection: AuthenticatorSelection {
                authenticator_attachment: self.config.authenticator_attachment.clone(),
                resident_key: self.config.resident_key.clone(),
                user_verification: self.config.user_verification.clone(),
            },
        };

        self.challenges
            .store_challenge(
                &id,
                &nonce,
                Some(Duration::from_secs(self.config.challenge_ttl_secs)),
            )
            .await?;
        self.challenges
            .set_metadata(
                &id,
                ChallengeMetadata::Passkey {
                    label: user_entity.display_name,
                    user_id: user_entity.id,
                },
            )
            .await?;

        tracing::debug!("Registration options: {:?}", options);

        Ok(serde_json::to_string(&options)?)
    }

    /// Verifies a registration response and stores the new credential.
    ///
    /// The pending challenge is consumed by every attempt that finds one, successful or not.
    pub async fn complete(
        &self,
        user: &WalletUser,
        response_json: &str,
    ) -> Result<RegistrationOutcome, PasskeyError> {
        let id = user.identifier();

        let challenge = self.challenges.get_challenge(&id).await?.ok_or_else(|| {
            tracing::warn!("No pending registration challenge for {}", id);
            PasskeyError::MissingChallenge("No pending registration challenge".into())
        })?;

        let (label, user_id) = match &challenge.metadata {
            Some(ChallengeMetadata::Passkey { label, user_id }) => (label.clone(), user_id.clone()),
            _ => {
                tracing::warn!("Registration challenge for {} has no passkey metadata", id);
                self.challenges.delete_challenge(&id).await?;
                return Err(PasskeyError::MissingChallenge(
                    "Registration challenge is missing its metadata".into(),
                ));
            }
        };

        let verified = serde_json::from_str::<RegistrationResponse>(response_json)
            .map_err(PasskeyError::from)
            .and_then(|response| {
                let info = verify_registration_response(&response, &challenge.nonce, &self.config)?;
                Ok((response, info))
            });

        self.challenges.delete_challenge(&id).await?;

        let (response, info) = verified?;
        let info = info.ok_or_else(|| {
            PasskeyError::MissingRegistrationInfo(
                "Authenticator data carries no attested credential".into(),
            )
        })?;

        if !info.user_verified {
            tracing::info!("Registration for {} declined: user not verified", id);
            return Ok(RegistrationOutcome::UserNotVerified);
        }

        let credential_id = base64url_encode(&info.credential_id);
        if let Some(existing) = self.credentials.get_by_id(&credential_id).await? {
            if existing.user_email != id {
                tracing::warn!(
                    "Credential {} is already registered to another user, rejecting for {}",
                    credential_id,
                    id
                );
                return Err(PasskeyError::Verification(
                    "Credential is already registered to another user".into(),
                ));
            }
        }

        let public_key_hex = extract_public_key(&response.response);

        let credential = NewPasskeyCredential {
            credential_id,
            user_email: id,
            webauthn_user_id: user_id,
            label,
            public_key: base64url_encode(&info.public_key),
            hex_public_key: public_key_hex.clone(),
            counter: info.counter,
            transports: AuthenticatorTransport::from_hints(&response.response.transports),
            device_type: info.device_type,
            backed_up: info.backed_up,
        };

        let passkey = self.credentials.create(credential, true).await?;

        tracing::info!(
            "Registered passkey {} (fmt: {}, aaguid: {})",
            passkey.credential_id,
            info.fmt,
            info.aaguid
        );

        Ok(RegistrationOutcome::Registered {
            passkey,
            public_key_hex,
        })
    }
}

/// Checks a registration response against the stored challenge and relying party.
///
/// Returns `Ok(None)` when the authenticator data carries no attested credential.
pub(super) fn verify_registration_response(
    response: &RegistrationResponse,
    expected_challenge: &str,
    config: &PasskeyConfig,
) -> Result<Option<RegistrationInfo>, PasskeyError> {
    let client_data = ParsedClientData::from_base64(&response.response.client_data_json)?;
    tracing::debug!("Parsed client data: {:?}", client_data);
    client_data.verify("webauthn.create", expected_challenge, &config.origin)?;

    let attestation = AttestationObject::from_base64(&response.response.attestation_object)?;
    let auth_data = AuthenticatorData::from_bytes(&attestation.auth_data)?;
    tracing::debug!("Parsed authenticator data: {:?}", auth_data);
    auth_data.verify(&config.rp_id)?;

    let Some(attested) = auth_data.attested_credential.as_ref() else {
        tracing::warn!("Registration authenticator data has no attested credential");
        return Ok(None);
    };

    let raw_id = base64url_decode(&response.raw_id)
        .map_err(|_| PasskeyError::Format("rawId is not base64url".into()))?;
    if attested.credential_id != raw_id {
        tracing::error!("Credential ID in authenticator data does not match rawId");
        return Err(PasskeyError::Verification(
            "Credential ID does not match rawId".into(),
        ));
    }

    CoseEc2Key::from_bytes(&attested.public_key)?;

    verify_attestation(&attestation, &auth_data, &client_data.raw_data)?;

    Ok(Some(RegistrationInfo {
        credential_id: attested.credential_id.clone(),
        public_key: attested.public_key.clone(),
        counter: auth_data.counter,
        user_verified: auth_data.is_user_verified(),
        device_type: auth_data.device_type(),
        backed_up: auth_data.is_backed_up(),
        aaguid: format_aaguid(&attested.aaguid),
        fmt: attestation.fmt.clone(),
    }))
}
