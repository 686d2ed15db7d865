use ciborium::value::Value as CborValue;
use ring::digest;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::passkey::errors::PasskeyError;
use crate::passkey::types::{AuthenticatorTransport, CredentialDeviceType};
use crate::utils::base64url_decode;

/// Options passed to `navigator.credentials.create()`.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationOptions {
    pub(super) challenge: String,
    pub(super) rp: RelyingParty,
    pub(super) user: PublicKeyCredentialUserEntity,
    pub(super) pub_key_cred_params: Vec<PubKeyCredParam>,
    pub(super) timeout: u32,
    pub(super) attestation: String,
    pub(super) exclude_credentials: Vec<CredentialDescriptor>,
    pub(super) authenticator_selection: AuthenticatorSelection,
}

/// Options passed to `navigator.credentials.get()`.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationOptions {
    pub(super) challenge: String,
    pub(super) timeout: u32,
    pub(super) rp_id: String,
    pub(super) allow_credentials: Vec<CredentialDescriptor>,
    pub(super) user_verification: String,
}

#[derive(Serialize, Debug)]
pub(super) struct RelyingParty {
    pub(super) name: String,
    pub(super) id: String,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub(super) struct PublicKeyCredentialUserEntity {
    pub(super) id: String,
    pub(super) name: String,
    pub(super) display_name: String,
}

#[derive(Serialize, Debug)]
pub(super) struct PubKeyCredParam {
    #[serde(rename = "type")]
    pub(super) type_: String,
    pub(super) alg: i32,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub(super) struct AuthenticatorSelection {
    pub(super) authenticator_attachment: String,
    pub(super) resident_key: String,
    pub(super) user_verification: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub(super) struct CredentialDescriptor {
    pub(super) id: String,
    #[serde(rename = "type")]
    pub(super) type_: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub(super) transports: Vec<AuthenticatorTransport>,
}

impl CredentialDescriptor {
    pub(super) fn public_key(id: &str, transports: &[AuthenticatorTransport]) -> Self {
        Self {
            id: id.to_string(),
            type_: "public-key".to_string(),
            transports: transports.to_vec(),
        }
    }
}

/// Registration response posted by the browser (`PublicKeyCredential` JSON).
#[allow(unused)]
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationResponse {
    pub(super) id: String,
    pub(super) raw_id: String,
    pub(super) response: AuthenticatorAttestationResponse,
    #[serde(rename = "type")]
    pub(super) type_: String,
    pub(super) authenticator_attachment: Option<String>,
}

/// Attestation part of a registration response.
///
/// `authenticatorData` and `publicKey` are the convenience fields newer browsers add; both
/// are optional.
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorAttestationResponse {
    #[serde(rename = "clientDataJSON")]
    pub(super) client_data_json: String,
    pub(super) attestation_object: String,
    #[serde(default)]
    pub(super) authenticator_data: Option<String>,
    #[serde(default)]
    pub(super) public_key: Option<String>,
    #[serde(default)]
    pub(super) public_key_algorithm: Option<i64>,
    #[serde(default)]
    pub(super) transports: Vec<String>,
}

/// Authentication response posted by the browser.
#[allow(unused)]
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationResponse {
    pub(super) id: String,
    pub(super) raw_id: String,
    pub(super) response: AuthenticatorAssertionResponse,
    #[serde(rename = "type")]
    pub(super) type_: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub(super) struct AuthenticatorAssertionResponse {
    #[serde(rename = "clientDataJSON")]
    pub(super) client_data_json: String,
    pub(super) authenticator_data: String,
    pub(super) signature: String,
    #[serde(default)]
    pub(super) user_handle: Option<String>,
}

/// Result of a successful registration verification.
#[derive(Debug, Clone)]
pub(super) struct RegistrationInfo {
    pub(super) credential_id: Vec<u8>,
    pub(super) public_key: Vec<u8>,
    pub(super) counter: u32,
    pub(super) user_verified: bool,
    pub(super) device_type: CredentialDeviceType,
    pub(super) backed_up: bool,
    pub(super) aaguid: String,
    pub(super) fmt: String,
}

/// Result of a successful assertion verification.
#[derive(Debug, Clone, Copy)]
pub(super) struct AuthenticationInfo {
    pub(super) new_counter: u32,
    pub(super) user_verified: bool,
}

#[derive(Debug)]
pub(super) struct AttestationObject {
    pub(super) fmt: String,
    pub(super) auth_data: Vec<u8>,
    pub(super) att_stmt: Vec<(CborValue, CborValue)>,
}

impl AttestationObject {
    pub(super) fn from_base64(attestation_base64: &str) -> Result<Self, PasskeyError> {
        let attestation_bytes = base64url_decode(attestation_base64).map_err(|e| {
            PasskeyError::Format(format!("Failed to decode attestation object: {e}"))
        })?;
        Self::from_bytes(&attestation_bytes)
    }

    pub(super) fn from_bytes(attestation_bytes: &[u8]) -> Result<Self, PasskeyError> {
        let attestation_cbor: CborValue = ciborium::de::from_reader(attestation_bytes)
            .map_err(|e| PasskeyError::Format(format!("Invalid CBOR data: {e}")))?;

        let CborValue::Map(map) = attestation_cbor else {
            return Err(PasskeyError::Format(
                "Invalid attestation format".to_string(),
            ));
        };

        let mut fmt = None;
        let mut auth_data = None;
        let mut att_stmt = None;

        for (key, value) in map {
            if let CborValue::Text(k) = key {
                match (k.as_str(), value) {
                    ("fmt", CborValue::Text(f)) => fmt = Some(f),
                    ("authData", CborValue::Bytes(data)) => auth_data = Some(data),
                    ("attStmt", CborValue::Map(stmt)) => att_stmt = Some(stmt),
                    _ => {}
                }
            }
        }

        tracing::debug!(
            "Attestation format: {:?}, auth data length: {:?}",
            fmt,
            auth_data.as_ref().map(Vec::len)
        );

        match (fmt, auth_data, att_stmt) {
            (Some(fmt), Some(auth_data), Some(att_stmt)) => Ok(Self {
                fmt,
                auth_data,
                att_stmt,
            }),
            _ => Err(PasskeyError::Format(
                "Missing required attestation data".to_string(),
            )),
        }
    }
}

#[derive(Debug)]
pub(super) struct ParsedClientData {
    pub(super) challenge: String,
    pub(super) origin: String,
    pub(super) type_: String,
    pub(super) raw_data: Vec<u8>,
}

impl ParsedClientData {
    pub(super) fn from_base64(client_data_json: &str) -> Result<Self, PasskeyError> {
        let raw_data = base64url_decode(client_data_json)
            .map_err(|e| PasskeyError::Format(format!("Failed to decode: {e}")))?;

        let data_str = std::str::from_utf8(&raw_data)
            .map_err(|e| PasskeyError::Format(format!("Invalid UTF-8: {e}")))?;

        let data: serde_json::Value = serde_json::from_str(data_str)
            .map_err(|e| PasskeyError::Format(format!("Invalid JSON: {e}")))?;

        let field = |name: &str| {
            data[name]
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| PasskeyError::ClientData(format!("Missing {name}")))
        };

        Ok(Self {
            challenge: field("challenge")?,
            origin: field("origin")?,
            type_: field("type")?,
            raw_data,
        })
    }

    /// Checks ceremony type, challenge and origin.
    ///
    /// Challenges are compared as decoded bytes in constant time.
    pub(super) fn verify(
        &self,
        expected_type: &str,
        stored_challenge: &str,
        expected_origin: &str,
    ) -> Result<(), PasskeyError> {
        if self.type_ != expected_type {
            tracing::error!("Invalid client data type: {}", self.type_);
            return Err(PasskeyError::ClientData(format!(
                "Invalid type. Expected '{expected_type}', Got: {}",
                self.type_
            )));
        }

        let received = base64url_decode(&self.challenge)
            .map_err(|_| PasskeyError::Challenge("Challenge is not base64url".to_string()))?;
        let expected = base64url_decode(stored_challenge)
            .map_err(|_| PasskeyError::Challenge("Stored challenge is corrupt".to_string()))?;

        if !bool::from(received.ct_eq(&expected)) {
            tracing::debug!(
                "Challenge mismatch: client: {}, stored: {}",
                self.challenge,
                stored_challenge
            );
            return Err(PasskeyError::Challenge(
                "Challenge mismatch. For more details, run with RUST_LOG=debug".into(),
            ));
        }

        if self.origin != expected_origin {
            tracing::error!(
                "Invalid origin. Expected {}, got {}",
                expected_origin,
                self.origin
            );
            return Err(PasskeyError::ClientData(format!(
                "Invalid origin. Expected: {expected_origin}, Got: {}",
                self.origin
            )));
        }

        Ok(())
    }
}

/// Flags for AuthenticatorData (WebAuthn Level 2)
pub(super) mod auth_data_flags {
    /// User Present (UP) - Bit 0
    pub(crate) const UP: u8 = 1 << 0;
    /// User Verified (UV) - Bit 2
    pub(crate) const UV: u8 = 1 << 2;
    /// Backup Eligibility (BE) - Bit 3
    pub(crate) const BE: u8 = 1 << 3;
    /// Backup State (BS) - Bit 4
    pub(crate) const BS: u8 = 1 << 4;
    /// Attested Credential Data Present - Bit 6
    pub(crate) const AT: u8 = 1 << 6;
    /// Extension Data Present - Bit 7
    pub(crate) const ED: u8 = 1 << 7;
}

/// Length of RP ID hash, flags and counter.
const AUTH_DATA_HEADER_LEN: usize = 37;
const AAGUID_LEN: usize = 16;

/// Credential data present when the AT flag is set.
#[derive(Debug, Clone)]
pub(super) struct AttestedCredentialData {
    pub(super) aaguid: [u8; AAGUID_LEN],
    pub(super) credential_id: Vec<u8>,
    /// COSE key exactly as encoded by the authenticator
    pub(super) public_key: Vec<u8>,
}

/// AuthenticatorData structure (WebAuthn Level 2)
/// https://www.w3.org/TR/webauthn-2/#sctn-authenticator-data
#[derive(Debug)]
pub(super) struct AuthenticatorData {
    /// SHA-256 hash of the RP ID (32 bytes)
    pub(super) rp_id_hash: Vec<u8>,
    pub(super) flags: u8,
    /// Signature counter, 32-bit unsigned big-endian integer
    pub(super) counter: u32,
    pub(super) attested_credential: Option<AttestedCredentialData>,
    /// Raw authenticator data for signature verification
    pub(super) raw_data: Vec<u8>,
}

impl AuthenticatorData {
    pub(super) fn from_base64(auth_data: &str) -> Result<Self, PasskeyError> {
        let data = base64url_decode(auth_data)
            .map_err(|e| PasskeyError::Format(format!("Failed to decode: {e}")))?;
        Self::from_bytes(&data)
    }

    /// Parse authenticator data
    /// Format (minimum 37 bytes):
    /// - RP ID Hash (32 bytes)
    /// - Flags (1 byte)
    /// - Counter (4 bytes)
    /// - Optional: Attested Credential Data (AAGUID, credential ID length and ID, COSE key)
    /// - Optional: Extensions
    pub(super) fn from_bytes(data: &[u8]) -> Result<Self, PasskeyError> {
        if data.len() < AUTH_DATA_HEADER_LEN {
            return Err(PasskeyError::AuthenticatorData(
                "Authenticator data too short. For more details, run with RUST_LOG=debug".into(),
            ));
        }

        let flags = data[32];
        let attested_credential = if flags & auth_data_flags::AT != 0 {
            Some(parse_attested_credential(&data[AUTH_DATA_HEADER_LEN..])?)
        } else {
            None
        };

        Ok(Self {
            rp_id_hash: data[..32].to_vec(),
            flags,
            counter: u32::from_be_bytes([data[33], data[34], data[35], data[36]]),
            attested_credential,
            raw_data: data.to_vec(),
        })
    }

    pub(super) fn is_user_present(&self) -> bool {
        (self.flags & auth_data_flags::UP) != 0
    }

    pub(super) fn is_user_verified(&self) -> bool {
        (self.flags & auth_data_flags::UV) != 0
    }

    /// Backup eligible: the credential may be synced between devices
    pub(super) fn is_backup_eligible(&self) -> bool {
        (self.flags & auth_data_flags::BE) != 0
    }

    pub(super) fn is_backed_up(&self) -> bool {
        (self.flags & auth_data_flags::BS) != 0
    }

    pub(super) fn has_extension_data(&self) -> bool {
        (self.flags & auth_data_flags::ED) != 0
    }

    pub(super) fn device_type(&self) -> CredentialDeviceType {
        if self.is_backup_eligible() {
            CredentialDeviceType::MultiDevice
        } else {
            CredentialDeviceType::SingleDevice
        }
    }

    /// Checks the RP ID hash and the user-present flag.
    ///
    /// User verification is not enforced here; the flows report it as an outcome.
    pub(super) fn verify(&self, rp_id: &str) -> Result<(), PasskeyError> {
        let expected_hash = digest::digest(&digest::SHA256, rp_id.as_bytes());
        if self.rp_id_hash != expected_hash.as_ref() {
            tracing::error!("RP ID hash mismatch for {}", rp_id);
            return Err(PasskeyError::AuthenticatorData(format!(
                "Invalid RP ID hash. Expected: {:?}, Got: {:?}",
                expected_hash.as_ref(),
                self.rp_id_hash
            )));
        }

        if !self.is_user_present() {
            return Err(PasskeyError::AuthenticatorData(
                "User not present. For more details, run with RUST_LOG=debug".into(),
            ));
        }

        tracing::debug!("Authenticator data verification passed");
        tracing::debug!("User present: {}", self.is_user_present());
        tracing::debug!("User verified: {}", self.is_user_verified());
        tracing::debug!("Backup eligible: {}", self.is_backup_eligible());
        tracing::debug!("Backed up: {}", self.is_backed_up());
        tracing::debug!(
            "Attested credential data: {}",
            self.attested_credential.is_some()
        );
        tracing::debug!("Extension data: {}", self.has_extension_data());

        Ok(())
    }
}

fn parse_attested_credential(data: &[u8]) -> Result<AttestedCredentialData, PasskeyError> {
    if data.len() < AAGUID_LEN + 2 {
        return Err(PasskeyError::AuthenticatorData(
            "Attested credential data too short".to_string(),
        ));
    }

    let mut aaguid = [0u8; AAGUID_LEN];
    aaguid.copy_from_slice(&data[..AAGUID_LEN]);

    let cred_id_len = u16::from_be_bytes([data[AAGUID_LEN], data[AAGUID_LEN + 1]]) as usize;
    let cred_id_start = AAGUID_LEN + 2;
    let cred_id_end = cred_id_start + cred_id_len;

    if cred_id_len == 0 || cred_id_len > 1023 {
        return Err(PasskeyError::AuthenticatorData(format!(
            "Invalid credential ID length: {cred_id_len}"
        )));
    }
    if data.len() <= cred_id_end {
        return Err(PasskeyError::AuthenticatorData(
            "Authenticator data too short for credential ID".to_string(),
        ));
    }

    // The COSE key is followed by optional extensions, so decode one CBOR item
    // and keep exactly the bytes it spans.
    let key_bytes = &data[cred_id_end..];
    let mut rest = key_bytes;
    let _: CborValue = ciborium::de::from_reader(&mut rest)
        .map_err(|e| PasskeyError::AuthenticatorData(format!("Invalid public key CBOR: {e}")))?;
    let key_len = key_bytes.len() - rest.len();

    Ok(AttestedCredentialData {
        aaguid,
        credential_id: data[cred_id_start..cred_id_end].to_vec(),
        public_key: key_bytes[..key_len].to_vec(),
    })
}
