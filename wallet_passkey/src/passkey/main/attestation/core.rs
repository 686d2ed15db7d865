use ring::digest;
use uuid::Uuid;

use crate::passkey::errors::PasskeyError;

use super::super::types::{AttestationObject, AuthenticatorData};
use super::none::verify_none_attestation;
use super::packed::verify_packed_attestation;
use super::u2f::verify_u2f_attestation;

/// Verifies the attestation statement of a registration for its declared format.
pub(crate) fn verify_attestation(
    attestation: &AttestationObject,
    auth_data: &AuthenticatorData,
    client_data: &[u8],
) -> Result<(), PasskeyError> {
    let client_data_hash = digest::digest(&digest::SHA256, client_data);

    let result = match attestation.fmt.as_str() {
        "none" => {
            // for platform authenticators
            tracing::debug!("Using 'none' attestation format");
            verify_none_attestation(&attestation.att_stmt)
        }
        "packed" => {
            tracing::debug!("Using 'packed' attestation format");
            verify_packed_attestation(auth_data, client_data_hash.as_ref(), &attestation.att_stmt)
        }
        "fido-u2f" => {
            tracing::debug!("Using 'fido-u2f' attestation format");
            verify_u2f_attestation(auth_data, client_data_hash.as_ref(), &attestation.att_stmt)
        }
        other => {
            tracing::error!("Unsupported attestation format: {}", other);
            Err(PasskeyError::Verification(format!(
                "Unsupported attestation format: {other}"
            )))
        }
    };

    result.map_err(|e| match e {
        PasskeyError::Verification(_) => e,
        other => PasskeyError::Verification(format!("Attestation verification failed: {other}")),
    })
}

pub(crate) fn format_aaguid(aaguid: &[u8; 16]) -> String {
    Uuid::from_bytes(*aaguid).hyphenated().to_string()
}
