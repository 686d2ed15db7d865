use ciborium::value::Value as CborValue;
use webpki::EndEntityCert;
use x509_parser::{certificate::X509Certificate, prelude::*};

use crate::passkey::errors::PasskeyError;
use crate::passkey::main::public_key::CoseEc2Key;
use crate::passkey::main::types::AuthenticatorData;

use super::utils::{get_sig_only, get_x5c_from_stmt, verify_not_ca};

/// Verifies a FIDO-U2F attestation statement
///
/// The certificate key signs
/// `0x00 || rpIdHash || clientDataHash || credentialId || 0x04 || x || y`.
pub(super) fn verify_u2f_attestation(
    auth_data: &AuthenticatorData,
    client_data_hash: &[u8],
    att_stmt: &[(CborValue, CborValue)],
) -> Result<(), PasskeyError> {
    tracing::debug!("Verifying FIDO-U2F attestation");

    let sig = get_sig_only(att_stmt).ok_or_else(|| {
        PasskeyError::Verification("Missing signature in FIDO-U2F attestation".to_string())
    })?;

    let x5c = get_x5c_from_stmt(att_stmt).ok_or_else(|| {
        PasskeyError::Verification("Missing x5c in FIDO-U2F attestation".to_string())
    })?;

    let attestn_cert_bytes = &x5c[0];
    let attestn_cert = EndEntityCert::try_from(attestn_cert_bytes.as_ref()).map_err(|e| {
        PasskeyError::Verification(format!(
            "Failed to parse U2F attestation certificate: {e:?}"
        ))
    })?;

    let (_, x509_cert) = X509Certificate::from_der(attestn_cert_bytes).map_err(|e| {
        PasskeyError::Verification(format!("Failed to parse X509 certificate: {e}"))
    })?;

    verify_not_ca(&x509_cert)?;

    let attested = auth_data.attested_credential.as_ref().ok_or_else(|| {
        PasskeyError::Verification("No attested credential data in U2F attestation".into())
    })?;

    let key = CoseEc2Key::from_bytes(&attested.public_key)
        .map_err(|e| PasskeyError::Verification(format!("Invalid credential public key: {e}")))?;

    let mut verification_data = Vec::with_capacity(1 + 32 + 32 + attested.credential_id.len() + 65);
    verification_data.push(0x00);
    verification_data.extend_from_slice(&auth_data.rp_id_hash);
    verification_data.extend_from_slice(client_data_hash);
    verification_data.extend_from_slice(&attested.credential_id);
    verification_data.extend_from_slice(&key.to_uncompressed());

    attestn_cert
        .verify_signature(&webpki::ECDSA_P256_SHA256, &verification_data, &sig)
        .map_err(|_| PasskeyError::Verification("U2F attestation signature invalid".to_string()))?;

    tracing::debug!("FIDO-U2F attestation verification successful");
    Ok(())
}
