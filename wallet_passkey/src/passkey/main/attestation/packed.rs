use ciborium::value::Value as CborValue;
use ring::signature::UnparsedPublicKey;
use std::time::SystemTime;
use webpki::EndEntityCert;
use x509_parser::{certificate::X509Certificate, prelude::*, time::ASN1Time};

use crate::passkey::errors::PasskeyError;
use crate::passkey::main::public_key::CoseEc2Key;
use crate::passkey::main::types::{AttestedCredentialData, AuthenticatorData};

use super::core::format_aaguid;
use super::utils::{get_sig_from_stmt, get_x5c_from_stmt, verify_not_ca};

// id-fido-gen-ce-aaguid
const OID_FIDO_GEN_CE_AAGUID: &str = "1.3.6.1.4.1.45724.1.1.4";
const ES256_ALG: i128 = -7;

/// Verifies a packed attestation statement
///
/// Self attestation is checked against the credential key itself; full attestation
/// against the leaf certificate of `x5c`. ECDAA is rejected.
pub(super) fn verify_packed_attestation(
    auth_data: &AuthenticatorData,
    client_data_hash: &[u8],
    att_stmt: &[(CborValue, CborValue)],
) -> Result<(), PasskeyError> {
    let (alg, sig) = get_sig_from_stmt(att_stmt)?;

    if alg != ES256_ALG {
        return Err(PasskeyError::Verification(format!(
            "Unsupported or unrecognized algorithm: {alg}"
        )));
    }

    let attested = auth_data.attested_credential.as_ref().ok_or_else(|| {
        PasskeyError::Verification("No attested credential data in packed attestation".into())
    })?;

    let mut signed_data = Vec::with_capacity(auth_data.raw_data.len() + client_data_hash.len());
    signed_data.extend_from_slice(&auth_data.raw_data);
    signed_data.extend_from_slice(client_data_hash);

    let has_ecdaa = att_stmt
        .iter()
        .any(|(k, _)| matches!(k, CborValue::Text(k) if k == "ecdaaKeyId"));

    match (get_x5c_from_stmt(att_stmt), has_ecdaa) {
        (Some(x5c), false) => {
            tracing::debug!("Full attestation with certificate chain");

            let attestn_cert_bytes = &x5c[0];
            let attestn_cert =
                EndEntityCert::try_from(attestn_cert_bytes.as_ref()).map_err(|e| {
                    PasskeyError::Verification(format!(
                        "Failed to parse attestation certificate: {e:?}"
                    ))
                })?;

            let (_, x509_cert) = X509Certificate::from_der(attestn_cert_bytes).map_err(|e| {
                PasskeyError::Verification(format!("Failed to parse X509 certificate: {e}"))
            })?;

            verify_packed_attestation_cert(&x509_cert, attested)?;

            attestn_cert
                .verify_signature(&webpki::ECDSA_P256_SHA256, &signed_data, &sig)
                .map_err(|_| {
                    PasskeyError::Verification("Attestation signature invalid".to_string())
                })?;

            if x5c.len() > 1 {
                verify_certificate_chain(&x5c)?;
            }
        }
        (None, true) => {
            return Err(PasskeyError::Verification(
                "ECDAA attestation not supported".to_string(),
            ));
        }
        (None, false) => {
            tracing::debug!("Self attestation");
            verify_self_attestation(attested, &signed_data, &sig)?;
        }
        (Some(_), true) => {
            return Err(PasskeyError::Verification(
                "Invalid attestation: both x5c and ecdaaKeyId present".to_string(),
            ));
        }
    }

    Ok(())
}

fn verify_packed_attestation_cert(
    cert: &X509Certificate,
    attested: &AttestedCredentialData,
) -> Result<(), PasskeyError> {
    verify_not_ca(cert)?;

    // The AAGUID extension value is an OCTET STRING: 0x04 0x10 followed by 16 bytes
    if let Some(fido_ext) = cert
        .extensions()
        .iter()
        .find(|ext| ext.oid.to_string() == OID_FIDO_GEN_CE_AAGUID)
    {
        let cert_aaguid = fido_ext.value.get(2..18).ok_or_else(|| {
            PasskeyError::Verification("Malformed AAGUID certificate extension".to_string())
        })?;

        tracing::debug!("Authenticator AAGUID: {}", format_aaguid(&attested.aaguid));

        if attested.aaguid[..] != *cert_aaguid {
            return Err(PasskeyError::Verification(
                "AAGUID mismatch between certificate and authenticator data".to_string(),
            ));
        }
    }

    Ok(())
}

fn verify_certificate_chain(x5c: &[Vec<u8>]) -> Result<(), PasskeyError> {
    let now = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map_err(|e| PasskeyError::Verification(format!("System time error: {e}")))?;

    let timestamp = ASN1Time::from_timestamp(now.as_secs() as i64)
        .map_err(|e| PasskeyError::Verification(format!("Failed to convert time: {e}")))?;

    for cert_bytes in x5c {
        let (_, cert) = X509Certificate::from_der(cert_bytes).map_err(|e| {
            PasskeyError::Verification(format!("Failed to parse certificate in chain: {e}"))
        })?;

        if !cert.validity().is_valid_at(timestamp) {
            return Err(PasskeyError::Verification(
                "Certificate in chain is expired or not yet valid".to_string(),
            ));
        }
    }

    Ok(())
}

fn verify_self_attestation(
    attested: &AttestedCredentialData,
    signed_data: &[u8],
    signature: &[u8],
) -> Result<(), PasskeyError> {
    let key = CoseEc2Key::from_bytes(&attested.public_key)
        .map_err(|e| PasskeyError::Verification(format!("Invalid credential public key: {e}")))?;
    let point = key.to_uncompressed();

    let public_key = UnparsedPublicKey::new(&ring::signature::ECDSA_P256_SHA256_ASN1, &point);

    public_key.verify(signed_data, signature).map_err(|_| {
        PasskeyError::Verification("Self attestation signature verification failed".to_string())
    })
}
