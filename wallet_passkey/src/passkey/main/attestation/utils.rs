use ciborium::value::Value as CborValue;
use x509_parser::certificate::X509Certificate;
use x509_parser::extensions::ParsedExtension;

use crate::passkey::errors::PasskeyError;

/// Reads `alg` and `sig` from an attestation statement.
pub(super) fn get_sig_from_stmt(
    att_stmt: &[(CborValue, CborValue)],
) -> Result<(i128, Vec<u8>), PasskeyError> {
    let mut alg: Option<i128> = None;
    let mut sig: Option<Vec<u8>> = None;

    for (key, value) in att_stmt {
        match (key, value) {
            (CborValue::Text(k), CborValue::Integer(a)) if k == "alg" => {
                alg = Some(i128::from(*a));
            }
            (CborValue::Text(k), CborValue::Bytes(s)) if k == "sig" => {
                sig = Some(s.clone());
            }
            _ => {}
        }
    }

    match (alg, sig) {
        (Some(a), Some(s)) => Ok((a, s)),
        _ => Err(PasskeyError::Verification(
            "Missing algorithm or signature in attestation statement".to_string(),
        )),
    }
}

/// Reads the `sig` entry alone (fido-u2f statements have no `alg`).
pub(super) fn get_sig_only(att_stmt: &[(CborValue, CborValue)]) -> Option<Vec<u8>> {
    att_stmt.iter().find_map(|(k, v)| match (k, v) {
        (CborValue::Text(k), CborValue::Bytes(s)) if k == "sig" => Some(s.clone()),
        _ => None,
    })
}

/// Reads the `x5c` certificate chain, if present and non-empty.
pub(super) fn get_x5c_from_stmt(att_stmt: &[(CborValue, CborValue)]) -> Option<Vec<Vec<u8>>> {
    att_stmt.iter().find_map(|(k, v)| match (k, v) {
        (CborValue::Text(k), CborValue::Array(certs)) if k == "x5c" => {
            let chain: Vec<Vec<u8>> = certs
                .iter()
                .filter_map(|c| match c {
                    CborValue::Bytes(b) => Some(b.clone()),
                    _ => None,
                })
                .collect();
            (!chain.is_empty()).then_some(chain)
        }
        _ => None,
    })
}

/// Attestation certificates must not be CA certificates.
pub(super) fn verify_not_ca(cert: &X509Certificate) -> Result<(), PasskeyError> {
    let basic_constraints = cert.extensions().iter().find(|ext| {
        ext.oid.as_bytes() == oid_registry::OID_X509_EXT_BASIC_CONSTRAINTS.as_bytes()
    });

    if let Some(ext) = basic_constraints {
        if let ParsedExtension::BasicConstraints(bc) = ext.parsed_extension() {
            if bc.ca {
                return Err(PasskeyError::Verification(
                    "Certificate must not be a CA certificate".to_string(),
                ));
            }
        }
    }
    Ok(())
}
