use ciborium::value::Value as CborValue;

use super::types::{AttestationObject, AuthenticatorAttestationResponse, AuthenticatorData};
use crate::passkey::errors::PasskeyError;
use crate::utils::base64url_decode;

const COSE_KEY_KTY: i128 = 1;
const COSE_KEY_ALG: i128 = 3;
const COSE_KEY_CRV: i128 = -1;
const COSE_KEY_X: i128 = -2;
const COSE_KEY_Y: i128 = -3;

const COSE_KTY_EC2: i128 = 2;
const COSE_ALG_ES256: i128 = -7;
const COSE_CRV_P256: i128 = 1;

const COORD_LEN: usize = 32;
pub(crate) const UNCOMPRESSED_POINT_LEN: usize = 1 + 2 * COORD_LEN;

/// DER SubjectPublicKeyInfo prefix of a P-256 key:
/// SEQUENCE { SEQUENCE { ecPublicKey, prime256v1 }, BIT STRING (0 unused bits) }
const P256_SPKI_HEADER: [u8; 26] = [
    0x30, 0x59, 0x30, 0x13, 0x06, 0x07, 0x2a, 0x86, 0x48, 0xce, 0x3d, 0x02, 0x01, 0x06, 0x08, 0x2a,
    0x86, 0x48, 0xce, 0x3d, 0x03, 0x01, 0x07, 0x03, 0x42, 0x00,
];

/// An EC2 P-256 public key decoded from its COSE map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CoseEc2Key {
    pub(crate) x: [u8; COORD_LEN],
    pub(crate) y: [u8; COORD_LEN],
}

impl CoseEc2Key {
    pub(crate) fn from_bytes(bytes: &[u8]) -> Result<Self, PasskeyError> {
        let value: CborValue = ciborium::de::from_reader(bytes)
            .map_err(|e| PasskeyError::Format(format!("Invalid public key CBOR: {e}")))?;
        Self::from_cbor(&value)
    }

    /// Accepts only `{1: 2, 3: -7, -1: 1, -2: x, -3: y}` with 32-byte coordinates.
    /// The algorithm label may be absent.
    pub(crate) fn from_cbor(value: &CborValue) -> Result<Self, PasskeyError> {
        let CborValue::Map(entries) = value else {
            return Err(PasskeyError::Format(
                "Invalid public key format".to_string(),
            ));
        };

        let mut kty = None;
        let mut alg = None;
        let mut crv = None;
        let mut x = None;
        let mut y = None;

        for (key, value) in entries {
            let CborValue::Integer(label) = key else {
                continue;
            };
            match (i128::from(*label), value) {
                (COSE_KEY_KTY, CborValue::Integer(v)) => kty = Some(i128::from(*v)),
                (COSE_KEY_ALG, CborValue::Integer(v)) => alg = Some(i128::from(*v)),
                (COSE_KEY_CRV, CborValue::Integer(v)) => crv = Some(i128::from(*v)),
                (COSE_KEY_X, CborValue::Bytes(v)) => x = Some(v.as_slice()),
                (COSE_KEY_Y, CborValue::Bytes(v)) => y = Some(v.as_slice()),
                _ => {}
            }
        }

        if kty != Some(COSE_KTY_EC2) {
            return Err(PasskeyError::Format(format!(
                "Unsupported COSE key type: {kty:?}"
            )));
        }
        if alg.is_some_and(|alg| alg != COSE_ALG_ES256) {
            return Err(PasskeyError::Format(format!(
                "Unsupported COSE algorithm: {alg:?}"
            )));
        }
        if crv != Some(COSE_CRV_P256) {
            return Err(PasskeyError::Format(format!(
                "Unsupported COSE curve: {crv:?}"
            )));
        }

        let coord = |c: Option<&[u8]>, name: &str| -> Result<[u8; COORD_LEN], PasskeyError> {
            c.and_then(|c| <[u8; COORD_LEN]>::try_from(c).ok())
                .ok_or_else(|| {
                    PasskeyError::Format(format!("Missing or invalid {name} coordinate"))
                })
        };

        Ok(Self {
            x: coord(x, "x")?,
            y: coord(y, "y")?,
        })
    }

    /// `0x04 || x || y`
    pub(crate) fn to_uncompressed(&self) -> [u8; UNCOMPRESSED_POINT_LEN] {
        let mut point = [0u8; UNCOMPRESSED_POINT_LEN];
        point[0] = 0x04;
        point[1..1 + COORD_LEN].copy_from_slice(&self.x);
        point[1 + COORD_LEN..].copy_from_slice(&self.y);
        point
    }
}

/// Recovers the credential's uncompressed EC point from a registration response.
///
/// Sources are tried in order: the `publicKey` convenience field, the attestation object,
/// then the `authenticatorData` convenience field. Returns the first hit hex-encoded
/// (130 characters), or `None` when no source yields a P-256 point.
pub(crate) fn extract_public_key(response: &AuthenticatorAttestationResponse) -> Option<String> {
    let point = response
        .public_key
        .as_deref()
        .filter(|_| match response.public_key_algorithm {
            Some(alg) if i128::from(alg) != COSE_ALG_ES256 => {
                tracing::debug!("Skipping publicKey with algorithm {}", alg);
                false
            }
            _ => true,
        })
        .and_then(|field| decoded(field, "publicKey"))
        .and_then(|bytes| from_direct_field(&bytes))
        .or_else(|| {
            decoded(&response.attestation_object, "attestationObject")
                .and_then(|bytes| from_attestation_object(&bytes))
        })
        .or_else(|| {
            response
                .authenticator_data
                .as_deref()
                .and_then(|field| decoded(field, "authenticatorData"))
                .and_then(|bytes| from_authenticator_data(&bytes))
        });

    match point {
        Some(point) => Some(hex::encode(point)),
        None => {
            tracing::warn!("Could not extract public key from registration response");
            None
        }
    }
}

fn decoded(field: &str, name: &str) -> Option<Vec<u8>> {
    base64url_decode(field)
        .inspect_err(|e| tracing::debug!("Skipping {}: {}", name, e))
        .ok()
}

/// Raw uncompressed point, or a DER SubjectPublicKeyInfo wrapping one.
fn from_direct_field(bytes: &[u8]) -> Option<[u8; UNCOMPRESSED_POINT_LEN]> {
    if let Some(point) = uncompressed_point(bytes) {
        return Some(point);
    }
    match bytes.strip_prefix(&P256_SPKI_HEADER[..]) {
        Some(point) => uncompressed_point(point),
        None => {
            tracing::debug!("publicKey is neither a raw point nor a P-256 SPKI");
            None
        }
    }
}

fn from_attestation_object(bytes: &[u8]) -> Option<[u8; UNCOMPRESSED_POINT_LEN]> {
    let attestation = AttestationObject::from_bytes(bytes)
        .inspect_err(|e| tracing::debug!("Skipping attestationObject: {}", e))
        .ok()?;
    from_authenticator_data(&attestation.auth_data)
}

fn from_authenticator_data(bytes: &[u8]) -> Option<[u8; UNCOMPRESSED_POINT_LEN]> {
    let auth_data = AuthenticatorData::from_bytes(bytes)
        .inspect_err(|e| tracing::debug!("Skipping authenticator data: {}", e))
        .ok()?;
    let attested = auth_data.attested_credential?;
    CoseEc2Key::from_bytes(&attested.public_key)
        .inspect_err(|e| tracing::debug!("Skipping credential public key: {}", e))
        .ok()
        .map(|key| key.to_uncompressed())
}

fn uncompressed_point(bytes: &[u8]) -> Option<[u8; UNCOMPRESSED_POINT_LEN]> {
    match <[u8; UNCOMPRESSED_POINT_LEN]>::try_from(bytes) {
        Ok(point) if point[0] == 0x04 => Some(point),
        _ => None,
    }
}
