//! Software authenticator for passkey module tests
//!
//! Produces real P-256 keys, COSE keys, attestation objects and assertions so the
//! verifier and both flows can be exercised end to end without a browser.

use ciborium::value::{Integer, Value as CborValue};
use ring::digest;
use ring::rand::SystemRandom;
use ring::signature::{ECDSA_P256_SHA256_ASN1_SIGNING, EcdsaKeyPair, KeyPair};
use serde_json::{Value, json};

use super::types::auth_data_flags;
use crate::utils::base64url_encode;

/// ecdsa-with-SHA256
const OID_ECDSA_WITH_SHA256: &[u8] = &[0x2a, 0x86, 0x48, 0xce, 0x3d, 0x04, 0x03, 0x02];
/// id-ecPublicKey
const OID_EC_PUBLIC_KEY: &[u8] = &[0x2a, 0x86, 0x48, 0xce, 0x3d, 0x02, 0x01];
/// prime256v1
const OID_PRIME256V1: &[u8] = &[0x2a, 0x86, 0x48, 0xce, 0x3d, 0x03, 0x01, 0x07];
/// basicConstraints
const OID_BASIC_CONSTRAINTS: &[u8] = &[0x55, 0x1d, 0x13];

pub(crate) const FLAGS_UP_UV_AT: u8 =
    auth_data_flags::UP | auth_data_flags::UV | auth_data_flags::AT;
pub(crate) const FLAGS_UP_AT: u8 = auth_data_flags::UP | auth_data_flags::AT;
pub(crate) const FLAGS_UP_UV: u8 = auth_data_flags::UP | auth_data_flags::UV;

pub(crate) fn client_data_json(type_: &str, challenge: &str, origin: &str) -> Vec<u8> {
    json!({
        "type": type_,
        "challenge": challenge,
        "origin": origin,
        "crossOrigin": false
    })
    .to_string()
    .into_bytes()
}

pub(crate) fn generate_key_pair() -> EcdsaKeyPair {
    let rng = SystemRandom::new();
    let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &rng)
        .expect("Failed to generate key pair");
    EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, pkcs8.as_ref(), &rng)
        .expect("Failed to create key pair")
}

pub(crate) fn sign(key_pair: &EcdsaKeyPair, message: &[u8]) -> Vec<u8> {
    key_pair
        .sign(&SystemRandom::new(), message)
        .expect("Failed to sign")
        .as_ref()
        .to_vec()
}

pub(crate) fn cose_key(x: &[u8], y: &[u8]) -> CborValue {
    CborValue::Map(vec![
        (
            CborValue::Integer(Integer::from(1)),
            CborValue::Integer(Integer::from(2)),
        ),
        (
            CborValue::Integer(Integer::from(3)),
            CborValue::Integer(Integer::from(-7)),
        ),
        (
            CborValue::Integer(Integer::from(-1)),
            CborValue::Integer(Integer::from(1)),
        ),
        (
            CborValue::Integer(Integer::from(-2)),
            CborValue::Bytes(x.to_vec()),
        ),
        (
            CborValue::Integer(Integer::from(-3)),
            CborValue::Bytes(y.to_vec()),
        ),
    ])
}

pub(crate) fn to_cbor(value: &CborValue) -> Vec<u8> {
    let mut bytes = Vec::new();
    ciborium::ser::into_writer(value, &mut bytes).expect("Failed to encode CBOR");
    bytes
}

pub(crate) fn attestation_object(
    fmt: &str,
    auth_data: &[u8],
    att_stmt: Vec<(CborValue, CborValue)>,
) -> Vec<u8> {
    to_cbor(&CborValue::Map(vec![
        (
            CborValue::Text("fmt".to_string()),
            CborValue::Text(fmt.to_string()),
        ),
        (
            CborValue::Text("attStmt".to_string()),
            CborValue::Map(att_stmt),
        ),
        (
            CborValue::Text("authData".to_string()),
            CborValue::Bytes(auth_data.to_vec()),
        ),
    ]))
}

fn der(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    let len = content.len();
    if len < 0x80 {
        out.push(len as u8);
    } else if len < 0x100 {
        out.extend_from_slice(&[0x81, len as u8]);
    } else {
        out.extend_from_slice(&[0x82, (len >> 8) as u8, len as u8]);
    }
    out.extend_from_slice(content);
    out
}

fn der_name(common_name: &str) -> Vec<u8> {
    let attr = [der(0x06, &[0x55, 0x04, 0x03]), der(0x0c, common_name.as_bytes())].concat();
    der(0x30, &der(0x31, &der(0x30, &attr)))
}

/// DER SubjectPublicKeyInfo for an uncompressed P-256 point.
pub(crate) fn spki_der(uncompressed_point: &[u8]) -> Vec<u8> {
    let algorithm = der(
        0x30,
        &[der(0x06, OID_EC_PUBLIC_KEY), der(0x06, OID_PRIME256V1)].concat(),
    );
    let bits = [&[0x00u8][..], uncompressed_point].concat();
    der(0x30, &[algorithm, der(0x03, &bits)].concat())
}

/// `[3] { SEQUENCE { basicConstraints critical, cA = FALSE } }`
fn end_entity_extensions() -> Vec<u8> {
    let basic_constraints = der(
        0x30,
        &[
            der(0x06, OID_BASIC_CONSTRAINTS),
            der(0x01, &[0xff]),
            der(0x04, &der(0x30, &[])),
        ]
        .concat(),
    );
    der(0xa3, &der(0x30, &basic_constraints))
}

/// Self-signed v3 end-entity certificate for `key_pair`, valid until 2049.
pub(crate) fn self_signed_certificate(key_pair: &EcdsaKeyPair) -> Vec<u8> {
    let sig_alg = der(0x30, &der(0x06, OID_ECDSA_WITH_SHA256));
    let validity = der(
        0x30,
        &[der(0x17, b"240101000000Z"), der(0x17, b"491231235959Z")].concat(),
    );
    let tbs = der(
        0x30,
        &[
            der(0xa0, &der(0x02, &[0x02])),
            der(0x02, &[0x01]),
            sig_alg.clone(),
            der_name("Wallet Test Attestation"),
            validity,
            der_name("Wallet Test Attestation"),
            spki_der(key_pair.public_key().as_ref()),
            end_entity_extensions(),
        ]
        .concat(),
    );
    let signature = [&[0x00u8][..], sign(key_pair, &tbs).as_slice()].concat();
    der(0x30, &[tbs, sig_alg, der(0x03, &signature)].concat())
}

/// A platform authenticator holding one P-256 credential.
pub(crate) struct TestAuthenticator {
    rp_id: String,
    key_pair: EcdsaKeyPair,
    credential_id: Vec<u8>,
}

impl TestAuthenticator {
    pub(crate) fn new(rp_id: &str) -> Self {
        Self::with_credential_id(rp_id, b"test-credential-0001")
    }

    pub(crate) fn with_credential_id(rp_id: &str, credential_id: &[u8]) -> Self {
        Self {
            rp_id: rp_id.to_string(),
            key_pair: generate_key_pair(),
            credential_id: credential_id.to_vec(),
        }
    }

    pub(crate) fn credential_id(&self) -> Vec<u8> {
        self.credential_id.clone()
    }

    pub(crate) fn credential_id_b64(&self) -> String {
        base64url_encode(&self.credential_id)
    }

    pub(crate) fn key_pair(&self) -> &EcdsaKeyPair {
        &self.key_pair
    }

    /// 0x04 || x || y
    pub(crate) fn uncompressed_public_key(&self) -> Vec<u8> {
        self.key_pair.public_key().as_ref().to_vec()
    }

    pub(crate) fn public_key_hex(&self) -> String {
        hex::encode(self.uncompressed_public_key())
    }

    pub(crate) fn cose_public_key(&self) -> Vec<u8> {
        let point = self.uncompressed_public_key();
        to_cbor(&cose_key(&point[1..33], &point[33..65]))
    }

    fn rp_id_hash(&self) -> Vec<u8> {
        digest::digest(&digest::SHA256, self.rp_id.as_bytes())
            .as_ref()
            .to_vec()
    }

    pub(crate) fn registration_auth_data(&self, flags: u8, counter: u32) -> Vec<u8> {
        let mut auth_data = self.assertion_auth_data(flags | auth_data_flags::AT, counter);
        auth_data.extend_from_slice(&[0u8; 16]);
        auth_data.extend_from_slice(&(self.credential_id.len() as u16).to_be_bytes());
        auth_data.extend_from_slice(&self.credential_id);
        auth_data.extend_from_slice(&self.cose_public_key());
        auth_data
    }

    pub(crate) fn assertion_auth_data(&self, flags: u8, counter: u32) -> Vec<u8> {
        let mut auth_data = self.rp_id_hash();
        auth_data.push(flags);
        auth_data.extend_from_slice(&counter.to_be_bytes());
        auth_data
    }

    fn registration_json(&self, client_data: &[u8], attestation: &[u8]) -> Value {
        let id = self.credential_id_b64();
        json!({
            "id": id,
            "rawId": id,
            "type": "public-key",
            "authenticatorAttachment": "platform",
            "response": {
                "clientDataJSON": base64url_encode(client_data),
                "attestationObject": base64url_encode(attestation),
                "transports": ["internal", "hybrid"]
            },
            "clientExtensionResults": {}
        })
    }

    /// Registration response with `none` attestation.
    pub(crate) fn registration_response(&self, challenge: &str, origin: &str, flags: u8) -> Value {
        let client_data = client_data_json("webauthn.create", challenge, origin);
        let auth_data = self.registration_auth_data(flags, 0);
        let attestation = attestation_object("none", &auth_data, vec![]);
        self.registration_json(&client_data, &attestation)
    }

    /// Registration response with `packed` self attestation.
    pub(crate) fn packed_registration_response(
        &self,
        challenge: &str,
        origin: &str,
        flags: u8,
    ) -> Value {
        let client_data = client_data_json("webauthn.create", challenge, origin);
        let auth_data = self.registration_auth_data(flags, 0);
        let client_data_hash = digest::digest(&digest::SHA256, &client_data);
        let signature = sign(
            &self.key_pair,
            &[auth_data.as_slice(), client_data_hash.as_ref()].concat(),
        );
        let att_stmt = vec![
            (
                CborValue::Text("alg".to_string()),
                CborValue::Integer(Integer::from(-7)),
            ),
            (
                CborValue::Text("sig".to_string()),
                CborValue::Bytes(signature),
            ),
        ];
        let attestation = attestation_object("packed", &auth_data, att_stmt);
        self.registration_json(&client_data, &attestation)
    }

    pub(crate) fn authentication_response(
        &self,
        challenge: &str,
        origin: &str,
        flags: u8,
        counter: u32,
    ) -> Value {
        let client_data = client_data_json("webauthn.get", challenge, origin);
        let auth_data = self.assertion_auth_data(flags, counter);
        let client_data_hash = digest::digest(&digest::SHA256, &client_data);
        let signature = sign(
            &self.key_pair,
            &[auth_data.as_slice(), client_data_hash.as_ref()].concat(),
        );
        let id = self.credential_id_b64();
        json!({
            "id": id,
            "rawId": id,
            "type": "public-key",
            "response": {
                "clientDataJSON": base64url_encode(&client_data),
                "authenticatorData": base64url_encode(&auth_data),
                "signature": base64url_encode(&signature),
                "userHandle": null
            },
            "clientExtensionResults": {}
        })
    }
}
