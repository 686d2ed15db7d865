use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use ciborium::value::{Integer, Value as CborValue};
use ring::digest;
use ring::rand::SystemRandom;
use ring::signature::{ECDSA_P256_SHA256_ASN1_SIGNING, EcdsaKeyPair, KeyPair};
use serde_json::{Value, json};

pub const ORIGIN: &str = "https://wallet.example.com";
pub const RP_ID: &str = "wallet.example.com";
pub const RP_NAME: &str = "Soroban Wallet";

pub const FLAG_UP: u8 = 0x01;
pub const FLAG_UV: u8 = 0x04;
pub const FLAG_BE: u8 = 0x08;
pub const FLAG_BS: u8 = 0x10;
const FLAG_AT: u8 = 0x40;

pub fn b64(data: impl AsRef<[u8]>) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

pub fn challenge_of(options: &str) -> String {
    let value: Value = serde_json::from_str(options).expect("options are JSON");
    value["challenge"]
        .as_str()
        .expect("options carry a challenge")
        .to_string()
}

/// Software P-256 authenticator producing browser-shaped WebAuthn responses.
pub struct SoftwareAuthenticator {
    key_pair: EcdsaKeyPair,
    credential_id: Vec<u8>,
    rp_id: String,
}

impl SoftwareAuthenticator {
    pub fn new(credential_id: &[u8]) -> Self {
        let rng = SystemRandom::new();
        let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &rng)
            .expect("Failed to generate key pair");
        let key_pair =
            EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, pkcs8.as_ref(), &rng)
                .expect("Failed to load key pair");
        Self {
            key_pair,
            credential_id: credential_id.to_vec(),
            rp_id: RP_ID.to_string(),
        }
    }

    pub fn credential_id(&self) -> String {
        b64(&self.credential_id)
    }

    /// Uncompressed point, hex-encoded
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.key_pair.public_key().as_ref())
    }

    pub fn public_key(&self) -> Vec<u8> {
        self.key_pair.public_key().as_ref().to_vec()
    }

    fn cose_key(&self) -> Vec<u8> {
        let point = self.key_pair.public_key().as_ref();
        let int = |v: i64| CborValue::Integer(Integer::from(v));
        let key = CborValue::Map(vec![
            (int(1), int(2)),
            (int(3), int(-7)),
            (int(-1), int(1)),
            (int(-2), CborValue::Bytes(point[1..33].to_vec())),
            (int(-3), CborValue::Bytes(point[33..65].to_vec())),
        ]);
        let mut out = Vec::new();
        ciborium::ser::into_writer(&key, &mut out).expect("COSE key encodes");
        out
    }

    fn auth_data(&self, flags: u8, counter: u32) -> Vec<u8> {
        let mut data = digest::digest(&digest::SHA256, self.rp_id.as_bytes())
            .as_ref()
            .to_vec();
        data.push(flags);
        data.extend_from_slice(&counter.to_be_bytes());
        data
    }

    fn client_data(type_: &str, challenge: &str) -> Vec<u8> {
        json!({
            "type": type_,
            "challenge": challenge,
            "origin": ORIGIN,
            "crossOrigin": false
        })
        .to_string()
        .into_bytes()
    }

    /// `navigator.credentials.create()` result with `none` attestation.
    pub fn register(&self, challenge: &str, flags: u8) -> String {
        let mut auth_data = self.auth_data(flags | FLAG_AT, 0);
        auth_data.extend_from_slice(&[0u8; 16]);
        auth_data.extend_from_slice(&(self.credential_id.len() as u16).to_be_bytes());
        auth_data.extend_from_slice(&self.credential_id);
        auth_data.extend_from_slice(&self.cose_key());

        let attestation = CborValue::Map(vec![
            (
                CborValue::Text("fmt".to_string()),
                CborValue::Text("none".to_string()),
            ),
            (
                CborValue::Text("attStmt".to_string()),
                CborValue::Map(vec![]),
            ),
            (
                CborValue::Text("authData".to_string()),
                CborValue::Bytes(auth_data.clone()),
            ),
        ]);
        let mut attestation_bytes = Vec::new();
        ciborium::ser::into_writer(&attestation, &mut attestation_bytes)
            .expect("attestation encodes");

        json!({
            "id": self.credential_id(),
            "rawId": self.credential_id(),
            "type": "public-key",
            "authenticatorAttachment": "platform",
            "response": {
                "clientDataJSON": b64(Self::client_data("webauthn.create", challenge)),
                "attestationObject": b64(attestation_bytes),
                "authenticatorData": b64(&auth_data),
                "transports": ["internal", "hybrid"]
            },
            "clientExtensionResults": {}
        })
        .to_string()
    }

    /// `navigator.credentials.get()` result.
    pub fn authenticate(&self, challenge: &str, flags: u8, counter: u32) -> String {
        let client_data = Self::client_data("webauthn.get", challenge);
        let auth_data = self.auth_data(flags, counter);
        let client_data_hash = digest::digest(&digest::SHA256, &client_data);
        let signed = [auth_data.as_slice(), client_data_hash.as_ref()].concat();
        let signature = self
            .key_pair
            .sign(&SystemRandom::new(), &signed)
            .expect("Failed to sign");

        json!({
            "id": self.credential_id(),
            "rawId": self.credential_id(),
            "type": "public-key",
            "response": {
                "clientDataJSON": b64(&client_data),
                "authenticatorData": b64(&auth_data),
                "signature": b64(signature.as_ref()),
                "userHandle": null
            },
            "clientExtensionResults": {}
        })
        .to_string()
    }
}
