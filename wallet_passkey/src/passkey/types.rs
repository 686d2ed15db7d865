use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::errors::PasskeyError;
use crate::utils::normalize_identifier;

/// Transport hint reported by an authenticator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthenticatorTransport {
    Usb,
    Nfc,
    Ble,
    Internal,
    Cable,
    Hybrid,
    SmartCard,
}

impl AuthenticatorTransport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Usb => "usb",
            Self::Nfc => "nfc",
            Self::Ble => "ble",
            Self::Internal => "internal",
            Self::Cable => "cable",
            Self::Hybrid => "hybrid",
            Self::SmartCard => "smart-card",
        }
    }

    /// Converts raw hints into known transports, keeping first-seen order.
    ///
    /// Unknown hints and duplicates are dropped.
    pub fn from_hints<S: AsRef<str>>(hints: &[S]) -> Vec<Self> {
        let mut transports = Vec::new();
        for hint in hints {
            match hint.as_ref().parse::<Self>() {
                Ok(t) if !transports.contains(&t) => transports.push(t),
                Ok(_) => {}
                Err(_) => tracing::warn!("Ignoring unknown transport hint: {}", hint.as_ref()),
            }
        }
        transports
    }

    /// Comma-joined form used at rest.
    pub fn join(transports: &[Self]) -> String {
        transports
            .iter()
            .map(|t| t.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn split(joined: &str) -> Vec<Self> {
        let hints: Vec<&str> = joined
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        Self::from_hints(&hints)
    }
}

impl fmt::Display for AuthenticatorTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthenticatorTransport {
    type Err = PasskeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "usb" => Ok(Self::Usb),
            "nfc" => Ok(Self::Nfc),
            "ble" => Ok(Self::Ble),
            "internal" => Ok(Self::Internal),
            "cable" => Ok(Self::Cable),
            "hybrid" => Ok(Self::Hybrid),
            "smart-card" => Ok(Self::SmartCard),
            other => Err(PasskeyError::Format(format!("Unknown transport: {other}"))),
        }
    }
}

/// Whether a credential is bound to one device or may be synced between devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CredentialDeviceType {
    SingleDevice,
    MultiDevice,
}

impl CredentialDeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SingleDevice => "singleDevice",
            Self::MultiDevice => "multiDevice",
        }
    }
}

impl FromStr for CredentialDeviceType {
    type Err = PasskeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "singleDevice" => Ok(Self::SingleDevice),
            "multiDevice" => Ok(Self::MultiDevice),
            other => Err(PasskeyError::Format(format!("Unknown device type: {other}"))),
        }
    }
}

/// Stored passkey credential.
///
/// Created when a registration completes and afterwards mutated only to record the
/// authenticator's signature counter.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct PasskeyCredential {
    /// Credential ID as issued by the authenticator (base64url)
    pub credential_id: String,
    /// Normalized email of the owning user
    pub user_email: String,
    /// WebAuthn user handle (base64url)
    pub webauthn_user_id: String,
    /// Human readable label chosen at registration
    pub label: String,
    /// COSE-encoded public key as received (base64url)
    pub public_key: String,
    /// Uncompressed EC point, hex-encoded, when it could be recovered
    pub hex_public_key: Option<String>,
    /// Signature counter (used to detect cloned authenticators)
    pub counter: u32,
    pub transports: Vec<AuthenticatorTransport>,
    pub device_type: CredentialDeviceType,
    pub backed_up: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields needed to create a credential. Timestamps are set by the repository.
#[derive(Clone, Debug, PartialEq)]
pub struct NewPasskeyCredential {
    pub credential_id: String,
    pub user_email: String,
    pub webauthn_user_id: String,
    pub label: String,
    pub public_key: String,
    pub hex_public_key: Option<String>,
    pub counter: u32,
    pub transports: Vec<AuthenticatorTransport>,
    pub device_type: CredentialDeviceType,
    pub backed_up: bool,
}

impl NewPasskeyCredential {
    pub(crate) fn into_credential(self, now: DateTime<Utc>) -> PasskeyCredential {
        PasskeyCredential {
            credential_id: self.credential_id,
            user_email: self.user_email,
            webauthn_user_id: self.webauthn_user_id,
            label: self.label,
            public_key: self.public_key,
            hex_public_key: self.hex_public_key,
            counter: self.counter,
            transports: self.transports,
            device_type: self.device_type,
            backed_up: self.backed_up,
            created_at: now,
            updated_at: now,
        }
    }
}

/// The user a ceremony is performed for, with the passkeys already registered to them.
#[derive(Clone, Debug, Default)]
pub struct WalletUser {
    pub email: String,
    pub passkeys: Vec<PasskeyCredential>,
}

impl WalletUser {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            passkeys: Vec::new(),
        }
    }

    pub fn with_passkeys(mut self, passkeys: Vec<PasskeyCredential>) -> Self {
        self.passkeys = passkeys;
        self
    }

    /// Key under which this user's ceremonies are stored.
    pub fn identifier(&self) -> String {
        normalize_identifier(&self.email)
    }
}
