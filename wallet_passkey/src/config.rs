use std::env;

use url::Url;

use crate::passkey::PasskeyError;

const DEFAULT_CHALLENGE_TTL_SECS: u64 = 300;
const DEFAULT_REGISTRATION_TIMEOUT_MS: u32 = 120_000;
const DEFAULT_AUTHENTICATION_TIMEOUT_MS: u32 = 60_000;

/// Relying-party settings shared by the registration and authentication flows.
///
/// The values are read once (usually from the environment) and never mutated by the
/// flows. The RP ID is always the hostname of `origin`.
#[derive(Debug, Clone)]
pub struct PasskeyConfig {
    pub(crate) origin: String,
    pub(crate) rp_id: String,
    pub(crate) rp_name: String,
    pub(crate) challenge_ttl_secs: u64,
    pub(crate) registration_timeout_ms: u32,
    pub(crate) authentication_timeout_ms: u32,
    pub(crate) attestation: String,
    pub(crate) authenticator_attachment: String,
    pub(crate) resident_key: String,
    pub(crate) user_verification: String,
}

impl PasskeyConfig {
    /// Builds a configuration for `origin` with default ceremony settings.
    pub fn new(origin: &str, rp_name: &str) -> Result<Self, PasskeyError> {
        let rp_id = rp_id_from_origin(origin)?;
        Ok(Self {
            origin: origin.trim_end_matches('/').to_string(),
            rp_id,
            rp_name: rp_name.to_string(),
            challenge_ttl_secs: DEFAULT_CHALLENGE_TTL_SECS,
            registration_timeout_ms: DEFAULT_REGISTRATION_TIMEOUT_MS,
            authentication_timeout_ms: DEFAULT_AUTHENTICATION_TIMEOUT_MS,
            attestation: "none".to_string(),
            authenticator_attachment: "platform".to_string(),
            resident_key: "preferred".to_string(),
            user_verification: "required".to_string(),
        })
    }

    /// Reads the configuration from `WEBAUTHN_*` environment variables.
    ///
    /// `WEBAUTHN_RP_ORIGIN` is required. Every other setting falls back to its default,
    /// with a warning when the variable is present but invalid.
    pub fn from_env() -> Result<Self, PasskeyError> {
        let origin = env::var("WEBAUTHN_RP_ORIGIN")
            .map_err(|_| PasskeyError::Config("WEBAUTHN_RP_ORIGIN must be set".to_string()))?;
        let rp_name = env::var("WEBAUTHN_RP_NAME").unwrap_or_else(|_| origin.clone());

        let mut config = Self::new(&origin, &rp_name)?;

        config.challenge_ttl_secs =
            parse_number("WEBAUTHN_CHALLENGE_TTL", DEFAULT_CHALLENGE_TTL_SECS);
        config.registration_timeout_ms = parse_number(
            "WEBAUTHN_REGISTRATION_TIMEOUT",
            DEFAULT_REGISTRATION_TIMEOUT_MS,
        );
        config.authentication_timeout_ms = parse_number(
            "WEBAUTHN_AUTHENTICATION_TIMEOUT",
            DEFAULT_AUTHENTICATION_TIMEOUT_MS,
        );
        config.attestation = parse_choice(
            "WEBAUTHN_ATTESTATION",
            &["none", "indirect", "direct", "enterprise"],
            "none",
        );
        config.authenticator_attachment = parse_choice(
            "WEBAUTHN_AUTHENTICATOR_ATTACHMENT",
            &["platform", "cross-platform"],
            "platform",
        );
        config.resident_key = parse_choice(
            "WEBAUTHN_RESIDENT_KEY",
            &["required", "preferred", "discouraged"],
            "preferred",
        );
        config.user_verification = parse_choice(
            "WEBAUTHN_USER_VERIFICATION",
            &["required", "preferred", "discouraged"],
            "required",
        );

        tracing::debug!("Passkey configuration: {:?}", config);

        Ok(config)
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn rp_id(&self) -> &str {
        &self.rp_id
    }

    pub fn rp_name(&self) -> &str {
        &self.rp_name
    }

    pub fn with_challenge_ttl(mut self, secs: u64) -> Self {
        self.challenge_ttl_secs = secs;
        self
    }
}

fn rp_id_from_origin(origin: &str) -> Result<String, PasskeyError> {
    let url = Url::parse(origin)
        .map_err(|e| PasskeyError::Config(format!("Invalid origin {origin}: {e}")))?;
    url.host_str()
        .map(|host| host.to_string())
        .ok_or_else(|| PasskeyError::Config(format!("Could not extract RP ID from {origin}")))
}

fn parse_number<T: std::str::FromStr + std::fmt::Display + Copy>(name: &str, default: T) -> T {
    match env::var(name) {
        Err(_) => default,
        Ok(v) => v.trim().parse::<T>().unwrap_or_else(|_| {
            tracing::warn!("Invalid {}: {}. Using default '{}'", name, v, default);
            default
        }),
    }
}

fn parse_choice(name: &str, allowed: &[&str], default: &str) -> String {
    match env::var(name).ok() {
        None => default.to_string(),
        Some(v) => {
            let v = v.to_lowercase();
            if allowed.contains(&v.as_str()) {
                v
            } else {
                tracing::warn!("Invalid {}: {}. Using default '{}'", name, v, default);
                default.to_string()
            }
        }
    }
}
