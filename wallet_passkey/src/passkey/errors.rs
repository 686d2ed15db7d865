use thiserror::Error;

use crate::storage::StorageError;
use crate::utils::UtilError;

/// Errors that can occur during passkey ceremonies.
///
/// The first four variants are the failures callers are expected to handle by name. The
/// rest come from the in-crate WebAuthn verifier and the storage adapters. A ceremony in
/// which the authenticator did not verify the user is not an error; see
/// [`RegistrationOutcome`](crate::RegistrationOutcome) and
/// [`AuthenticationOutcome`](crate::AuthenticationOutcome).
#[derive(Debug, Error)]
pub enum PasskeyError {
    /// No stored, unexpired challenge (or its metadata) for the identifier
    #[error("Missing challenge: {0}")]
    MissingChallenge(String),

    /// The assertion references a credential ID that is not stored
    #[error("Missing credential: {0}")]
    MissingCredential(String),

    /// Verification produced no usable registration result
    #[error("Missing registration info: {0}")]
    MissingRegistrationInfo(String),

    /// The DER signature could not be parsed
    #[error("Invalid signature format: {0}")]
    InvalidSignatureFormat(String),

    /// Error with the cryptographic challenge used in the WebAuthn protocol
    #[error("Invalid challenge: {0}")]
    Challenge(String),

    /// Error validating the client data JSON from the browser
    #[error("Invalid client data: {0}")]
    ClientData(String),

    /// Error parsing or validating the authenticator data structure
    #[error("Invalid authenticator data: {0}")]
    AuthenticatorData(String),

    /// Error during cryptographic verification of WebAuthn responses
    #[error("Verification error: {0}")]
    Verification(String),

    /// Error during the authentication process (e.g., counter regression)
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Error with improperly formatted data
    #[error("Invalid format: {0}")]
    Format(String),

    /// Error related to relying-party configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error accessing or modifying stored challenges or credentials
    #[error("Storage error: {0}")]
    Storage(String),

    /// Error from utility operations
    #[error("Utils error: {0}")]
    Utils(#[from] UtilError),

    /// Error from JSON serialization/deserialization
    #[error("Serde error: {0}")]
    SerdeJson(#[from] serde_json::Error),
}

impl From<StorageError> for PasskeyError {
    fn from(err: StorageError) -> Self {
        Self::Storage(err.to_string())
    }
}
