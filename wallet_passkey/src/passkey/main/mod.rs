mod attestation;
mod auth;
mod public_key;
mod register;
mod signature;
#[cfg(test)]
mod test_utils;
mod types;

pub use auth::{AuthResult, AuthenticationFlow, AuthenticationOutcome};
pub use register::{RegistrationFlow, RegistrationOutcome};
pub use signature::{COMPACT_SIGNATURE_LEN, CompactSignature, compact_signature};
pub use types::{
    AuthenticationOptions, AuthenticationResponse, RegistrationOptions, RegistrationResponse,
};
