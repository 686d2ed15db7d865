mod errors;
mod main;
mod storage;
mod types;

pub use errors::PasskeyError;
pub use main::{
    AuthResult, AuthenticationFlow, AuthenticationOptions, AuthenticationOutcome,
    AuthenticationResponse, COMPACT_SIGNATURE_LEN, CompactSignature, RegistrationFlow,
    RegistrationOptions, RegistrationOutcome, RegistrationResponse, compact_signature,
};
pub use storage::{
    CredentialRepository, DB_TABLE_PASSKEY_CREDENTIALS, InMemoryCredentialRepository,
    SqliteCredentialRepository,
};
pub use types::{
    AuthenticatorTransport, CredentialDeviceType, NewPasskeyCredential, PasskeyCredential,
    WalletUser,
};
