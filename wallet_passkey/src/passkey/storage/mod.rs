mod memory;
mod sqlite;

use async_trait::async_trait;

use crate::passkey::types::{NewPasskeyCredential, PasskeyCredential};
use crate::storage::StorageError;

pub use memory::InMemoryCredentialRepository;
pub use sqlite::SqliteCredentialRepository;

/// Default table for SQLite-backed credentials.
pub const DB_TABLE_PASSKEY_CREDENTIALS: &str = "passkey_credentials";

/// Persistence boundary for passkey credentials.
#[async_trait]
pub trait CredentialRepository: Send + Sync + 'static {
    async fn get_by_id(&self, credential_id: &str)
    -> Result<Option<PasskeyCredential>, StorageError>;

    /// All credentials owned by the user with this normalized email.
    async fn get_by_user(&self, user_email: &str) -> Result<Vec<PasskeyCredential>, StorageError>;

    /// Sets the signature counter and returns the updated credential.
    ///
    /// Fails with [`StorageError::NotFound`] for an unknown credential.
    async fn update_counter(
        &self,
        credential_id: &str,
        counter: u32,
    ) -> Result<PasskeyCredential, StorageError>;

    /// Stores a new credential. With `replace_existing` an existing row with the same
    /// credential ID is overwritten, otherwise it is an error.
    async fn create(
        &self,
        credential: NewPasskeyCredential,
        replace_existing: bool,
    ) -> Result<PasskeyCredential, StorageError>;

    /// Deletes the given credentials and returns how many existed.
    async fn delete_many(&self, credential_ids: &[String]) -> Result<u64, StorageError>;
}
