use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::Mutex;

use super::CredentialRepository;
use crate::passkey::types::{NewPasskeyCredential, PasskeyCredential};
use crate::storage::StorageError;

/// Credential repository held in process memory.
#[derive(Default)]
pub struct InMemoryCredentialRepository {
    entry: Mutex<HashMap<String, PasskeyCredential>>,
}

impl InMemoryCredentialRepository {
    pub fn new() -> Self {
        tracing::info!("Creating new in-memory credential repository");
        Self::default()
    }
}

#[async_trait]
impl CredentialRepository for InMemoryCredentialRepository {
    async fn get_by_id(
        &self,
        credential_id: &str,
    ) -> Result<Option<PasskeyCredential>, StorageError> {
        Ok(self.entry.lock().await.get(credential_id).cloned())
    }

    async fn get_by_user(&self, user_email: &str) -> Result<Vec<PasskeyCredential>, StorageError> {
        let entries = self.entry.lock().await;
        let mut credentials: Vec<PasskeyCredential> = entries
            .values()
            .filter(|c| c.user_email == user_email)
            .cloned()
            .collect();
        credentials.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(credentials)
    }

    async fn update_counter(
        &self,
        credential_id: &str,
        counter: u32,
    ) -> Result<PasskeyCredential, StorageError> {
        let mut entries = self.entry.lock().await;
        let credential = entries.get_mut(credential_id).ok_or_else(|| {
            StorageError::NotFound(format!("Credential {credential_id} not found"))
        })?;
        credential.counter = counter;
        credential.updated_at = Utc::now();
        Ok(credential.clone())
    }

    async fn create(
        &self,
        credential: NewPasskeyCredential,
        replace_existing: bool,
    ) -> Result<PasskeyCredential, StorageError> {
        let mut entries = self.entry.lock().await;
        if !replace_existing && entries.contains_key(&credential.credential_id) {
            return Err(StorageError::Storage(format!(
                "Credential {} already exists",
                credential.credential_id
            )));
        }
        let credential = credential.into_credential(Utc::now());
        entries.insert(credential.credential_id.clone(), credential.clone());
        Ok(credential)
    }

    async fn delete_many(&self, credential_ids: &[String]) -> Result<u64, StorageError> {
        let mut entries = self.entry.lock().await;
        let removed = credential_ids
            .iter()
            .filter(|id| entries.remove(id.as_str()).is_some())
            .count();
        Ok(removed as u64)
    }
}
