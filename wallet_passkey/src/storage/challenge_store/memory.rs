use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::storage::errors::StorageError;

use super::types::{Challenge, ChallengeMetadata, ChallengeStore, DEFAULT_CHALLENGE_TTL};

/// Process-local challenge store.
///
/// Expiry is checked when a challenge is read; an expired entry is removed by the read
/// that observes it. Suitable for a single-process deployment only.
#[derive(Default)]
pub struct InMemoryChallengeStore {
    entry: Mutex<HashMap<String, Challenge>>,
}

impl InMemoryChallengeStore {
    pub fn new() -> Self {
        tracing::info!("Creating new in-memory challenge store");
        Self::default()
    }

    fn take_live(entries: &mut HashMap<String, Challenge>, id: &str) -> Option<Challenge> {
        match entries.get(id) {
            Some(challenge) if challenge.is_expired() => {
                tracing::debug!("Challenge for {} expired at {}", id, challenge.expires_at);
                entries.remove(id);
                None
            }
            Some(challenge) => Some(challenge.clone()),
            None => None,
        }
    }
}

#[async_trait]
impl ChallengeStore for InMemoryChallengeStore {
    async fn store_challenge(
        &self,
        id: &str,
        nonce: &str,
        ttl: Option<Duration>,
    ) -> Result<(), StorageError> {
        let ttl = ttl.unwrap_or(DEFAULT_CHALLENGE_TTL);
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| StorageError::Storage(format!("Invalid challenge TTL: {e}")))?;

        let expires_at = Utc::now().checked_add_signed(ttl).ok_or_else(|| {
            StorageError::Storage(format!("Challenge TTL out of range: {}s", ttl.num_seconds()))
        })?;

        let challenge = Challenge {
            nonce: nonce.to_string(),
            expires_at,
            metadata: None,
        };

        let mut entries = self.entry.lock().await;
        if entries.insert(id.to_string(), challenge).is_some() {
            tracing::debug!("Replaced pending challenge for {}", id);
        }
        Ok(())
    }

    async fn set_metadata(
        &self,
        id: &str,
        metadata: ChallengeMetadata,
    ) -> Result<(), StorageError> {
        let mut entries = self.entry.lock().await;
        if Self::take_live(&mut entries, id).is_none() {
            tracing::error!("Missing challenge record for {}", id);
            return Err(StorageError::NotFound(format!(
                "Missing challenge record for {id}"
            )));
        }
        if let Some(challenge) = entries.get_mut(id) {
            challenge.metadata = Some(metadata);
        }
        Ok(())
    }

    async fn get_challenge(&self, id: &str) -> Result<Option<Challenge>, StorageError> {
        let mut entries = self.entry.lock().await;
        Ok(Self::take_live(&mut entries, id))
    }

    async fn delete_challenge(&self, id: &str) -> Result<(), StorageError> {
        self.entry.lock().await.remove(id);
        Ok(())
    }
}
