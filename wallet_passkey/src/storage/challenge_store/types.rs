use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::storage::errors::StorageError;
use crate::utils::gen_random_string;

/// Number of random bytes behind a freshly created challenge nonce.
pub(crate) const CHALLENGE_BYTES: usize = 32;

/// Default lifetime of a stored challenge when the caller gives no TTL.
pub(crate) const DEFAULT_CHALLENGE_TTL: Duration = Duration::from_secs(300);

/// Data bound to a pending ceremony and read back when it completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChallengeMetadata {
    /// Bound by registration: the label of the new passkey and the WebAuthn user handle.
    Passkey { label: String, user_id: String },
    /// Bound by a transaction-authorization ceremony and echoed back to the caller.
    Soroban {
        tx: String,
        simulation_response: serde_json::Value,
    },
}

/// A pending ceremony for one identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Challenge {
    pub nonce: String,
    pub expires_at: DateTime<Utc>,
    pub metadata: Option<ChallengeMetadata>,
}

impl Challenge {
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }
}

/// Keyed store of pending ceremonies.
///
/// The key is always the normalized user email. Storing a challenge for an identifier
/// that already has one replaces it.
#[async_trait]
pub trait ChallengeStore: Send + Sync + 'static {
    /// Generate a new random nonce. Nothing is stored.
    async fn create_challenge(&self, id: &str) -> Result<String, StorageError> {
        tracing::debug!("Creating challenge for {}", id);
        gen_random_string(CHALLENGE_BYTES).map_err(|e| StorageError::Storage(e.to_string()))
    }

    /// Store `nonce` for `id`, expiring after `ttl` (five minutes when `None`).
    async fn store_challenge(
        &self,
        id: &str,
        nonce: &str,
        ttl: Option<Duration>,
    ) -> Result<(), StorageError>;

    /// Attach metadata to the live challenge of `id`.
    ///
    /// Fails with [`StorageError::NotFound`] when there is no unexpired challenge.
    async fn set_metadata(&self, id: &str, metadata: ChallengeMetadata)
    -> Result<(), StorageError>;

    /// Returns `None` both when nothing is stored and when the stored challenge has expired.
    async fn get_challenge(&self, id: &str) -> Result<Option<Challenge>, StorageError>;

    async fn delete_challenge(&self, id: &str) -> Result<(), StorageError>;
}
