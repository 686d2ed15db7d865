use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{FromRow, Pool, Row, Sqlite};
use std::time::Duration;

use super::{CredentialRepository, DB_TABLE_PASSKEY_CREDENTIALS};
use crate::passkey::types::{
    AuthenticatorTransport, CredentialDeviceType, NewPasskeyCredential, PasskeyCredential,
};
use crate::storage::StorageError;

const COLUMNS: &str = "credential_id, user_email, webauthn_user_id, label, public_key, \
     hex_public_key, counter, transports, device_type, backed_up, created_at, updated_at";

/// Credential repository backed by a SQLite database.
#[derive(Clone)]
pub struct SqliteCredentialRepository {
    pool: Pool<Sqlite>,
    table: String,
}

impl SqliteCredentialRepository {
    /// Wraps an existing pool, creating the credential table when absent.
    pub async fn new(pool: Pool<Sqlite>) -> Result<Self, StorageError> {
        Self::with_table(pool, DB_TABLE_PASSKEY_CREDENTIALS).await
    }

    pub async fn with_table(pool: Pool<Sqlite>, table: &str) -> Result<Self, StorageError> {
        if table.is_empty()
            || !table
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(StorageError::Storage(format!(
                "Invalid table name: {table}"
            )));
        }
        let repo = Self {
            pool,
            table: table.to_string(),
        };
        repo.create_tables().await?;
        Ok(repo)
    }

    /// Opens `url` (e.g. `sqlite::memory:` or `sqlite:passkeys.db?mode=rwc`).
    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        let options = if url.contains(":memory:") {
            // every connection to an in-memory database gets its own copy
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = options.connect(url).await?;
        tracing::info!("Connected to SQLite credential store at {}", url);
        Self::new(pool).await
    }

    async fn create_tables(&self) -> Result<(), StorageError> {
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                credential_id TEXT PRIMARY KEY NOT NULL,
                user_email TEXT NOT NULL,
                webauthn_user_id TEXT NOT NULL,
                label TEXT NOT NULL,
                public_key TEXT NOT NULL,
                hex_public_key TEXT,
                counter INTEGER NOT NULL DEFAULT 0,
                transports TEXT NOT NULL DEFAULT '',
                device_type TEXT NOT NULL,
                backed_up INTEGER NOT NULL DEFAULT 0,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
            self.table
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{}_user_email ON {}(user_email)",
            self.table, self.table
        ))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl CredentialRepository for SqliteCredentialRepository {
    async fn get_by_id(
        &self,
        credential_id: &str,
    ) -> Result<Option<PasskeyCredential>, StorageError> {
        let credential = sqlx::query_as::<_, PasskeyCredential>(&format!(
            "SELECT {} FROM {} WHERE credential_id = ?",
            COLUMNS, self.table
        ))
        .bind(credential_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(credential)
    }

    async fn get_by_user(&self, user_email: &str) -> Result<Vec<PasskeyCredential>, StorageError> {
        let credentials = sqlx::query_as::<_, PasskeyCredential>(&format!(
            "SELECT {} FROM {} WHERE user_email = ? ORDER BY created_at",
            COLUMNS, self.table
        ))
        .bind(user_email)
        .fetch_all(&self.pool)
        .await?;
        Ok(credentials)
    }

    async fn update_counter(
        &self,
        credential_id: &str,
        counter: u32,
    ) -> Result<PasskeyCredential, StorageError> {
        let result = sqlx::query(&format!(
            "UPDATE {} SET counter = ?, updated_at = ? WHERE credential_id = ?",
            self.table
        ))
        .bind(counter as i64)
        .bind(Utc::now())
        .bind(credential_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!(
                "Credential {credential_id} not found"
            )));
        }

        self.get_by_id(credential_id).await?.ok_or_else(|| {
            StorageError::NotFound(format!("Credential {credential_id} not found"))
        })
    }

    async fn create(
        &self,
        credential: NewPasskeyCredential,
        replace_existing: bool,
    ) -> Result<PasskeyCredential, StorageError> {
        let credential = credential.into_credential(Utc::now());
        let verb = if replace_existing {
            "INSERT OR REPLACE"
        } else {
            "INSERT"
        };

        sqlx::query(&format!(
            "{} INTO {} ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            verb, self.table, COLUMNS
        ))
        .bind(&credential.credential_id)
        .bind(&credential.user_email)
        .bind(&credential.webauthn_user_id)
        .bind(&credential.label)
        .bind(&credential.public_key)
        .bind(&credential.hex_public_key)
        .bind(credential.counter as i64)
        .bind(AuthenticatorTransport::join(&credential.transports))
        .bind(credential.device_type.as_str())
        .bind(credential.backed_up)
        .bind(credential.created_at)
        .bind(credential.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => StorageError::Storage(
                format!("Credential {} already exists", credential.credential_id),
            ),
            other => StorageError::from(other),
        })?;

        Ok(credential)
    }

    async fn delete_many(&self, credential_ids: &[String]) -> Result<u64, StorageError> {
        if credential_ids.is_empty() {
            return Ok(0);
        }
        let placeholders = vec!["?"; credential_ids.len()].join(", ");
        let sql = format!(
            "DELETE FROM {} WHERE credential_id IN ({})",
            self.table, placeholders
        );
        let mut query = sqlx::query(&sql);
        for id in credential_ids {
            query = query.bind(id);
        }
        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

impl<'r> FromRow<'r, SqliteRow> for PasskeyCredential {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let counter: i64 = row.try_get("counter")?;
        let counter = u32::try_from(counter).map_err(|e| sqlx::Error::ColumnDecode {
            index: "counter".to_string(),
            source: Box::new(e),
        })?;
        let transports: String = row.try_get("transports")?;
        let device_type: String = row.try_get("device_type")?;
        let device_type: CredentialDeviceType = device_type
            .parse()
            .map_err(|e| sqlx::Error::ColumnDecode {
                index: "device_type".to_string(),
                source: Box::new(e),
            })?;
        let created_at: DateTime<Utc> = row.try_get("created_at")?;
        let updated_at: DateTime<Utc> = row.try_get("updated_at")?;

        Ok(PasskeyCredential {
            credential_id: row.try_get("credential_id")?,
            user_email: row.try_get("user_email")?,
            webauthn_user_id: row.try_get("webauthn_user_id")?,
            label: row.try_get("label")?,
            public_key: row.try_get("public_key")?,
            hex_public_key: row.try_get("hex_public_key")?,
            counter,
            transports: AuthenticatorTransport::split(&transports),
            device_type,
            backed_up: row.try_get("backed_up")?,
            created_at,
            updated_at,
        })
    }
}
