use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use tracing::debug;

use super::{SessionStore, StoreError, StoredBlob};
use crate::models::SessionBlobRow;

/// Postgres-backed store over the `session_blobs` table.
#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn read(&self, key: &str) -> Result<Option<StoredBlob>, StoreError> {
        let row: Option<SessionBlobRow> =
            sqlx::query_as("SELECT key, data, version, updated_at FROM session_blobs WHERE key = $1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|r| StoredBlob {
            value: r.data,
            version: r.version,
        }))
    }

    async fn write(
        &self,
        key: &str,
        value: &Value,
        expected_version: Option<i64>,
    ) -> Result<i64, StoreError> {
        let new_version: Option<i64> = match expected_version {
            None => {
                sqlx::query_scalar(
                    r#"
                    INSERT INTO session_blobs (key, data, version)
                    VALUES ($1, $2, 1)
                    ON CONFLICT (key) DO NOTHING
                    RETURNING version
                    "#,
                )
                .bind(key)
                .bind(value)
                .fetch_optional(&self.pool)
                .await?
            }
            Some(expected) => {
                // Compare-and-swap: the row only matches if nobody wrote since we read.
                sqlx::query_scalar(
                    r#"
                    UPDATE session_blobs
                    SET data = $2, version = version + 1, updated_at = now()
                    WHERE key = $1 AND version = $3
                    RETURNING version
                    "#,
                )
                .bind(key)
                .bind(value)
                .bind(expected)
                .fetch_optional(&self.pool)
                .await?
            }
        };

        match new_version {
            Some(v) => {
                debug!("Wrote session blob {key} at version {v}");
                Ok(v)
            }
            None => Err(StoreError::Conflict {
                key: key.to_string(),
                expected: expected_version,
            }),
        }
    }
}
