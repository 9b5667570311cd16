//! Session store: versioned JSON blobs keyed by session key.
//!
//! The certification core treats persistence as an opaque key-value store.
//! Every blob carries a `version`; writes compare-and-swap on it so two
//! concurrent read-modify-write cycles cannot silently drop a response.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub mod memory;
pub mod postgres;

pub use memory::MemorySessionStore;
pub use postgres::PgSessionStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The stored version no longer matches what the writer read.
    /// `expected: None` means the writer tried to create a key that already exists.
    #[error("version conflict on '{key}' (expected {expected:?})")]
    Conflict { key: String, expected: Option<i64> },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store backend error: {0}")]
    Backend(String),
}

/// A blob together with the version it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredBlob {
    pub value: Value,
    pub version: i64,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Reads the blob stored under `key`, if any.
    async fn read(&self, key: &str) -> Result<Option<StoredBlob>, StoreError>;

    /// Writes `value` under `key` and returns the new version.
    ///
    /// `expected_version: None` creates the key and fails with `Conflict` if it exists.
    /// `Some(v)` replaces the blob only if the stored version is still `v`.
    async fn write(
        &self,
        key: &str,
        value: &Value,
        expected_version: Option<i64>,
    ) -> Result<i64, StoreError>;
}

pub fn certification_key(certification_id: &uuid::Uuid) -> String {
    format!("certification:{certification_id}")
}

pub fn interview_key(session_id: &str) -> String {
    format!("interview:{session_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_store_is_object_safe() {
        fn _takes_boxed(_: Box<dyn SessionStore>) {}
    }

    #[test]
    fn test_keys_are_namespaced() {
        let id = uuid::Uuid::nil();
        assert_eq!(
            certification_key(&id),
            "certification:00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(interview_key("abc"), "interview:abc");
    }
}
