use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::{SessionStore, StoreError, StoredBlob};

/// In-process store used by tests and `STORE_BACKEND=memory`.
/// Contents are lost on restart.
#[derive(Default)]
pub struct MemorySessionStore {
    blobs: RwLock<HashMap<String, StoredBlob>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn read(&self, key: &str) -> Result<Option<StoredBlob>, StoreError> {
        Ok(self.blobs.read().await.get(key).cloned())
    }

    async fn write(
        &self,
        key: &str,
        value: &Value,
        expected_version: Option<i64>,
    ) -> Result<i64, StoreError> {
        let mut blobs = self.blobs.write().await;
        let current = blobs.get(key).map(|b| b.version);

        let next = match (current, expected_version) {
            (None, None) => 1,
            (Some(stored), Some(expected)) if stored == expected => stored + 1,
            _ => {
                return Err(StoreError::Conflict {
                    key: key.to_string(),
                    expected: expected_version,
                })
            }
        };

        blobs.insert(
            key.to_string(),
            StoredBlob {
                value: value.clone(),
                version: next,
            },
        );
        Ok(next)
    }
}
