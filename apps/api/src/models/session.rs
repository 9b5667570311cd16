use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SessionBlobRow {
    pub key: String,
    pub data: Value,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}
