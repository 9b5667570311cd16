//! Best-effort analytics events.
//!
//! Events are write-once telemetry about session progression. Nothing in the
//! scoring core reads them back, and a failing sink never fails a request.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::AnalyticsEventRow;

pub const SESSION_STARTED: &str = "certification_session_started";
pub const ANSWER_SCORED: &str = "certification_answer_scored";
pub const SESSION_COMPLETED: &str = "certification_completed";
pub const INTERVIEW_RESPONSE_SCORED: &str = "interview_response_scored";

#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    async fn write(&self, event: &AnalyticsEventRow) -> anyhow::Result<()>;
}

/// Records an event, logging and discarding any sink failure.
pub async fn record(sink: &dyn AnalyticsSink, event_type: &str, payload: Value) {
    let event = AnalyticsEventRow {
        id: Uuid::new_v4(),
        event_type: event_type.to_string(),
        payload,
        created_at: Utc::now(),
    };
    if let Err(e) = sink.write(&event).await {
        warn!("Dropping analytics event {event_type}: {e:#}");
    }
}

/// Persists events to the `analytics_events` table.
#[derive(Clone)]
pub struct PgAnalyticsSink {
    pool: PgPool,
}

impl PgAnalyticsSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AnalyticsSink for PgAnalyticsSink {
    async fn write(&self, event: &AnalyticsEventRow) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO analytics_events (id, event_type, payload, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(event.id)
        .bind(&event.event_type)
        .bind(&event.payload)
        .bind(event.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Emits events as structured log lines. Used with the in-memory store.
pub struct LogAnalyticsSink;

#[async_trait]
impl AnalyticsSink for LogAnalyticsSink {
    async fn write(&self, event: &AnalyticsEventRow) -> anyhow::Result<()> {
        info!(
            target: "analytics",
            event_id = %event.id,
            event_type = %event.event_type,
            payload = %event.payload,
            "analytics event"
        );
        Ok(())
    }
}

#[cfg(test)]
pub mod mock {
    use std::sync::Mutex;

    use super::*;

    /// Captures events in memory; `failing()` rejects every write.
    #[derive(Default)]
    pub struct MemoryAnalyticsSink {
        events: Mutex<Vec<AnalyticsEventRow>>,
        fail: bool,
    }

    impl MemoryAnalyticsSink {
        pub fn failing() -> Self {
            Self {
                events: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        pub fn event_types(&self) -> Vec<String> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .map(|e| e.event_type.clone())
                .collect()
        }
    }

    #[async_trait]
    impl AnalyticsSink for MemoryAnalyticsSink {
        async fn write(&self, event: &AnalyticsEventRow) -> anyhow::Result<()> {
            if self.fail {
                anyhow::bail!("analytics backend unavailable");
            }
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MemoryAnalyticsSink;
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_record_writes_event() {
        let sink = MemoryAnalyticsSink::default();
        record(&sink, SESSION_STARTED, json!({"questions": 3})).await;
        assert_eq!(sink.event_types(), vec![SESSION_STARTED.to_string()]);
    }

    #[tokio::test]
    async fn test_record_swallows_sink_failure() {
        let sink = MemoryAnalyticsSink::failing();
        record(&sink, SESSION_COMPLETED, json!({})).await;
        assert!(sink.event_types().is_empty());
    }

    #[tokio::test]
    async fn test_log_sink_never_fails() {
        record(&LogAnalyticsSink, ANSWER_SCORED, json!({"score": 4})).await;
    }
}
