//! Training-progress propagation after a passed certification.
//!
//! Best-effort: callers log failures and carry on.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

#[async_trait]
pub trait ProgressTracker: Send + Sync {
    async fn mark_certified(&self, user_id: Uuid, module_id: &str) -> anyhow::Result<()>;
}

/// Upserts the trainee's row in `training_progress`.
#[derive(Clone)]
pub struct PgProgressTracker {
    pool: PgPool,
}

impl PgProgressTracker {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProgressTracker for PgProgressTracker {
    async fn mark_certified(&self, user_id: Uuid, module_id: &str) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO training_progress (user_id, module_id, certified, certified_at, updated_at)
            VALUES ($1, $2, TRUE, now(), now())
            ON CONFLICT (user_id, module_id)
            DO UPDATE SET certified = TRUE, certified_at = now(), updated_at = now()
            "#,
        )
        .bind(user_id)
        .bind(module_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Used with the in-memory store, where no progress table exists.
pub struct LogProgressTracker;

#[async_trait]
impl ProgressTracker for LogProgressTracker {
    async fn mark_certified(&self, user_id: Uuid, module_id: &str) -> anyhow::Result<()> {
        info!("User {user_id} certified for module {module_id}");
        Ok(())
    }
}
