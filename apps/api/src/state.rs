use std::sync::Arc;

use crate::agents::AgentRegistry;
use crate::analytics::AnalyticsSink;
use crate::certification::enhanced::EnhancedScorer;
use crate::certification::hybrid::HybridScorer;
use crate::certification::progress::ProgressTracker;
use crate::config::Config;
use crate::store::SessionStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Postgres or in-memory, chosen by STORE_BACKEND.
    pub store: Arc<dyn SessionStore>,
    pub hybrid: Arc<HybridScorer>,
    pub enhanced: Arc<EnhancedScorer>,
    pub analytics: Arc<dyn AnalyticsSink>,
    pub progress: Arc<dyn ProgressTracker>,
    pub agents: Arc<AgentRegistry>,
    pub config: Config,
}
