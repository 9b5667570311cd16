mod agents;
mod analytics;
mod certification;
mod config;
mod db;
mod errors;
mod llm_client;
mod models;
mod routes;
mod state;
mod store;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::agents::AgentRegistry;
use crate::analytics::{AnalyticsSink, LogAnalyticsSink, PgAnalyticsSink};
use crate::certification::enhanced::EnhancedScorer;
use crate::certification::hybrid::HybridScorer;
use crate::certification::progress::{LogProgressTracker, PgProgressTracker, ProgressTracker};
use crate::config::{Config, StoreBackend};
use crate::db::create_pool;
use crate::llm_client::{CompletionModel, LlmClient};
use crate::routes::build_router;
use crate::state::AppState;
use crate::store::{MemorySessionStore, PgSessionStore, SessionStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Zyglio API v{}", env!("CARGO_PKG_VERSION"));

    // Session store plus the sinks that share its backend
    let (store, analytics, progress): (
        Arc<dyn SessionStore>,
        Arc<dyn AnalyticsSink>,
        Arc<dyn ProgressTracker>,
    ) = match config.store_backend {
        StoreBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL is required for the postgres store")?;
            let db = create_pool(url).await?;
            (
                Arc::new(PgSessionStore::new(db.clone())),
                Arc::new(PgAnalyticsSink::new(db.clone())),
                Arc::new(PgProgressTracker::new(db)),
            )
        }
        StoreBackend::Memory => {
            info!("Using in-memory session store; data is lost on restart");
            (
                Arc::new(MemorySessionStore::new()),
                Arc::new(LogAnalyticsSink),
                Arc::new(LogProgressTracker),
            )
        }
    };

    // Initialize LLM client
    let llm: Arc<dyn CompletionModel> = Arc::new(LlmClient::new(
        config.anthropic_api_key.clone(),
        Duration::from_secs(config.llm_timeout_secs),
    )?);
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    let agents = match &config.agent_registry_path {
        Some(path) => AgentRegistry::load(path)?,
        None => {
            info!("AGENT_REGISTRY_PATH not set; every interview uses the default agent");
            AgentRegistry::default()
        }
    };

    // Build app state
    let state = AppState {
        store,
        hybrid: Arc::new(HybridScorer::new(llm.clone())),
        enhanced: Arc::new(EnhancedScorer::new(llm)),
        analytics,
        progress,
        agents: Arc::new(agents),
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins once the web client domain is fixed

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
