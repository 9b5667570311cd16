pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::certification::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Certification progression
        .route("/api/v1/certifications", post(handlers::handle_start))
        .route(
            "/api/v1/certifications/:id",
            get(handlers::handle_get_certification),
        )
        .route(
            "/api/v1/certifications/:id/answers",
            post(handlers::handle_submit_answer),
        )
        .route(
            "/api/v1/certifications/:id/complete",
            post(handlers::handle_complete),
        )
        // Voice interview scoring
        .route("/api/v1/score", post(handlers::handle_score))
        .route(
            "/api/v1/interviews/:session_id",
            get(handlers::handle_get_interview),
        )
        // Capability routing
        .route(
            "/api/v1/agents/resolve",
            get(handlers::handle_resolve_agent),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;
    use crate::agents::AgentRegistry;
    use crate::analytics::mock::MemoryAnalyticsSink;
    use crate::certification::enhanced::EnhancedScorer;
    use crate::certification::hybrid::HybridScorer;
    use crate::certification::progress::mock::RecordingProgressTracker;
    use crate::config::{Config, StoreBackend};
    use crate::llm_client::mock::ScriptedModel;
    use crate::store::MemorySessionStore;

    fn test_state() -> AppState {
        let llm = Arc::new(ScriptedModel::failing());
        AppState {
            store: Arc::new(MemorySessionStore::new()),
            hybrid: Arc::new(HybridScorer::new(llm.clone())),
            enhanced: Arc::new(EnhancedScorer::new(llm)),
            analytics: Arc::new(MemoryAnalyticsSink::default()),
            progress: Arc::new(RecordingProgressTracker::default()),
            agents: Arc::new(AgentRegistry::default()),
            config: Config {
                store_backend: StoreBackend::Memory,
                database_url: None,
                anthropic_api_key: "test-key".to_string(),
                port: 0,
                rust_log: "info".to_string(),
                llm_timeout_secs: 5,
                agent_registry_path: None,
                default_passing_threshold: 70,
            },
        }
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        let request = match body {
            Some(b) => request.body(Body::from(b.to_string())).unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let app = build_router(test_state());
        let (status, body) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["service"], "zyglio-api");
    }

    #[tokio::test]
    async fn test_certification_flow_over_http() {
        let app = build_router(test_state());
        let user = Uuid::new_v4();

        let (status, record) = send(
            &app,
            "POST",
            "/api/v1/certifications",
            Some(json!({
                "user_id": user,
                "module_id": "forklift-101",
                "questions": [
                    {"id": "q1", "question": "Describe a pre-shift inspection.", "points": 1},
                    {"id": "q2", "question": "How do you lift a load?", "points": 1}
                ]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(record["status"], "VOICE_INTERVIEW_IN_PROGRESS");
        let id = record["id"].as_str().unwrap().to_string();

        let (status, answer) = send(
            &app,
            "POST",
            &format!("/api/v1/certifications/{id}/answers"),
            Some(json!({"user_id": user, "response": "Check forks, tyres and horn."})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(answer["current_question_index"], 1);
        assert_eq!(answer["next_question"]["id"], "q2");

        let (status, view) = send(
            &app,
            "GET",
            &format!("/api/v1/certifications/{id}?user_id={user}"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["stats"]["total_responses"], 1);

        let (status, _) = send(
            &app,
            "GET",
            &format!("/api/v1/certifications/{id}?user_id={}", Uuid::new_v4()),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, done) = send(
            &app,
            "POST",
            &format!("/api/v1/certifications/{id}/complete"),
            Some(json!({"user_id": user, "time_elapsed": 95})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        // 1 of 2 points earned
        assert_eq!(done["overall_score"], 50);
        assert_eq!(done["status"], "FAILED");

        let (status, err) = send(
            &app,
            "POST",
            &format!("/api/v1/certifications/{id}/answers"),
            Some(json!({"user_id": user, "response": "Too late."})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(err["error"]["code"], "INVALID_STATUS");
    }

    #[tokio::test]
    async fn test_interview_scoring_over_http() {
        let app = build_router(test_state());

        let (status, outcome) = send(
            &app,
            "POST",
            "/api/v1/score",
            Some(json!({
                "session_id": "voice-1",
                "question": "What does PPE stand for?",
                "response": "Personal protective equipment, like gloves and goggles."
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(outcome["ai_score_used"], false);
        assert_eq!(outcome["total_responses"], 1);

        let (status, session) = send(&app, "GET", "/api/v1/interviews/voice-1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(session["responses"].as_array().unwrap().len(), 1);

        let (status, err) = send(&app, "GET", "/api/v1/interviews/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(err["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_agent_resolution_over_http() {
        let app = build_router(test_state());
        let (status, body) = send(
            &app,
            "GET",
            "/api/v1/agents/resolve?module_id=forklift-101&topic=Load",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["agent_id"], "general-assessor");
        assert_eq!(body["fallback"], true);
    }

    #[tokio::test]
    async fn test_unknown_certification_is_404() {
        let app = build_router(test_state());
        let (status, _) = send(
            &app,
            "GET",
            &format!("/api/v1/certifications/{}?user_id={}", Uuid::new_v4(), Uuid::new_v4()),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
