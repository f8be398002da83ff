#[cfg(test)]
mod chat_handler_tests {
    use async_trait::async_trait;
    use axum::{
        Router,
        body::{Body, to_bytes},
        http::{Request, StatusCode, header},
    };
    use serde_json::{Value, json};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    use crate::agent::ConversationStateMachine;
    use crate::api::{app_state::AppState, create_router};
    use crate::cache::CacheGate;
    use crate::config::config::{AgentConfig, CacheBackend, CacheConfig};
    use crate::error::Result;
    use crate::models::session::Conversation;
    use crate::observability::{AppMetrics, ObservabilityState};
    use crate::reasoning::{ReasoningOutcome, ReasoningStep};
    use crate::services::orchestrator::Orchestrator;
    use crate::services::session::MemorySessionStore;
    use crate::tools::{ToolDispatcher, ToolRegistry, ToolSpec, WebSearchTool};
    use crate::services::web_search::{MockExternalSearch, WebSearchAdapter};

    const ANSWER: &str = "Sauber becomes the Audi works team for the 2026 season.";

    struct FixedAnswer;

    #[async_trait]
    impl ReasoningStep for FixedAnswer {
        async fn reason(&self, _: &Conversation, _: &[ToolSpec]) -> Result<ReasoningOutcome> {
            Ok(ReasoningOutcome::Answer(ANSWER.into()))
        }
    }

    fn app() -> Router {
        let metrics = Arc::new(AppMetrics::default());

        let mut registry = ToolRegistry::new();
        let adapter = WebSearchAdapter::new(Arc::new(MockExternalSearch::new()), "F1 2026");
        registry
            .register(Arc::new(WebSearchTool::new(Arc::new(adapter))))
            .unwrap();
        let dispatcher = ToolDispatcher::new(Arc::new(registry), Duration::from_secs(1));
        let machine =
            ConversationStateMachine::new(Arc::new(FixedAnswer), Arc::new(dispatcher), 7, metrics.clone());

        let cache_config = CacheConfig {
            backend: CacheBackend::Memory,
            ..CacheConfig::default()
        };
        let cache = CacheGate::from_config(&cache_config, metrics.clone()).unwrap();
        let orchestrator = Orchestrator::new(
            Arc::new(machine),
            Arc::new(cache),
            Arc::new(MemorySessionStore::new(40, 16, Duration::from_secs(3600)).unwrap()),
            metrics.clone(),
            &AgentConfig::default(),
        );

        let observability = Arc::new(ObservabilityState::new("test".into(), metrics.clone()));
        create_router(
            AppState::new(orchestrator, metrics),
            observability,
            &["http://localhost:5173".to_string()],
        )
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_chat_streams_plain_text() {
        let response = app()
            .oneshot(post_json(
                "/api/v1/chat",
                json!({"message": "Who races for Audi?", "session_id": "abc"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(
            response.headers()[header::CONTENT_TYPE]
                .to_str()
                .unwrap()
                .starts_with("text/plain")
        );

        let body = body_text(response).await;
        assert!(body.starts_with("__LOG__ESTABLISHING UPLINK...\n"));
        assert!(body.ends_with(ANSWER));
    }

    #[tokio::test]
    async fn test_empty_message_returns_400() {
        let response = app()
            .oneshot(post_json("/api/v1/chat", json!({"message": ""})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn test_unknown_route_returns_404() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/api/v2/chat")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["code"], "NOT_FOUND");
        assert!(body["message"].as_str().unwrap().contains("/api/v2/chat"));
    }

    #[tokio::test]
    async fn test_chat_events_uses_named_events() {
        let response = app()
            .oneshot(post_json("/api/v1/chat/events", json!({"message": "Who races for Audi?"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(
            response.headers()[header::CONTENT_TYPE]
                .to_str()
                .unwrap()
                .starts_with("text/event-stream")
        );

        let body = body_text(response).await;
        assert!(body.contains("event: log\ndata: ESTABLISHING UPLINK..."));
        assert!(body.contains("event: answer\n"));
        assert!(!body.contains("event: error"));
    }

    #[tokio::test]
    async fn test_tool_catalog() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/tools")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let catalog: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(catalog[0]["name"], "search_web");
        assert_eq!(catalog[0]["parameters"]["type"], "object");
    }

    #[tokio::test]
    async fn test_metrics_count_chat_requests() {
        let app = app();
        let response = app
            .clone()
            .oneshot(post_json("/api/v1/chat", json!({"message": "hello there"})))
            .await
            .unwrap();
        body_text(response).await;

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = body_text(response).await;
        assert!(body.contains("chat_requests_total 1\n"));
        assert!(body.contains("http_requests_total 1\n"));
    }

    #[tokio::test]
    async fn test_cors_preflight_for_configured_origin() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/api/v1/chat")
                    .header(header::ORIGIN, "http://localhost:5173")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://localhost:5173"
        );
    }
}
