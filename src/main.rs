use anyhow::Context;
use janus::agent::ConversationStateMachine;
use janus::api::{self, app_state::AppState};
use janus::cache::CacheGate;
use janus::config::config::AppConfig;
use janus::config::loader::ConfigLoader;
use janus::index::create_knowledge_index;
use janus::observability::{self, AppMetrics, HealthCheckResult, ObservabilityState};
use janus::reasoning::create_reasoning_step;
use janus::services::{
    Orchestrator, create_retrieval_service, create_session_store, create_web_search_adapter,
};
use janus::tools::{KnowledgeBaseTool, ToolDispatcher, ToolRegistry, WebSearchTool};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ConfigLoader::load().context("failed to load configuration")?;
    ConfigLoader::validate(&config).context("invalid configuration")?;

    let _log_guard = observability::init_tracing(&config.logging)?;
    info!(
        "Starting {} ({} environment)...",
        config.app_name, config.environment
    );

    if config.reasoning.api_key.is_empty() {
        warn!("No reasoning API key configured, set JANUS_REASONING__API_KEY");
    }

    let metrics = Arc::new(AppMetrics::default());
    let observability_state = Arc::new(ObservabilityState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        metrics.clone(),
    ));

    let registry = build_tool_registry(&config)?;
    info!("Tool registry initialized with {} tools", registry.len());

    let dispatcher = ToolDispatcher::new(
        Arc::new(registry),
        Duration::from_secs(config.agent.tool_timeout_secs),
    );
    let reasoning = create_reasoning_step(&config.reasoning)?;
    info!("Reasoning step initialized: {}", config.reasoning.model);

    let machine = ConversationStateMachine::new(
        reasoning,
        Arc::new(dispatcher),
        config.agent.max_iterations,
        metrics.clone(),
    );

    let cache = CacheGate::from_config(&config.cache, metrics.clone())?;
    if let Some(store) = cache.store() {
        let check = match cache.ping().await {
            Ok(()) => HealthCheckResult::new("cache", true, store.backend_name()),
            Err(e) => {
                warn!("Response cache unavailable, requests will bypass it: {}", e);
                HealthCheckResult::new("cache", false, e.to_string())
            }
        };
        observability_state.set_health_check(check).await;
    }

    let sessions = create_session_store(&config.session, config.agent.history_turns)?;

    let orchestrator = Orchestrator::new(
        Arc::new(machine),
        Arc::new(cache),
        sessions,
        metrics.clone(),
        &config.agent,
    );
    info!("Orchestrator initialized");

    let app_state = AppState::new(orchestrator, metrics);
    let router = api::create_router(app_state, observability_state, &config.server.cors_origins);
    info!("API router created with observability endpoints");

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

fn build_tool_registry(config: &AppConfig) -> anyhow::Result<ToolRegistry> {
    let index =
        create_knowledge_index(&config.retrieval).context("failed to open knowledge index")?;
    let retrieval = create_retrieval_service(index, &config.retrieval);

    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(KnowledgeBaseTool::new(retrieval)))?;

    if config.web_search.enabled {
        let adapter = create_web_search_adapter(&config.web_search)?;
        registry.register(Arc::new(WebSearchTool::new(Arc::new(adapter))))?;
    } else {
        info!("Live web search disabled");
    }

    Ok(registry)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
    }
}
