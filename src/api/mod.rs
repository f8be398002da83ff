//! API 模块
//!
//! 提供流式对话接口和工具目录。

#[cfg(test)]
mod api_tests;
pub mod app_state;
pub mod dto;
pub mod handlers;
pub mod routes;

use crate::api::app_state::AppState;
use crate::error::AppError;
use crate::observability::{ObservabilityState, create_observability_router, track_requests};
use axum::{
    Router,
    http::{HeaderValue, Method, Uri, header},
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::warn;

/// 只允许配置中列出的来源
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
}

pub fn create_router(
    app_state: AppState,
    observability: Arc<ObservabilityState>,
    cors_origins: &[String],
) -> Router {
    let api = Router::new().merge(routes::chat_routes::create_chat_router());

    Router::new()
        .nest("/api/v1", api)
        .with_state(app_state)
        .merge(create_observability_router(observability.clone()))
        .fallback(route_not_found)
        .layer(axum::middleware::from_fn_with_state(
            observability,
            track_requests,
        ))
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
}

async fn route_not_found(uri: Uri) -> AppError {
    AppError::NotFound(format!("no route for {}", uri.path()))
}
