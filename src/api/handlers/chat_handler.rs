use axum::{
    Json,
    body::Body,
    extract::State,
    http::header,
    response::{
        IntoResponse,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures_util::StreamExt;
use std::convert::Infallible;
use tracing::debug;

use crate::{
    api::{app_state::AppState, dto::chat_dto::ChatRequest},
    error::AppError,
    models::event::StreamEvent,
};

/// Plain-text stream: log lines prefixed with `__LOG__`, answer text verbatim
pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<impl IntoResponse, AppError> {
    request.validate()?;
    debug!("Chat request for session {:?}", request.session_id);

    let stream = state
        .orchestrator
        .process(
            &request.message,
            request.session_id.as_deref(),
            request.partition.as_deref(),
        )
        .map(|event| Ok::<_, Infallible>(event.to_wire()));

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(stream),
    ))
}

fn to_sse(event: StreamEvent) -> Event {
    Event::default()
        .event(event.event_name())
        .data(event.text().replace('\r', ""))
}

/// Server-Sent Events with `log`, `answer` and `error` event names
pub async fn chat_events(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<impl IntoResponse, AppError> {
    request.validate()?;
    debug!("SSE chat request for session {:?}", request.session_id);

    let stream = state
        .orchestrator
        .process(
            &request.message,
            request.session_id.as_deref(),
            request.partition.as_deref(),
        )
        .map(|event| Ok::<_, Infallible>(to_sse(event)));

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Tool catalog declared to the reasoning step
pub async fn list_tools(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.orchestrator.machine().catalog().to_vec())
}
