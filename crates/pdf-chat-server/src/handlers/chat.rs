use crate::models::chat::{ChatQuery, StreamEvent};
use crate::state::AppState;
use crate::utils::error::ApiError;
use axum::{
    extract::{Query, State},
    http::header::{HeaderName, CACHE_CONTROL, CONNECTION},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
};
use futures::StreamExt;
use std::convert::Infallible;
use tracing::info;

/// `GET /chat` — stream one model reply as Server-Sent Events.
pub async fn chat_stream_handler(
    State(state): State<AppState>,
    Query(query): Query<ChatQuery>,
) -> Result<impl IntoResponse, ApiError> {
    // Refuse before anything is recorded when no model client exists.
    let relay = state.relay().ok_or_else(|| {
        ApiError::Configuration(
            "OpenAI API key not configured or SDK not initialized.".to_string(),
        )
    })?;

    if query.message.trim().is_empty() {
        return Err(ApiError::BadRequest("message must not be empty".to_string()));
    }

    // The lease keeps the conversation from being evicted before the relay
    // task takes its gate.
    let lease = state.registry.resolve(query.conversation_id.as_deref());

    info!(
        "Chat request: conversation={}, message_len={}",
        lease.id(),
        query.message.len()
    );

    let (events, _relay_task) = relay.spawn(
        lease,
        query.message,
        state.settings.conversation.stream_buffer,
    );

    let stream = events.map(|event| Ok::<_, Infallible>(create_sse_event(&event)));

    let headers = [
        (CACHE_CONTROL, "no-cache"),
        (CONNECTION, "keep-alive"),
        (HeaderName::from_static("x-accel-buffering"), "no"),
    ];

    Ok((headers, Sse::new(stream).keep_alive(KeepAlive::default())))
}

// Helper: Create SSE event (`data: <json>`)
fn create_sse_event(event: &StreamEvent) -> Event {
    Event::default().data(serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string()))
}
