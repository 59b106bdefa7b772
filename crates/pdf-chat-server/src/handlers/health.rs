use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::document::DocumentContext;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub pdf_loaded: bool,
    pub pdf_chars: usize,
}

pub async fn health_check(State(document): State<Arc<DocumentContext>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        pdf_loaded: document.is_loaded(),
        pdf_chars: document.char_count(),
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DebugResponse {
    pub version: String,
    pub model: String,
    pub client_initialized: bool,
    pub active_conversations: usize,
    pub stored_turns: usize,
}

/// Diagnostic snapshot of the model client and conversation registry.
pub async fn debug_info(State(state): State<AppState>) -> Json<DebugResponse> {
    let stats = state.registry.stats();
    Json(DebugResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        model: state.settings.llm.model.clone(),
        client_initialized: state.llm_ready(),
        active_conversations: stats.conversations,
        stored_turns: stats.turns,
    })
}
