use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::models::chat::ConversationId;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            ApiError::Configuration(msg) => {
                tracing::error!("Configuration error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "ConfigurationError", msg)
            }
            ApiError::BadRequest(msg) => {
                tracing::warn!("Bad request: {}", msg);
                (StatusCode::BAD_REQUEST, "BadRequest", msg)
            }
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

/// Failures of the model provider, before or during a stream.
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Failed to call LLM API: {0}")]
    Request(String),

    #[error("LLM API error: {status} - {body}")]
    Status { status: u16, body: String },

    #[error("Streaming error: {0}")]
    Stream(String),

    #[error("Failed to decode LLM chunk: {0}")]
    Decode(String),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConversationError {
    #[error("Unknown conversation: {0}")]
    UnknownConversation(ConversationId),
}

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("PDF not found at: {0}")]
    NotFound(String),

    #[error("Failed to parse PDF: {0}")]
    Parse(String),
}
