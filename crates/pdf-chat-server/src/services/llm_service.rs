use eventsource_stream::Eventsource;
use futures::stream::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::time::Duration;
use tracing::debug;

use crate::config::LlmConfig;
use crate::models::chat::Turn;
use crate::utils::error::LlmError;

/// Incremental completion text. Items may be empty (role-only deltas).
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

/// Streaming chat-completion backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    async fn chat_stream(
        &self,
        messages: Vec<Turn>,
        temperature: f32,
    ) -> Result<FragmentStream, LlmError>;
}

#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<Turn>,
    pub temperature: f32,
    pub stream: bool,
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    pub choices: Vec<ChoiceChunk>,
    #[serde(default)]
    pub error: Option<ChunkError>,
}

#[derive(Debug, Deserialize)]
pub struct ChoiceChunk {
    #[serde(default)]
    pub delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
pub struct Delta {
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChunkError {
    pub message: String,
}

/// OpenAI-compatible `/v1/chat/completions` client.
#[derive(Clone)]
pub struct LlmService {
    client: Client,
    config: LlmConfig,
    api_key: String,
}

impl LlmService {
    /// Fails when the config carries no usable credential.
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let api_key = config
            .credential()
            .ok_or_else(|| LlmError::Request("OpenAI API key not configured".to_string()))?
            .to_string();

        // Connect timeout only: streams run as long as the provider keeps sending.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .build()
            .map_err(|e| LlmError::Request(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            api_key,
        })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/v1/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait::async_trait]
impl LlmProvider for LlmService {
    async fn chat_stream(
        &self,
        messages: Vec<Turn>,
        temperature: f32,
    ) -> Result<FragmentStream, LlmError> {
        debug!(
            "Starting chat stream with {} messages (model: {})",
            messages.len(),
            self.config.model
        );

        let request = ChatCompletionRequest {
            model: &self.config.model,
            messages,
            temperature,
            stream: true,
        };

        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status { status, body });
        }

        let stream = async_stream::stream! {
            let mut events = response.bytes_stream().eventsource();

            while let Some(event) = events.next().await {
                match event {
                    Ok(event) => {
                        if event.data.trim() == "[DONE]" {
                            break;
                        }
                        match parse_chunk(&event.data) {
                            Ok(text) => yield Ok(text),
                            Err(e) => {
                                yield Err(e);
                                break;
                            }
                        }
                    }
                    Err(e) => {
                        yield Err(LlmError::Stream(e.to_string()));
                        break;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

/// Text carried by one `data:` payload; empty when the delta has no content.
pub fn parse_chunk(data: &str) -> Result<String, LlmError> {
    let chunk: ChatCompletionChunk =
        serde_json::from_str(data).map_err(|e| LlmError::Decode(e.to_string()))?;

    if let Some(error) = chunk.error {
        return Err(LlmError::Stream(error.message));
    }

    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .unwrap_or_default())
}
