//! Streaming relay between the model provider and one client.
//!
//! A relay runs as its own task and talks to the transport through a bounded
//! channel. Lifecycle of one exchange:
//!
//! 1. wait for exclusive use of the conversation, stopping early if the
//!    client already left
//! 2. commit the user turn and snapshot the prior history
//! 3. start the provider stream and forward every non-empty fragment
//! 4. on exhaustion commit the trimmed reply (if any) and send `done`
//!
//! Provider errors end the exchange with a single `error` event. When the
//! client goes away the upstream stream is dropped and nothing more is
//! committed; the user turn stays in history either way.

use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::document::DocumentContext;
use crate::models::chat::{ConversationId, StreamEvent, Turn};
use crate::services::conversation::{ConversationLease, ConversationRegistry};
use crate::services::llm_service::LlmProvider;
use crate::services::prompt::PromptAssembler;

/// How an exchange ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Upstream exhausted; `committed` is false for a blank reply.
    Completed { committed: bool },
    /// An `error` event was sent (or attempted) with this message.
    Failed { message: String },
    /// The client disconnected mid-stream.
    Abandoned,
}

#[derive(Clone)]
pub struct StreamingRelay {
    registry: Arc<ConversationRegistry>,
    assembler: Arc<PromptAssembler>,
    document: Arc<DocumentContext>,
    provider: Arc<dyn LlmProvider>,
    temperature: f32,
}

impl StreamingRelay {
    pub fn new(
        registry: Arc<ConversationRegistry>,
        assembler: Arc<PromptAssembler>,
        document: Arc<DocumentContext>,
        provider: Arc<dyn LlmProvider>,
        temperature: f32,
    ) -> Self {
        Self {
            registry,
            assembler,
            document,
            provider,
            temperature,
        }
    }

    /// Run the exchange on a background task and hand back its event stream.
    pub fn spawn(
        self,
        lease: ConversationLease,
        message: String,
        buffer: usize,
    ) -> (ReceiverStream<StreamEvent>, JoinHandle<RelayOutcome>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let handle = tokio::spawn(async move { self.run(lease, message, tx).await });
        (ReceiverStream::new(rx), handle)
    }

    /// Drive one exchange to completion, failure or abandonment.
    pub async fn run(
        self,
        lease: ConversationLease,
        message: String,
        sink: mpsc::Sender<StreamEvent>,
    ) -> RelayOutcome {
        // Held until the exchange ends so turns of concurrent requests on the
        // same conversation never interleave.
        let (conversation_id, _gate) = lease.acquire().await;

        // A request queued behind another exchange may have lost its client.
        if sink.is_closed() {
            return Self::abandon(&conversation_id);
        }

        let history = match self.registry.begin_exchange(&conversation_id, &message) {
            Ok(history) => history,
            Err(e) => return Self::fail(&sink, &conversation_id, e.to_string()).await,
        };

        let messages = self
            .assembler
            .build(&history, &message, self.document.text());

        debug!(
            "Relaying conversation {} ({} prior turns, {} messages)",
            conversation_id,
            history.len(),
            messages.len()
        );

        let mut upstream = match self.provider.chat_stream(messages, self.temperature).await {
            Ok(stream) => stream,
            Err(e) => return Self::fail(&sink, &conversation_id, e.to_string()).await,
        };

        let mut reply = String::new();

        loop {
            let item = tokio::select! {
                item = upstream.next() => item,
                _ = sink.closed() => return Self::abandon(&conversation_id),
            };

            match item {
                Some(Ok(fragment)) => {
                    if fragment.is_empty() {
                        continue;
                    }
                    reply.push_str(&fragment);
                    if sink
                        .send(StreamEvent::Content { content: fragment })
                        .await
                        .is_err()
                    {
                        return Self::abandon(&conversation_id);
                    }
                }
                Some(Err(e)) => return Self::fail(&sink, &conversation_id, e.to_string()).await,
                None => break,
            }
        }

        // Release the provider connection before touching the registry.
        drop(upstream);

        let committed = self.commit_reply(&conversation_id, reply.trim());

        if sink
            .send(StreamEvent::Done {
                conversation_id: conversation_id.clone(),
            })
            .await
            .is_err()
        {
            debug!(
                "Client of conversation {} left before the done event",
                conversation_id
            );
        }

        info!(
            "Conversation {} completed (assistant turn committed: {})",
            conversation_id, committed
        );
        RelayOutcome::Completed { committed }
    }

    fn commit_reply(&self, conversation_id: &ConversationId, reply: &str) -> bool {
        if reply.is_empty() {
            debug!("Empty reply for conversation {}, nothing committed", conversation_id);
            return false;
        }

        match self.registry.append(conversation_id, Turn::assistant(reply)) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to commit reply: {}", e);
                false
            }
        }
    }

    async fn fail(
        sink: &mpsc::Sender<StreamEvent>,
        conversation_id: &ConversationId,
        message: String,
    ) -> RelayOutcome {
        warn!("Conversation {} failed: {}", conversation_id, message);

        if sink
            .send(StreamEvent::Error {
                message: message.clone(),
            })
            .await
            .is_err()
        {
            debug!("Client already gone, error event dropped");
        }

        RelayOutcome::Failed { message }
    }

    fn abandon(conversation_id: &ConversationId) -> RelayOutcome {
        info!(
            "Client disconnected, abandoning conversation {}",
            conversation_id
        );
        RelayOutcome::Abandoned
    }
}
