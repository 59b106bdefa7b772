use axum::extract::FromRef;
use std::sync::Arc;

use crate::config::Settings;
use crate::document::DocumentContext;
use crate::services::conversation::{ConversationRegistry, RetentionPolicy};
use crate::services::{LlmProvider, PromptAssembler, StreamingRelay};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub document: Arc<DocumentContext>,
    pub registry: Arc<ConversationRegistry>,
    pub assembler: Arc<PromptAssembler>,
    /// `None` when no credential is configured; `/chat` then refuses requests.
    pub llm: Option<Arc<dyn LlmProvider>>,
}

impl AppState {
    pub fn new(
        settings: Settings,
        document: DocumentContext,
        llm: Option<Arc<dyn LlmProvider>>,
    ) -> Self {
        let registry =
            ConversationRegistry::with_policy(RetentionPolicy::from(&settings.conversation));
        let assembler = PromptAssembler::new(settings.document.max_context_chars);

        Self {
            settings: Arc::new(settings),
            document: Arc::new(document),
            registry: Arc::new(registry),
            assembler: Arc::new(assembler),
            llm,
        }
    }

    pub fn llm_ready(&self) -> bool {
        self.llm.is_some()
    }

    /// Relay for one exchange, if a model client is available.
    pub fn relay(&self) -> Option<StreamingRelay> {
        let provider = self.llm.clone()?;
        Some(StreamingRelay::new(
            self.registry.clone(),
            self.assembler.clone(),
            self.document.clone(),
            provider,
            self.settings.llm.temperature,
        ))
    }
}

impl FromRef<AppState> for Arc<DocumentContext> {
    fn from_ref(state: &AppState) -> Self {
        state.document.clone()
    }
}

impl FromRef<AppState> for Arc<ConversationRegistry> {
    fn from_ref(state: &AppState) -> Self {
        state.registry.clone()
    }
}
