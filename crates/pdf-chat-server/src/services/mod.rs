pub mod conversation;
pub mod llm_service;
pub mod prompt;
pub mod relay;

pub use conversation::ConversationRegistry;
pub use llm_service::{LlmProvider, LlmService};
pub use prompt::PromptAssembler;
pub use relay::{RelayOutcome, StreamingRelay};
