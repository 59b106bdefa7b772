pub mod settings;

pub use settings::{ConversationConfig, DocumentConfig, LlmConfig, ServerConfig, Settings};
