pub mod error;

pub use error::{ApiError, ConversationError, DocumentError, LlmError};
