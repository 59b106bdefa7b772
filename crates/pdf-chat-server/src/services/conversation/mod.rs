//! Conversation memory
//!
//! In-memory, process-lifetime conversation state:
//! - Thread-safe registry (DashMap)
//! - Per-conversation exchange gate
//! - Optional capacity / idle-TTL retention

mod registry;
pub mod types;

pub use registry::ConversationRegistry;
pub use types::{Conversation, ConversationLease, RegistryStats, RetentionPolicy};

pub use crate::models::chat::{ConversationId, Turn};
