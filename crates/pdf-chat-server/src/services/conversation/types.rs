use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::config::ConversationConfig;
use crate::models::chat::{ConversationId, Turn};

/// Conversation state stored in the registry.
#[derive(Debug)]
pub struct Conversation {
    /// Committed turns in chronological order. Never contains a system turn.
    pub turns: Vec<Turn>,

    pub created_at: Instant,

    /// Refreshed on every resolve/append (drives LRU and idle eviction).
    pub last_activity: Instant,

    /// Cloned into every lease; the relay holds its lock for the whole
    /// exchange so that requests on the same conversation run one after another.
    pub(super) gate: Arc<Mutex<()>>,
}

impl Conversation {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            turns: Vec::new(),
            created_at: now,
            last_activity: now,
            gate: Arc::new(Mutex::new(())),
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn is_idle_for(&self, ttl: Duration) -> bool {
        self.last_activity.elapsed() > ttl
    }

    /// True while any lease on this conversation is alive.
    pub fn is_busy(&self) -> bool {
        Arc::strong_count(&self.gate) > 1
    }

    pub(super) fn lease(&self, id: ConversationId) -> ConversationLease {
        ConversationLease {
            id,
            gate: self.gate.clone(),
        }
    }
}

/// A resolved conversation. Eviction and idle sweeps skip it from the moment
/// it is handed out until the lease, or the guard it turns into, is dropped.
#[derive(Debug)]
pub struct ConversationLease {
    id: ConversationId,
    gate: Arc<Mutex<()>>,
}

impl ConversationLease {
    pub fn id(&self) -> &ConversationId {
        &self.id
    }

    /// Wait for exclusive use of the conversation.
    pub async fn acquire(self) -> (ConversationId, OwnedMutexGuard<()>) {
        let guard = self.gate.lock_owned().await;
        (self.id, guard)
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

/// Optional bounds on registry growth. The default keeps every conversation
/// for the lifetime of the process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub max_conversations: Option<usize>,
    pub idle_ttl: Option<Duration>,
}

impl RetentionPolicy {
    pub fn unbounded() -> Self {
        Self::default()
    }
}

impl From<&ConversationConfig> for RetentionPolicy {
    fn from(config: &ConversationConfig) -> Self {
        Self {
            max_conversations: config.max_conversations.filter(|max| *max > 0),
            idle_ttl: config.idle_ttl(),
        }
    }
}

/// Registry statistics for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    pub conversations: usize,
    pub turns: usize,
}
