use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::types::{Conversation, ConversationLease, RegistryStats, RetentionPolicy};
use crate::models::chat::{ConversationId, Turn};
use crate::utils::error::ConversationError;

/// Thread-safe in-memory conversation registry.
/// DashMap shards give per-key locking; whole exchanges are serialized per
/// conversation through the gate of a [`ConversationLease`].
pub struct ConversationRegistry {
    storage: DashMap<ConversationId, Conversation>,
    policy: RetentionPolicy,
    /// Serializes capacity eviction with the insert that follows it.
    mint_lock: Mutex<()>,
}

impl ConversationRegistry {
    /// Registry that never evicts.
    pub fn new() -> Self {
        Self::with_policy(RetentionPolicy::unbounded())
    }

    pub fn with_policy(policy: RetentionPolicy) -> Self {
        info!("Initializing conversation registry (policy: {:?})", policy);
        Self {
            storage: DashMap::new(),
            policy,
            mint_lock: Mutex::new(()),
        }
    }

    /// Lease an existing conversation, or mint a fresh one when the id is
    /// absent, empty or unknown.
    pub fn resolve(&self, requested: Option<&str>) -> ConversationLease {
        if let Some(raw) = requested.filter(|raw| !raw.is_empty()) {
            if let Some(mut entry) = self.storage.get_mut(raw) {
                entry.touch();
                debug!("Resuming conversation {} ({} turns)", raw, entry.turns.len());
                return entry.lease(entry.key().clone());
            }
            debug!("Conversation {} not found, starting a new one", raw);
        }

        let _mint = self.mint_lock.lock();
        self.evict_for_capacity();

        let id = ConversationId::generate();
        let conversation = Conversation::new();
        let lease = conversation.lease(id.clone());
        self.storage.insert(id.clone(), conversation);
        info!("Created conversation {}", id);
        lease
    }

    /// Push one turn to the end of a conversation.
    pub fn append(&self, id: &ConversationId, turn: Turn) -> Result<(), ConversationError> {
        let mut entry = self
            .storage
            .get_mut(id)
            .ok_or_else(|| ConversationError::UnknownConversation(id.clone()))?;
        entry.turns.push(turn);
        entry.touch();
        Ok(())
    }

    /// Snapshot the history and commit the user turn in one step.
    /// The returned history does not include `user_message`.
    pub fn begin_exchange(
        &self,
        id: &ConversationId,
        user_message: &str,
    ) -> Result<Vec<Turn>, ConversationError> {
        let mut entry = self
            .storage
            .get_mut(id)
            .ok_or_else(|| ConversationError::UnknownConversation(id.clone()))?;
        let history = entry.turns.clone();
        entry.turns.push(Turn::user(user_message));
        entry.touch();
        Ok(history)
    }

    pub fn history(&self, id: &ConversationId) -> Option<Vec<Turn>> {
        self.storage.get(id).map(|entry| entry.turns.clone())
    }

    pub fn contains(&self, id: &ConversationId) -> bool {
        self.storage.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    pub fn stats(&self) -> RegistryStats {
        let turns = self.storage.iter().map(|entry| entry.turns.len()).sum();
        RegistryStats {
            conversations: self.storage.len(),
            turns,
        }
    }

    /// Remove conversations idle longer than the policy TTL.
    /// Returns number of conversations removed.
    pub fn cleanup_expired(&self) -> usize {
        let Some(ttl) = self.policy.idle_ttl else {
            return 0;
        };

        let start_len = self.storage.len();
        self.storage.retain(|id, conversation| {
            let keep = conversation.is_busy() || !conversation.is_idle_for(ttl);
            if !keep {
                debug!(
                    "Expiring conversation {} (age {:?})",
                    id,
                    conversation.created_at.elapsed()
                );
            }
            keep
        });
        let count = start_len.saturating_sub(self.storage.len());

        if count > 0 {
            info!("Cleaned up {} idle conversations", count);
        }

        count
    }

    /// Periodically run [`Self::cleanup_expired`]. No task is started when the
    /// policy has no TTL.
    pub fn spawn_sweeper(self: Arc<Self>, interval: Duration) -> Option<JoinHandle<()>> {
        if self.policy.idle_ttl.is_none() {
            return None;
        }

        info!("Starting idle conversation sweeper (every {:?})", interval);
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                self.cleanup_expired();
            }
        }))
    }

    /// Make room for one more conversation by evicting the least recently
    /// active ones that nobody holds a lease on. Caller holds `mint_lock`.
    fn evict_for_capacity(&self) {
        let Some(max) = self.policy.max_conversations else {
            return;
        };

        while self.storage.len() >= max {
            let victim = self
                .storage
                .iter()
                .filter(|entry| !entry.is_busy())
                .min_by_key(|entry| entry.last_activity)
                .map(|entry| entry.key().clone());

            let Some(victim) = victim else {
                warn!(
                    "Conversation capacity {} reached but every conversation is in use",
                    max
                );
                return;
            };

            if let Some((_, evicted)) = self
                .storage
                .remove_if(&victim, |_, conversation| !conversation.is_busy())
            {
                info!(
                    "Evicted least recently active conversation {} (age {:?})",
                    victim,
                    evicted.created_at.elapsed()
                );
            }
        }
    }
}

impl Default for ConversationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::Role;

    fn bounded(
        max_conversations: Option<usize>,
        idle_ttl: Option<Duration>,
    ) -> ConversationRegistry {
        ConversationRegistry::with_policy(RetentionPolicy {
            max_conversations,
            idle_ttl,
        })
    }

    /// Resolve and release the lease straight away.
    fn resolve_id(registry: &ConversationRegistry, requested: Option<&str>) -> ConversationId {
        registry.resolve(requested).id().clone()
    }

    #[test]
    fn test_resolve_absent_mints_new_conversation() {
        let registry = ConversationRegistry::new();
        let id = resolve_id(&registry, None);

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.history(&id), Some(vec![]));
        // Resolving the returned id again is stable.
        assert_eq!(resolve_id(&registry, Some(id.as_str())), id);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_resolve_empty_or_unknown_mints_fresh_id() {
        let registry = ConversationRegistry::new();

        let from_empty = resolve_id(&registry, Some(""));
        let from_unknown = resolve_id(&registry, Some("not-a-known-id"));

        assert_ne!(from_empty, from_unknown);
        assert_ne!(from_unknown.as_str(), "not-a-known-id");
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_append_to_unknown_conversation_fails() {
        let registry = ConversationRegistry::new();
        let ghost = ConversationId::from("ghost");

        let err = registry.append(&ghost, Turn::user("hi")).unwrap_err();
        assert_eq!(err, ConversationError::UnknownConversation(ghost));
    }

    #[test]
    fn test_begin_exchange_returns_prior_history_only() {
        let registry = ConversationRegistry::new();
        let id = resolve_id(&registry, None);

        let first = registry.begin_exchange(&id, "one").unwrap();
        assert!(first.is_empty());
        registry.append(&id, Turn::assistant("uno")).unwrap();

        let second = registry.begin_exchange(&id, "two").unwrap();
        assert_eq!(second, vec![Turn::user("one"), Turn::assistant("uno")]);

        let history = registry.history(&id).unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[2].role, Role::User);
        assert_eq!(history[2].content, "two");
    }

    #[test]
    fn test_conversations_are_isolated() {
        let registry = ConversationRegistry::new();
        let a = resolve_id(&registry, None);
        let b = resolve_id(&registry, None);

        registry.append(&a, Turn::user("for a")).unwrap();
        let before = registry.history(&a).unwrap();

        registry.append(&b, Turn::user("for b")).unwrap();
        registry.append(&b, Turn::assistant("reply b")).unwrap();

        assert_eq!(resolve_id(&registry, Some(a.as_str())), a);
        assert_eq!(registry.history(&a).unwrap(), before);
        assert_eq!(registry.stats(), RegistryStats { conversations: 2, turns: 3 });
    }

    #[test]
    fn test_capacity_evicts_least_recently_active() {
        let registry = bounded(Some(2), None);

        let oldest = resolve_id(&registry, None);
        std::thread::sleep(Duration::from_millis(5));
        let newer = resolve_id(&registry, None);
        std::thread::sleep(Duration::from_millis(5));
        // Touching `oldest` makes `newer` the eviction candidate.
        resolve_id(&registry, Some(oldest.as_str()));
        std::thread::sleep(Duration::from_millis(5));

        let third = resolve_id(&registry, None);

        assert_eq!(registry.len(), 2);
        assert!(registry.contains(&oldest));
        assert!(registry.contains(&third));
        assert!(!registry.contains(&newer));
    }

    #[test]
    fn test_leased_conversation_survives_minting_at_capacity() {
        let registry = bounded(Some(1), None);

        // Not yet locked by anyone; holding the lease alone must protect it.
        let first = registry.resolve(None);
        let second = registry.resolve(None);

        assert!(registry.contains(first.id()));
        assert!(registry.contains(second.id()));
        assert_eq!(registry.begin_exchange(first.id(), "hello").unwrap(), vec![]);
    }

    #[tokio::test]
    async fn test_capacity_never_evicts_conversation_in_use() {
        let registry = bounded(Some(1), None);

        let (busy, _guard) = registry.resolve(None).acquire().await;

        let other = resolve_id(&registry, None);
        assert!(registry.contains(&busy));
        assert!(registry.contains(&other));
    }

    #[test]
    fn test_released_lease_becomes_evictable() {
        let registry = bounded(Some(1), None);

        let first = resolve_id(&registry, None);
        let second = resolve_id(&registry, None);

        assert!(!registry.contains(&first));
        assert!(registry.contains(&second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_concurrent_minting_respects_capacity() {
        // Capacity above the thread count, so at least one entry is never leased.
        let registry = Arc::new(bounded(Some(16), None));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        resolve_id(&registry, None);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.len(), 16);
    }

    #[tokio::test]
    async fn test_cleanup_expired_removes_idle_conversations() {
        let registry = bounded(None, Some(Duration::from_millis(20)));

        let idle = resolve_id(&registry, None);
        let (busy, guard) = registry.resolve(None).acquire().await;

        tokio::time::sleep(Duration::from_millis(40)).await;
        let fresh = resolve_id(&registry, None);

        assert_eq!(registry.cleanup_expired(), 1);
        assert!(!registry.contains(&idle));
        assert!(registry.contains(&busy));
        assert!(registry.contains(&fresh));
        drop(guard);
    }

    #[test]
    fn test_unbounded_policy_never_cleans_up() {
        let registry = ConversationRegistry::new();
        registry.resolve(None);
        assert_eq!(registry.cleanup_expired(), 0);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_sweeper_only_runs_with_ttl() {
        let unbounded = Arc::new(ConversationRegistry::new());
        assert!(unbounded.spawn_sweeper(Duration::from_millis(10)).is_none());

        let swept = Arc::new(bounded(None, Some(Duration::from_millis(10))));
        let id = resolve_id(&swept, None);
        let handle = swept.clone().spawn_sweeper(Duration::from_millis(5)).unwrap();

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!swept.contains(&id));
        handle.abort();
    }
}
