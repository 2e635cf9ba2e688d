//! Resolves an unordered pair of users to their single conversation.

use crate::error::{ChatError, ChatResult};
use crate::store::{MessageStore, StoreError};
use chatline_protocol::{Conversation, ConversationId, PairKey, UserId};
use std::sync::Arc;
use tracing::debug;

/// Finds or lazily creates the conversation for a pair of users.
pub struct ConversationResolver {
    store: Arc<dyn MessageStore>,
}

impl ConversationResolver {
    /// Create a resolver over a store.
    #[must_use]
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self { store }
    }

    /// Canonical key for two users.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::InvalidInput`] if both are the same user.
    pub fn pair(a: &UserId, b: &UserId) -> ChatResult<PairKey> {
        PairKey::new(a.clone(), b.clone()).map_err(|e| ChatError::InvalidInput(e.to_string()))
    }

    /// Find the existing conversation between two users, if any.
    ///
    /// # Errors
    ///
    /// Returns an error for a self-pair or a store failure.
    pub async fn find(&self, a: &UserId, b: &UserId) -> ChatResult<Option<Conversation>> {
        let key = Self::pair(a, b)?;
        Ok(self.store.find_conversation(&key).await?)
    }

    /// Find the conversation between two users, creating it on first contact.
    ///
    /// Concurrent first contact from both directions resolves to one
    /// conversation: the loser of the store's unique-pair check re-reads the
    /// winner's record.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Conflict`] if the store reports a duplicate but
    /// the winning record cannot be read back.
    pub async fn find_or_create(
        &self,
        a: &UserId,
        b: &UserId,
        now_ms: u64,
    ) -> ChatResult<Conversation> {
        let key = Self::pair(a, b)?;

        if let Some(existing) = self.store.find_conversation(&key).await? {
            return Ok(existing);
        }

        let candidate = Conversation {
            id: ConversationId::generate(),
            participants: key.clone(),
            created_at: now_ms,
        };

        match self.store.create_conversation(candidate).await {
            Ok(created) => {
                debug!(conversation = %created.id, pair = %key, "Conversation created");
                Ok(created)
            }
            Err(StoreError::Conflict(_)) => {
                debug!(pair = %key, "Lost conversation creation race, re-reading");
                self.store
                    .find_conversation(&key)
                    .await?
                    .ok_or_else(|| ChatError::Conflict(format!("conversation for {}", key)))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_find_or_create_is_symmetric() {
        let store = Arc::new(MemoryStore::new());
        let resolver = ConversationResolver::new(store.clone());
        let (alice, bob) = (UserId::from("alice"), UserId::from("bob"));

        let first = resolver.find_or_create(&alice, &bob, 1).await.unwrap();
        let second = resolver.find_or_create(&bob, &alice, 2).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(store.conversation_count(), 1);
    }

    #[tokio::test]
    async fn test_find_does_not_create() {
        let store = Arc::new(MemoryStore::new());
        let resolver = ConversationResolver::new(store.clone());

        let found = resolver.find(&"alice".into(), &"bob".into()).await.unwrap();
        assert!(found.is_none());
        assert_eq!(store.conversation_count(), 0);
    }

    #[tokio::test]
    async fn test_self_pair_rejected() {
        let resolver = ConversationResolver::new(Arc::new(MemoryStore::new()));
        let alice = UserId::from("alice");
        assert!(matches!(
            resolver.find_or_create(&alice, &alice, 0).await,
            Err(ChatError::InvalidInput(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_contact_creates_one_conversation() {
        let store = Arc::new(MemoryStore::new());
        let resolver = Arc::new(ConversationResolver::new(store.clone()));

        let mut tasks = Vec::new();
        for i in 0..32u64 {
            let resolver = resolver.clone();
            tasks.push(tokio::spawn(async move {
                let (a, b) = if i % 2 == 0 {
                    (UserId::from("alice"), UserId::from("bob"))
                } else {
                    (UserId::from("bob"), UserId::from("alice"))
                };
                resolver.find_or_create(&a, &b, i).await.unwrap().id
            }));
        }

        let mut ids = Vec::new();
        for task in tasks {
            ids.push(task.await.unwrap());
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(store.conversation_count(), 1);
    }
}
