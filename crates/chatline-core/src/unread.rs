//! Unread counts, computed from message status on every call.
//!
//! There is no cached counter to keep in sync: both queries read the same
//! predicate (receiver matches, status is not `seen`) from the store.

use crate::error::ChatResult;
use crate::store::MessageStore;
use chatline_protocol::UserId;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Pull-based unread count queries.
pub struct UnreadAggregator {
    store: Arc<dyn MessageStore>,
}

impl UnreadAggregator {
    #[must_use]
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self { store }
    }

    /// Total unseen messages addressed to `user`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store query fails.
    pub async fn total(&self, user: &UserId) -> ChatResult<u64> {
        Ok(self.store.count_unread(user).await?)
    }

    /// Unseen messages addressed to `user`, keyed by sender.
    ///
    /// # Errors
    ///
    /// Returns an error if the store query fails.
    pub async fn by_sender(&self, user: &UserId) -> ChatResult<BTreeMap<UserId, u64>> {
        Ok(self.store.unread_by_sender(user).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chatline_protocol::{Conversation, ConversationId, DeliveryStatus, Message, MessageId, PairKey};

    async fn conversation(store: &MemoryStore, a: &str, b: &str) -> ConversationId {
        let conversation = Conversation {
            id: ConversationId::generate(),
            participants: PairKey::new(a.into(), b.into()).unwrap(),
            created_at: 0,
        };
        store.create_conversation(conversation).await.unwrap().id
    }

    fn message(conversation: ConversationId, from: &str, to: &str, status: DeliveryStatus) -> Message {
        Message {
            id: MessageId::generate(),
            conversation_id: conversation,
            sender: from.into(),
            receiver: to.into(),
            content: "hi".into(),
            attachment: None,
            created_at: 0,
            status,
            is_deleted: false,
            is_edited: false,
            edited_at: None,
        }
    }

    #[tokio::test]
    async fn test_counts_agree() {
        let store = Arc::new(MemoryStore::new());
        let a = conversation(&store, "alice", "bob").await;
        let b = conversation(&store, "carol", "bob").await;
        store.insert_message(message(a, "alice", "bob", DeliveryStatus::Sent)).await.unwrap();
        store.insert_message(message(a, "alice", "bob", DeliveryStatus::Delivered)).await.unwrap();
        store.insert_message(message(a, "alice", "bob", DeliveryStatus::Seen)).await.unwrap();
        store.insert_message(message(b, "carol", "bob", DeliveryStatus::Sent)).await.unwrap();
        store.insert_message(message(a, "bob", "alice", DeliveryStatus::Sent)).await.unwrap();

        let unread = UnreadAggregator::new(store);
        let bob = UserId::from("bob");
        let by_sender = unread.by_sender(&bob).await.unwrap();

        assert_eq!(unread.total(&bob).await.unwrap(), 3);
        assert_eq!(by_sender.values().sum::<u64>(), 3);
        assert_eq!(by_sender.get(&UserId::from("alice")), Some(&2));
        assert_eq!(by_sender.get(&UserId::from("carol")), Some(&1));
        assert_eq!(unread.total(&"dave".into()).await.unwrap(), 0);
    }
}
