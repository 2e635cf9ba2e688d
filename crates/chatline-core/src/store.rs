//! Message store contract and an in-memory implementation.
//!
//! Conversations and messages are owned by the store. The core only holds
//! copies for the duration of a request.

use async_trait::async_trait;
use chatline_protocol::{
    Conversation, ConversationId, DeliveryStatus, Message, MessageId, PairKey, UserId,
};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::trace;

/// Errors reported by a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The record to update does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The message is a tombstone and rejects further writes.
    #[error("Deleted: {0}")]
    Deleted(String),

    /// The backend itself failed.
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Persistence operations consumed by the core.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a new message.
    async fn insert_message(&self, message: Message) -> Result<(), StoreError>;

    /// Find the conversation for an unordered pair.
    async fn find_conversation(&self, pair: &PairKey) -> Result<Option<Conversation>, StoreError>;

    /// Create a conversation.
    ///
    /// Fails with [`StoreError::Conflict`] if one already exists for the pair.
    async fn create_conversation(
        &self,
        conversation: Conversation,
    ) -> Result<Conversation, StoreError>;

    /// Get a conversation by ID.
    async fn conversation(&self, id: ConversationId) -> Result<Option<Conversation>, StoreError>;

    /// Get a message by ID.
    async fn find_message(&self, id: MessageId) -> Result<Option<Message>, StoreError>;

    /// Replace the content of a live message and mark it edited.
    ///
    /// Only content and edit fields change; status is left as stored.
    /// Fails with [`StoreError::Deleted`] if the message is a tombstone.
    async fn edit_content(
        &self,
        id: MessageId,
        content: String,
        edited_at: u64,
    ) -> Result<Message, StoreError>;

    /// Turn a live message into a tombstone carrying `text`.
    ///
    /// Fails with [`StoreError::Deleted`] if it already is one.
    async fn tombstone(&self, id: MessageId, text: &str) -> Result<Message, StoreError>;

    /// Move every message in `conversation` addressed to `receiver` whose
    /// status is behind `target` up to `target`.
    ///
    /// Returns the number of messages changed.
    async fn advance_status(
        &self,
        conversation: ConversationId,
        receiver: &UserId,
        target: DeliveryStatus,
    ) -> Result<u64, StoreError>;

    /// All messages in a conversation, oldest first.
    async fn messages_in(&self, conversation: ConversationId) -> Result<Vec<Message>, StoreError>;

    /// Delete every message in a conversation, keeping the conversation.
    ///
    /// Returns the number of messages deleted.
    async fn delete_messages_in(&self, conversation: ConversationId) -> Result<u64, StoreError>;

    /// Count messages addressed to `receiver` that have not been seen.
    async fn count_unread(&self, receiver: &UserId) -> Result<u64, StoreError>;

    /// Unseen message counts addressed to `receiver`, grouped by sender.
    async fn unread_by_sender(
        &self,
        receiver: &UserId,
    ) -> Result<BTreeMap<UserId, u64>, StoreError>;
}

/// In-memory message store.
///
/// Pair uniqueness is enforced through the `pairs` index, which plays the
/// role of a unique constraint on the canonical pair key.
#[derive(Debug, Default)]
pub struct MemoryStore {
    conversations: DashMap<ConversationId, Conversation>,
    pairs: DashMap<PairKey, ConversationId>,
    /// Messages per conversation, in insertion order.
    messages: DashMap<ConversationId, Vec<Message>>,
    /// Message ID to owning conversation.
    index: DashMap<MessageId, ConversationId>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of conversations.
    #[must_use]
    pub fn conversation_count(&self) -> usize {
        self.conversations.len()
    }

    /// Number of messages across all conversations.
    #[must_use]
    pub fn message_count(&self) -> usize {
        self.index.len()
    }

    /// Apply `change` to a live message in place and return the result.
    fn modify_live(
        &self,
        id: MessageId,
        change: impl FnOnce(&mut Message),
    ) -> Result<Message, StoreError> {
        let conversation = self
            .index
            .get(&id)
            .map(|e| *e.value())
            .ok_or_else(|| StoreError::NotFound(format!("message {}", id)))?;

        let mut list = self
            .messages
            .get_mut(&conversation)
            .ok_or_else(|| StoreError::NotFound(format!("message {}", id)))?;

        let message = list
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("message {}", id)))?;

        if message.is_deleted {
            return Err(StoreError::Deleted(format!("message {}", id)));
        }

        change(message);
        Ok(message.clone())
    }

    fn unread_for<'a>(message: &'a Message, receiver: &UserId) -> Option<&'a UserId> {
        (message.receiver == *receiver && message.status != DeliveryStatus::Seen)
            .then_some(&message.sender)
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn insert_message(&self, message: Message) -> Result<(), StoreError> {
        if !self.conversations.contains_key(&message.conversation_id) {
            return Err(StoreError::NotFound(format!(
                "conversation {}",
                message.conversation_id
            )));
        }

        let conversation = message.conversation_id;
        let id = message.id;
        self.messages.entry(conversation).or_default().push(message);
        self.index.insert(id, conversation);

        trace!(message = %id, conversation = %conversation, "Store: message inserted");
        Ok(())
    }

    async fn find_conversation(&self, pair: &PairKey) -> Result<Option<Conversation>, StoreError> {
        let Some(id) = self.pairs.get(pair).map(|e| *e.value()) else {
            return Ok(None);
        };
        Ok(self.conversations.get(&id).map(|e| e.value().clone()))
    }

    async fn create_conversation(
        &self,
        conversation: Conversation,
    ) -> Result<Conversation, StoreError> {
        match self.pairs.entry(conversation.participants.clone()) {
            Entry::Occupied(_) => Err(StoreError::Conflict(format!(
                "conversation for {}",
                conversation.participants
            ))),
            Entry::Vacant(slot) => {
                // Publish the record before the pair index points at it.
                self.conversations
                    .insert(conversation.id, conversation.clone());
                slot.insert(conversation.id);
                trace!(conversation = %conversation.id, "Store: conversation created");
                Ok(conversation)
            }
        }
    }

    async fn conversation(&self, id: ConversationId) -> Result<Option<Conversation>, StoreError> {
        Ok(self.conversations.get(&id).map(|e| e.value().clone()))
    }

    async fn find_message(&self, id: MessageId) -> Result<Option<Message>, StoreError> {
        let Some(conversation) = self.index.get(&id).map(|e| *e.value()) else {
            return Ok(None);
        };
        Ok(self
            .messages
            .get(&conversation)
            .and_then(|list| list.iter().find(|m| m.id == id).cloned()))
    }

    async fn edit_content(
        &self,
        id: MessageId,
        content: String,
        edited_at: u64,
    ) -> Result<Message, StoreError> {
        let edited = self.modify_live(id, |message| {
            message.content = content;
            message.is_edited = true;
            message.edited_at = Some(edited_at);
        })?;
        trace!(message = %id, "Store: message edited");
        Ok(edited)
    }

    async fn tombstone(&self, id: MessageId, text: &str) -> Result<Message, StoreError> {
        let deleted = self.modify_live(id, |message| message.tombstone(text))?;
        trace!(message = %id, "Store: message tombstoned");
        Ok(deleted)
    }

    async fn advance_status(
        &self,
        conversation: ConversationId,
        receiver: &UserId,
        target: DeliveryStatus,
    ) -> Result<u64, StoreError> {
        let Some(mut list) = self.messages.get_mut(&conversation) else {
            return Ok(0);
        };

        let mut changed = 0;
        for message in list
            .iter_mut()
            .filter(|m| m.receiver == *receiver && m.status.can_advance_to(target))
        {
            message.status = target;
            changed += 1;
        }

        Ok(changed)
    }

    async fn messages_in(&self, conversation: ConversationId) -> Result<Vec<Message>, StoreError> {
        Ok(self
            .messages
            .get(&conversation)
            .map(|list| list.value().clone())
            .unwrap_or_default())
    }

    async fn delete_messages_in(&self, conversation: ConversationId) -> Result<u64, StoreError> {
        let Some((_, removed)) = self.messages.remove(&conversation) else {
            return Ok(0);
        };
        for message in &removed {
            self.index.remove(&message.id);
        }
        Ok(removed.len() as u64)
    }

    async fn count_unread(&self, receiver: &UserId) -> Result<u64, StoreError> {
        Ok(self
            .messages
            .iter()
            .map(|list| {
                list.iter()
                    .filter(|m| Self::unread_for(m, receiver).is_some())
                    .count() as u64
            })
            .sum())
    }

    async fn unread_by_sender(
        &self,
        receiver: &UserId,
    ) -> Result<BTreeMap<UserId, u64>, StoreError> {
        let mut counts = BTreeMap::new();
        for list in self.messages.iter() {
            for sender in list.iter().filter_map(|m| Self::unread_for(m, receiver)) {
                *counts.entry(sender.clone()).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }
}
