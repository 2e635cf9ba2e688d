//! Delivery state machine.
//!
//! ```text
//!   sent ──▶ delivered ──▶ seen
//!     └────────────────────▲
//! ```
//!
//! A message starts `delivered` if its receiver is online when it is
//! created, otherwise `sent`. Reconnecting does not upgrade older `sent`
//! messages; they stay `sent` until the receiver marks the conversation
//! seen. Transitions only move forward, so re-applying an earlier status
//! to a `seen` message changes nothing.

use crate::error::ChatResult;
use crate::presence::PresenceRegistry;
use crate::store::MessageStore;
use chatline_protocol::{ConversationId, DeliveryStatus, UserId};
use std::sync::Arc;
use tracing::debug;

/// Assigns initial statuses and applies batch transitions.
pub struct DeliveryTracker {
    store: Arc<dyn MessageStore>,
    presence: Arc<PresenceRegistry>,
}

impl DeliveryTracker {
    /// Create a tracker.
    #[must_use]
    pub fn new(store: Arc<dyn MessageStore>, presence: Arc<PresenceRegistry>) -> Self {
        Self { store, presence }
    }

    /// Status for a message about to be created for `receiver`.
    #[must_use]
    pub fn initial_status(&self, receiver: &UserId) -> DeliveryStatus {
        if self.presence.is_online(receiver) {
            DeliveryStatus::Delivered
        } else {
            DeliveryStatus::Sent
        }
    }

    /// Move the receiver's messages in a conversation forward to `target`.
    ///
    /// Idempotent: with nothing behind `target` it changes zero messages.
    ///
    /// # Errors
    ///
    /// Returns an error if the store update fails.
    pub async fn advance(
        &self,
        conversation: ConversationId,
        receiver: &UserId,
        target: DeliveryStatus,
    ) -> ChatResult<u64> {
        let changed = self
            .store
            .advance_status(conversation, receiver, target)
            .await?;

        debug!(
            conversation = %conversation,
            receiver = %receiver,
            status = %target,
            changed,
            "Delivery status advanced"
        );

        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presence::{ConnectionHandle, ConnectionId};
    use crate::store::MemoryStore;

    #[test]
    fn test_initial_status_follows_presence() {
        let presence = Arc::new(PresenceRegistry::new());
        let tracker = DeliveryTracker::new(Arc::new(MemoryStore::new()), presence.clone());
        let bob = UserId::from("bob");

        assert_eq!(tracker.initial_status(&bob), DeliveryStatus::Sent);

        let (handle, _rx) = ConnectionHandle::channel(ConnectionId::new("conn-1"));
        presence.register(bob.clone(), handle);
        assert_eq!(tracker.initial_status(&bob), DeliveryStatus::Delivered);
    }
}
