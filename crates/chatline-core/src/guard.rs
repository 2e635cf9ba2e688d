//! Ownership and time-window checks for editing and deleting messages.

use crate::error::{ChatError, ChatResult};
use chatline_protocol::{Message, UserId};
use std::time::Duration;

/// Default mutation window: one hour.
pub const DEFAULT_MUTATION_WINDOW: Duration = Duration::from_secs(60 * 60);

/// Decides whether a requester may mutate a message.
///
/// A mutation is allowed when the requester sent the message, the message
/// is not a tombstone, and no more than the window has elapsed since
/// creation. Exactly one window of elapsed time is still allowed.
#[derive(Debug, Clone, Copy)]
pub struct MutationGuard {
    window: Duration,
}

impl Default for MutationGuard {
    fn default() -> Self {
        Self::new(DEFAULT_MUTATION_WINDOW)
    }
}

impl MutationGuard {
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    /// Get the mutation window.
    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Check a mutation request.
    ///
    /// Ownership is checked first, so a non-sender is rejected with
    /// [`ChatError::Unauthorized`] regardless of time.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized`, `MessageDeleted` or `TimeWindowExceeded`.
    pub fn check(&self, message: &Message, requester: &UserId, now_ms: u64) -> ChatResult<()> {
        if &message.sender != requester {
            return Err(ChatError::Unauthorized(format!(
                "only the sender may change message {}",
                message.id
            )));
        }

        if message.is_deleted {
            return Err(ChatError::MessageDeleted);
        }

        let elapsed = now_ms.saturating_sub(message.created_at);
        if u128::from(elapsed) > self.window.as_millis() {
            return Err(ChatError::TimeWindowExceeded {
                window_secs: self.window.as_secs(),
            });
        }

        Ok(())
    }

    /// Check a mutation request, discarding the reason.
    #[must_use]
    pub fn can_mutate(&self, message: &Message, requester: &UserId, now_ms: u64) -> bool {
        self.check(message, requester, now_ms).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatline_protocol::{ConversationId, DeliveryStatus, MessageId};

    const HOUR_MS: u64 = 3_600_000;

    fn message(created_at: u64) -> Message {
        Message {
            id: MessageId::generate(),
            conversation_id: ConversationId::generate(),
            sender: "alice".into(),
            receiver: "bob".into(),
            content: "hello".into(),
            attachment: None,
            created_at,
            status: DeliveryStatus::Sent,
            is_deleted: false,
            is_edited: false,
            edited_at: None,
        }
    }

    #[test]
    fn test_window_boundary() {
        let guard = MutationGuard::default();
        let msg = message(1_000);
        let alice = UserId::from("alice");

        assert!(guard.can_mutate(&msg, &alice, 1_000));
        assert!(guard.can_mutate(&msg, &alice, 1_000 + HOUR_MS));
        assert!(matches!(
            guard.check(&msg, &alice, 1_000 + HOUR_MS + 1),
            Err(ChatError::TimeWindowExceeded { window_secs: 3600 })
        ));
    }

    #[test]
    fn test_non_sender_rejected_regardless_of_time() {
        let guard = MutationGuard::default();
        let msg = message(0);
        let bob = UserId::from("bob");

        assert!(matches!(
            guard.check(&msg, &bob, 0),
            Err(ChatError::Unauthorized(_))
        ));
        assert!(matches!(
            guard.check(&msg, &bob, 10 * HOUR_MS),
            Err(ChatError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_deleted_message_is_frozen() {
        let guard = MutationGuard::default();
        let mut msg = message(0);
        msg.tombstone("This message was deleted");

        assert!(matches!(
            guard.check(&msg, &"alice".into(), 1),
            Err(ChatError::MessageDeleted)
        ));
    }

    #[test]
    fn test_clock_skew_counts_as_zero_elapsed() {
        let guard = MutationGuard::new(Duration::from_secs(1));
        assert!(guard.can_mutate(&message(5_000), &"alice".into(), 4_000));
    }
}
