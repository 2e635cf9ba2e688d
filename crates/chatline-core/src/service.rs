//! The operations chatline exposes to HTTP handlers and live connections.
//!
//! A send runs: resolve conversation → pick initial status from presence →
//! persist → push to the receiver. Pushes happen after persistence and never
//! fail the request.

use crate::clock::{Clock, SystemClock};
use crate::conversation::ConversationResolver;
use crate::delivery::DeliveryTracker;
use crate::error::{ChatError, ChatResult};
use crate::fanout::{Fanout, Notifier};
use crate::guard::{MutationGuard, DEFAULT_MUTATION_WINDOW};
use crate::presence::{ConnectionHandle, ConnectionId, PresenceRegistry};
use crate::store::MessageStore;
use crate::unread::UnreadAggregator;
use crate::users::UserDirectory;
use chatline_protocol::{
    ConversationId, DeliveryStatus, Message, MessageId, NewMessage, ServerEvent, UserId,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default tombstone text for deleted messages.
pub const DEFAULT_TOMBSTONE: &str = "This message was deleted";

/// Chat behaviour settings.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// How long after creation a sender may edit or delete.
    pub edit_window: Duration,
    /// Content substituted for deleted messages.
    pub tombstone: String,
    /// Maximum characters of content shown in a notification preview.
    pub preview_chars: usize,
    /// Maximum characters of message content.
    pub max_content_chars: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            edit_window: DEFAULT_MUTATION_WINDOW,
            tombstone: DEFAULT_TOMBSTONE.to_string(),
            preview_chars: 80,
            max_content_chars: 10_000,
        }
    }
}

/// Direct-messaging service.
pub struct ChatService {
    config: ChatConfig,
    store: Arc<dyn MessageStore>,
    users: Arc<dyn UserDirectory>,
    presence: Arc<PresenceRegistry>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    resolver: ConversationResolver,
    delivery: DeliveryTracker,
    unread: UnreadAggregator,
    guard: MutationGuard,
}

impl ChatService {
    /// Create a service with an empty presence registry, fanout through
    /// that registry, and the system clock.
    #[must_use]
    pub fn new(
        config: ChatConfig,
        store: Arc<dyn MessageStore>,
        users: Arc<dyn UserDirectory>,
    ) -> Self {
        let presence = Arc::new(PresenceRegistry::new());
        let notifier: Arc<dyn Notifier> = Arc::new(Fanout::new(presence.clone()));

        info!("Creating chat service with config: {:?}", config);

        Self {
            guard: MutationGuard::new(config.edit_window),
            resolver: ConversationResolver::new(store.clone()),
            delivery: DeliveryTracker::new(store.clone(), presence.clone()),
            unread: UnreadAggregator::new(store.clone()),
            config,
            store,
            users,
            presence,
            notifier,
            clock: Arc::new(SystemClock),
        }
    }

    /// Use a different clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Publish live events through a different notifier.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Get the presence registry.
    #[must_use]
    pub fn presence(&self) -> &Arc<PresenceRegistry> {
        &self.presence
    }

    /// Get the service configuration.
    #[must_use]
    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// Send a message from `caller` to `receiver`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an empty, oversized or self-addressed
    /// message, or a storage error.
    pub async fn send(
        &self,
        caller: &UserId,
        receiver: &UserId,
        new: NewMessage,
    ) -> ChatResult<Message> {
        new.validate()
            .map_err(|e| ChatError::InvalidInput(e.to_string()))?;
        self.check_length(&new.content)?;

        let now = self.clock.now_ms();
        let conversation = self.resolver.find_or_create(caller, receiver, now).await?;

        let message = Message {
            id: MessageId::generate(),
            conversation_id: conversation.id,
            sender: caller.clone(),
            receiver: receiver.clone(),
            content: new.content,
            attachment: new.attachment,
            created_at: now,
            status: self.delivery.initial_status(receiver),
            is_deleted: false,
            is_edited: false,
            edited_at: None,
        };

        self.store.insert_message(message.clone()).await?;

        debug!(
            message = %message.id,
            conversation = %conversation.id,
            sender = %caller,
            receiver = %receiver,
            status = %message.status,
            "Message sent"
        );

        if self.presence.is_online(receiver) {
            let from_label = self.sender_label(caller).await;
            self.notifier.notify(
                receiver,
                ServerEvent::NewMessage {
                    message: message.clone(),
                },
            );
            self.notifier.notify(
                receiver,
                ServerEvent::Notification {
                    from: caller.clone(),
                    from_label,
                    preview: message.preview(self.config.preview_chars),
                },
            );
        }

        Ok(message)
    }

    /// Messages between `caller` and `partner`, oldest first.
    ///
    /// Returns an empty list if the pair has never talked. This does not
    /// create a conversation.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for a self-pair, or a storage error.
    pub async fn history(&self, caller: &UserId, partner: &UserId) -> ChatResult<Vec<Message>> {
        match self.resolver.find(caller, partner).await? {
            Some(conversation) => self.store.messages_in(conversation.id).await.map_err(Into::into),
            None => Ok(Vec::new()),
        }
    }

    /// Move the caller's received messages in a conversation forward to
    /// `status`, and tell the other participant.
    ///
    /// Returns the number of messages changed. Nothing pending is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown conversation and `Unauthorized` if
    /// the caller is not a participant.
    pub async fn update_status(
        &self,
        caller: &UserId,
        conversation_id: ConversationId,
        status: DeliveryStatus,
    ) -> ChatResult<u64> {
        let conversation = self
            .store
            .conversation(conversation_id)
            .await?
            .ok_or_else(|| ChatError::NotFound(format!("conversation {}", conversation_id)))?;

        let Some(partner) = conversation.participants.other(caller) else {
            return Err(ChatError::Unauthorized(format!(
                "{} is not a participant of conversation {}",
                caller, conversation_id
            )));
        };

        let count = self.delivery.advance(conversation.id, caller, status).await?;

        if count > 0 {
            self.notifier.notify(
                partner,
                ServerEvent::StatusUpdated {
                    conversation_id,
                    status,
                    updated_by: caller.clone(),
                    count,
                },
            );
        }

        Ok(count)
    }

    /// Mark every message the caller received in a conversation as seen.
    ///
    /// # Errors
    ///
    /// See [`ChatService::update_status`].
    pub async fn mark_seen(
        &self,
        caller: &UserId,
        conversation_id: ConversationId,
    ) -> ChatResult<u64> {
        self.update_status(caller, conversation_id, DeliveryStatus::Seen)
            .await
    }

    /// Mark every message the caller received from `partner` as seen.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for a self-pair, or a storage error.
    pub async fn mark_seen_from(&self, caller: &UserId, partner: &UserId) -> ChatResult<u64> {
        match self.resolver.find(caller, partner).await? {
            Some(conversation) => self.mark_seen(caller, conversation.id).await,
            None => Ok(0),
        }
    }

    /// Total unseen messages addressed to the caller.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub async fn total_unread(&self, caller: &UserId) -> ChatResult<u64> {
        self.unread.total(caller).await
    }

    /// Unseen messages addressed to the caller, keyed by sender.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub async fn unread_by_sender(&self, caller: &UserId) -> ChatResult<BTreeMap<UserId, u64>> {
        self.unread.by_sender(caller).await
    }

    /// Replace the content of one of the caller's messages.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `Unauthorized`, `MessageDeleted`,
    /// `TimeWindowExceeded` or `InvalidInput`.
    pub async fn edit_message(
        &self,
        caller: &UserId,
        message_id: MessageId,
        content: String,
    ) -> ChatResult<Message> {
        let current = self.load_message(message_id).await?;
        let now = self.clock.now_ms();
        self.guard.check(&current, caller, now)?;

        if content.trim().is_empty() && current.attachment.is_none() {
            return Err(ChatError::InvalidInput(
                "Message needs content or an attachment".to_string(),
            ));
        }
        self.check_length(&content)?;

        // Status is never written here, and a tombstone rejects the edit.
        let message = self.store.edit_content(message_id, content, now).await?;

        debug!(message = %message.id, sender = %caller, "Message edited");

        self.notifier.notify(
            &message.receiver,
            ServerEvent::MessageEdited {
                message_id: message.id,
                content: message.content.clone(),
            },
        );

        Ok(message)
    }

    /// Tombstone one of the caller's messages.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `Unauthorized`, `MessageDeleted` or
    /// `TimeWindowExceeded`.
    pub async fn delete_message(
        &self,
        caller: &UserId,
        message_id: MessageId,
    ) -> ChatResult<Message> {
        let current = self.load_message(message_id).await?;
        self.guard.check(&current, caller, self.clock.now_ms())?;

        let message = self
            .store
            .tombstone(message_id, &self.config.tombstone)
            .await?;

        debug!(message = %message.id, sender = %caller, "Message deleted");

        self.notifier.notify(
            &message.receiver,
            ServerEvent::MessageDeleted {
                message_id: message.id,
            },
        );

        Ok(message)
    }

    /// Delete every message between the caller and `partner`.
    ///
    /// The conversation record survives. Whether the caller may do this is
    /// decided by the caller of this method.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for a self-pair, or a storage error.
    pub async fn clear_conversation(&self, caller: &UserId, partner: &UserId) -> ChatResult<u64> {
        let Some(conversation) = self.resolver.find(caller, partner).await? else {
            debug!(caller = %caller, partner = %partner, "Nothing to clear");
            return Ok(0);
        };

        let deleted = self.store.delete_messages_in(conversation.id).await?;
        info!(
            conversation = %conversation.id,
            caller = %caller,
            deleted,
            "Conversation history cleared"
        );
        Ok(deleted)
    }

    /// Register a live connection for `user` and announce the new online set.
    pub async fn connect(&self, user: &UserId, handle: ConnectionHandle) {
        let connection_id = handle.id().clone();
        handle.send(ServerEvent::Connected {
            user_id: user.clone(),
            connection_id: connection_id.to_string(),
        });

        self.presence.register(user.clone(), handle);
        self.announce_presence();
        self.mirror_online(user, true).await;
    }

    /// Drop `user`'s live connection if it is still `connection`.
    ///
    /// Returns `true` if the connection was removed. A disconnect from a
    /// superseded connection changes nothing, and the persisted online flag
    /// is rewritten if the user reconnects while it is being cleared.
    pub async fn disconnect(&self, user: &UserId, connection: &ConnectionId) -> bool {
        if !self.presence.unregister(user, connection) {
            return false;
        }

        self.announce_presence();
        if self.presence.is_online(user) {
            return true;
        }

        self.mirror_online(user, false).await;
        if self.presence.is_online(user) {
            // Reconnected while the offline flag was being written.
            self.mirror_online(user, true).await;
        }
        true
    }

    /// Tell `receiver` that `sender` started typing.
    pub fn typing(&self, sender: &UserId, receiver: &UserId) -> bool {
        self.notifier.notify(
            receiver,
            ServerEvent::Typing {
                sender_id: sender.clone(),
            },
        )
    }

    /// Tell `receiver` that `sender` stopped typing.
    pub fn stop_typing(&self, sender: &UserId, receiver: &UserId) -> bool {
        self.notifier.notify(
            receiver,
            ServerEvent::StoppedTyping {
                sender_id: sender.clone(),
            },
        )
    }

    /// Forget every live connection.
    pub fn shutdown(&self) {
        self.presence.clear();
    }

    async fn load_message(&self, id: MessageId) -> ChatResult<Message> {
        self.store
            .find_message(id)
            .await?
            .ok_or_else(|| ChatError::NotFound(format!("message {}", id)))
    }

    fn check_length(&self, content: &str) -> ChatResult<()> {
        if content.chars().count() > self.config.max_content_chars {
            return Err(ChatError::InvalidInput(format!(
                "Message content exceeds {} characters",
                self.config.max_content_chars
            )));
        }
        Ok(())
    }

    fn announce_presence(&self) {
        self.notifier.broadcast(ServerEvent::OnlineUsers {
            users: self.presence.snapshot(),
        });
    }

    async fn mirror_online(&self, user: &UserId, online: bool) {
        if let Err(e) = self.users.set_online(user, online).await {
            warn!(user = %user, online, error = %e, "Failed to persist online flag");
        }
    }

    async fn sender_label(&self, user: &UserId) -> String {
        match self.users.label(user).await {
            Ok(Some(label)) => label,
            Ok(None) => user.to_string(),
            Err(e) => {
                warn!(user = %user, error = %e, "Failed to look up sender label");
                user.to_string()
            }
        }
    }
}
