//! Live events pushed to connected users, and signals they send back.

use crate::model::{ConversationId, DeliveryStatus, Message, MessageId, UserId};
use serde::{Deserialize, Serialize};

/// Event kind identifiers, used for metrics and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    NewMessage,
    Notification,
    StatusUpdated,
    Typing,
    StoppedTyping,
    MessageEdited,
    MessageDeleted,
    OnlineUsers,
    Connected,
    Pong,
    Error,
}

impl EventKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::NewMessage => "new_message",
            EventKind::Notification => "message_notification",
            EventKind::StatusUpdated => "status_updated",
            EventKind::Typing => "user_typing",
            EventKind::StoppedTyping => "user_stopped_typing",
            EventKind::MessageEdited => "message_edited",
            EventKind::MessageDeleted => "message_deleted",
            EventKind::OnlineUsers => "online_users",
            EventKind::Connected => "connected",
            EventKind::Pong => "pong",
            EventKind::Error => "error",
        }
    }
}

/// An event delivered from the server to one connected user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum ServerEvent {
    /// Full payload of a message addressed to the recipient.
    NewMessage { message: Message },

    /// Lightweight badge notification, separate from the message payload.
    #[serde(rename = "message_notification")]
    Notification {
        from: UserId,
        from_label: String,
        preview: String,
    },

    /// A batch of messages in a conversation moved to `status`.
    StatusUpdated {
        conversation_id: ConversationId,
        status: DeliveryStatus,
        /// The user whose action caused the update.
        updated_by: UserId,
        /// Number of messages that changed.
        count: u64,
    },

    #[serde(rename = "user_typing")]
    Typing { sender_id: UserId },

    #[serde(rename = "user_stopped_typing")]
    StoppedTyping { sender_id: UserId },

    MessageEdited {
        message_id: MessageId,
        content: String,
    },

    /// Clients replace the content with their local tombstone text.
    MessageDeleted { message_id: MessageId },

    /// Full snapshot of the users currently online.
    OnlineUsers { users: Vec<UserId> },

    /// Handshake acknowledgement sent once a connection is registered.
    Connected {
        user_id: UserId,
        connection_id: String,
    },

    /// Reply to a client ping.
    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },

    /// A signal from the client could not be processed.
    Error { code: u16, message: String },
}

impl ServerEvent {
    /// Get the event kind.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            ServerEvent::NewMessage { .. } => EventKind::NewMessage,
            ServerEvent::Notification { .. } => EventKind::Notification,
            ServerEvent::StatusUpdated { .. } => EventKind::StatusUpdated,
            ServerEvent::Typing { .. } => EventKind::Typing,
            ServerEvent::StoppedTyping { .. } => EventKind::StoppedTyping,
            ServerEvent::MessageEdited { .. } => EventKind::MessageEdited,
            ServerEvent::MessageDeleted { .. } => EventKind::MessageDeleted,
            ServerEvent::OnlineUsers { .. } => EventKind::OnlineUsers,
            ServerEvent::Connected { .. } => EventKind::Connected,
            ServerEvent::Pong { .. } => EventKind::Pong,
            ServerEvent::Error { .. } => EventKind::Error,
        }
    }

    /// Create an Error event.
    #[must_use]
    pub fn error(code: u16, message: impl Into<String>) -> Self {
        ServerEvent::Error {
            code,
            message: message.into(),
        }
    }
}

/// A signal sent by a connected client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum ClientSignal {
    /// The sender started typing to `receiver_id`.
    Typing { receiver_id: UserId },

    /// The sender stopped typing to `receiver_id`.
    StopTyping { receiver_id: UserId },

    /// Keepalive ping.
    Ping {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_tags() {
        let event = ServerEvent::Typing {
            sender_id: "alice".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "user_typing");
        assert_eq!(json["sender_id"], "alice");
        assert_eq!(event.kind().as_str(), "user_typing");

        let status = ServerEvent::StatusUpdated {
            conversation_id: ConversationId::generate(),
            status: DeliveryStatus::Seen,
            updated_by: "bob".into(),
            count: 2,
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["type"], "status_updated");
        assert_eq!(json["status"], "seen");
    }

    #[test]
    fn test_client_signal_parsing() {
        let signal: ClientSignal =
            serde_json::from_str(r#"{"type":"stop_typing","receiver_id":"bob"}"#).unwrap();
        assert_eq!(
            signal,
            ClientSignal::StopTyping {
                receiver_id: "bob".into()
            }
        );

        let ping: ClientSignal = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(ping, ClientSignal::Ping { timestamp: None });
    }

    #[test]
    fn test_client_signal_rejects_unknown_shapes() {
        assert!(serde_json::from_str::<ClientSignal>(r#"{"type":"shout"}"#).is_err());
        assert!(serde_json::from_str::<ClientSignal>(
            r#"{"type":"typing","receiver_id":"bob","extra":1}"#
        )
        .is_err());
    }
}
