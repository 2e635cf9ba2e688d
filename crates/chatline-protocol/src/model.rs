//! Records exchanged between clients, the core, and the message store.
//!
//! Every inbound shape rejects unknown fields so that loosely-typed
//! documents never reach the core.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identity of a user. Users live outside this system and are
/// referenced by an opaque identifier only.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    /// Create a new user ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a fresh random identifier.
            #[must_use]
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

uuid_id!(
    /// Identity of a conversation.
    ConversationId
);

uuid_id!(
    /// Identity of a message.
    MessageId
);

/// Canonical key for an unordered pair of two distinct users.
///
/// `PairKey::new(a, b)` and `PairKey::new(b, a)` are equal, which is what
/// lets a store enforce one conversation per pair with a plain unique key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "(UserId, UserId)", into = "(UserId, UserId)")]
pub struct PairKey {
    low: UserId,
    high: UserId,
}

impl PairKey {
    /// Build the canonical key for two users.
    ///
    /// # Errors
    ///
    /// Returns an error if both identities are the same user.
    pub fn new(a: UserId, b: UserId) -> Result<Self, &'static str> {
        match a.cmp(&b) {
            std::cmp::Ordering::Less => Ok(Self { low: a, high: b }),
            std::cmp::Ordering::Greater => Ok(Self { low: b, high: a }),
            std::cmp::Ordering::Equal => Err("A conversation needs two distinct users"),
        }
    }

    /// Both participants, in canonical order.
    #[must_use]
    pub fn members(&self) -> (&UserId, &UserId) {
        (&self.low, &self.high)
    }

    /// Check whether a user is one of the two participants.
    #[must_use]
    pub fn contains(&self, user: &UserId) -> bool {
        &self.low == user || &self.high == user
    }

    /// The participant that is not `user`, if `user` is a participant.
    #[must_use]
    pub fn other(&self, user: &UserId) -> Option<&UserId> {
        if &self.low == user {
            Some(&self.high)
        } else if &self.high == user {
            Some(&self.low)
        } else {
            None
        }
    }
}

impl TryFrom<(UserId, UserId)> for PairKey {
    type Error = &'static str;

    fn try_from((a, b): (UserId, UserId)) -> Result<Self, Self::Error> {
        Self::new(a, b)
    }
}

impl From<PairKey> for (UserId, UserId) {
    fn from(key: PairKey) -> Self {
        (key.low, key.high)
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.low, self.high)
    }
}

/// A persistent pairing of two users that scopes their messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub participants: PairKey,
    /// Creation time in milliseconds since the Unix epoch.
    pub created_at: u64,
}

/// Delivery status of a message.
///
/// Variants are declared in lifecycle order, so `Ord` gives
/// `Sent < Delivered < Seen`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    /// Receiver was offline when the message was created.
    Sent,
    /// Receiver was connected when the message was created.
    Delivered,
    /// Receiver has viewed the conversation. Terminal.
    Seen,
}

impl DeliveryStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Seen => "seen",
        }
    }

    /// Whether moving from `self` to `target` is a forward transition.
    #[must_use]
    pub fn can_advance_to(&self, target: DeliveryStatus) -> bool {
        target > *self
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent" => Ok(DeliveryStatus::Sent),
            "delivered" => Ok(DeliveryStatus::Delivered),
            "seen" => Ok(DeliveryStatus::Seen),
            _ => Err("Invalid delivery status"),
        }
    }
}

/// Coarse classification of an attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    Video,
    File,
}

impl AttachmentKind {
    /// Classify an attachment from its MIME type.
    #[must_use]
    pub fn from_mime(mime: &str) -> Self {
        let top = mime.split('/').next().unwrap_or_default().trim();
        if top.eq_ignore_ascii_case("image") {
            AttachmentKind::Image
        } else if top.eq_ignore_ascii_case("video") {
            AttachmentKind::Video
        } else {
            AttachmentKind::File
        }
    }

    fn placeholder(&self) -> &'static str {
        match self {
            AttachmentKind::Image => "[image]",
            AttachmentKind::Video => "[video]",
            AttachmentKind::File => "[file]",
        }
    }
}

/// Reference to a stored attachment. The bytes live in external storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Attachment {
    pub url: String,
    pub kind: AttachmentKind,
}

impl Attachment {
    /// Create an attachment reference.
    #[must_use]
    pub fn new(url: impl Into<String>, kind: AttachmentKind) -> Self {
        Self {
            url: url.into(),
            kind,
        }
    }
}

/// Body of a send request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewMessage {
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
}

impl NewMessage {
    /// A plain text message.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            attachment: None,
        }
    }

    /// Attach a file reference.
    #[must_use]
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }

    /// Check that the message carries something: non-blank content or an
    /// attachment with a URL.
    ///
    /// # Errors
    ///
    /// Returns an error message describing the first problem found.
    pub fn validate(&self) -> Result<(), &'static str> {
        if let Some(attachment) = &self.attachment {
            if attachment.url.trim().is_empty() {
                return Err("Attachment URL cannot be empty");
            }
            return Ok(());
        }
        if self.content.trim().is_empty() {
            return Err("Message needs content or an attachment");
        }
        Ok(())
    }
}

/// A direct message between two users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender: UserId,
    pub receiver: UserId,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
    /// Creation time in milliseconds since the Unix epoch.
    pub created_at: u64,
    pub status: DeliveryStatus,
    pub is_deleted: bool,
    pub is_edited: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<u64>,
}

impl Message {
    /// Replace content with the tombstone and drop the attachment.
    pub fn tombstone(&mut self, text: &str) {
        self.content = text.to_string();
        self.attachment = None;
        self.is_deleted = true;
    }

    /// Short text for notification badges.
    ///
    /// Content is cut at `max_chars` characters. Attachment-only messages
    /// preview as a placeholder for their kind.
    #[must_use]
    pub fn preview(&self, max_chars: usize) -> String {
        if self.content.trim().is_empty() {
            return self
                .attachment
                .as_ref()
                .map(|a| a.kind.placeholder().to_string())
                .unwrap_or_default();
        }
        match self.content.char_indices().nth(max_chars) {
            Some((idx, _)) => format!("{}…", &self.content[..idx]),
            None => self.content.clone(),
        }
    }
}
