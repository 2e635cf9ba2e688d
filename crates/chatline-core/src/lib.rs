//! # chatline-core
//!
//! Conversations, delivery tracking and live fanout for one-to-one chat.
//!
//! This crate provides the building blocks behind [`ChatService`]:
//!
//! - **Presence** - Which users are online and where their events go
//! - **Conversation** - One conversation per unordered pair of users
//! - **Delivery** - Forward-only `sent → delivered → seen` tracking
//! - **Fanout** - Best-effort pushes to online users
//! - **Guard** - Sender-only edits and deletes inside a time window
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌──────────────┐
//! │   Handler   │────▶│ ChatService │────▶│ MessageStore │
//! └─────────────┘     └─────────────┘     └──────────────┘
//!                            │
//!                            ▼
//!                     ┌─────────────┐     ┌──────────────┐
//!                     │   Fanout    │────▶│   Presence   │
//!                     └─────────────┘     └──────────────┘
//! ```

pub mod clock;
pub mod conversation;
pub mod delivery;
pub mod error;
pub mod fanout;
pub mod guard;
pub mod presence;
pub mod service;
pub mod store;
pub mod unread;
pub mod users;

pub use clock::{Clock, ManualClock, SystemClock};
pub use conversation::ConversationResolver;
pub use delivery::DeliveryTracker;
pub use error::{ChatError, ChatResult};
pub use fanout::{Fanout, Notifier};
pub use guard::{MutationGuard, DEFAULT_MUTATION_WINDOW};
pub use presence::{ConnectionHandle, ConnectionId, PresenceRegistry};
pub use service::{ChatConfig, ChatService, DEFAULT_TOMBSTONE};
pub use store::{MemoryStore, MessageStore, StoreError};
pub use unread::UnreadAggregator;
pub use users::{MemoryDirectory, UserDirectory};
