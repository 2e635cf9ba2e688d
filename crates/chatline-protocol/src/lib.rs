//! # chatline-protocol
//!
//! Wire model for the chatline direct-messaging engine.
//!
//! - **model** - identities, conversations, messages and delivery status
//! - **events** - live events pushed to users and the signals they send
//! - **codec** - JSON text frames and length-prefixed MessagePack frames
//!
//! ## Example
//!
//! ```rust
//! use chatline_protocol::{codec, ClientSignal};
//!
//! let signal = ClientSignal::Typing { receiver_id: "bob".into() };
//! let encoded = codec::encode(&signal).unwrap();
//! let decoded: ClientSignal = codec::decode(&encoded).unwrap();
//! assert_eq!(signal, decoded);
//! ```

pub mod codec;
pub mod events;
pub mod model;

pub use codec::{Encoding, ProtocolError};
pub use events::{ClientSignal, EventKind, ServerEvent};
pub use model::{
    Attachment, AttachmentKind, Conversation, ConversationId, DeliveryStatus, Message, MessageId,
    NewMessage, PairKey, UserId,
};
