//! Errors returned by chatline operations.

use crate::store::StoreError;
use thiserror::Error;

/// Result alias for chatline operations.
pub type ChatResult<T> = Result<T, ChatError>;

/// Errors surfaced to the caller of a chat operation.
///
/// None of these are retried inside the core.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Conversation or message does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller is not allowed to perform the operation.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Edit or delete attempted after the mutation window closed.
    #[error("Mutation window of {window_secs}s exceeded")]
    TimeWindowExceeded { window_secs: u64 },

    /// Request is malformed (empty message, self-addressed, too long).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Duplicate conversation creation could not be resolved.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The message is a tombstone and can no longer change.
    #[error("Message has been deleted")]
    MessageDeleted,

    /// The message store failed.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl ChatError {
    /// Short machine-readable name of the error kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ChatError::NotFound(_) => "not_found",
            ChatError::Unauthorized(_) => "unauthorized",
            ChatError::TimeWindowExceeded { .. } => "time_window_exceeded",
            ChatError::InvalidInput(_) => "invalid_input",
            ChatError::Conflict(_) => "conflict",
            ChatError::MessageDeleted => "message_deleted",
            ChatError::Storage(_) => "storage",
        }
    }
}

impl From<StoreError> for ChatError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(what) => ChatError::Conflict(what),
            StoreError::NotFound(what) => ChatError::NotFound(what),
            StoreError::Deleted(_) => ChatError::MessageDeleted,
            StoreError::Backend(reason) => ChatError::Storage(reason),
        }
    }
}
