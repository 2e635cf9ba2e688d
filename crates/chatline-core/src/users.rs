//! User directory contract.
//!
//! Users are owned by the surrounding application. The core only mirrors
//! online status into it and reads a display label for notifications.

use crate::store::StoreError;
use async_trait::async_trait;
use chatline_protocol::UserId;
use dashmap::DashMap;

/// User records consumed by the core.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Persist a user's online flag.
    async fn set_online(&self, user: &UserId, online: bool) -> Result<(), StoreError>;

    /// Human-readable label for a user, such as their email.
    async fn label(&self, user: &UserId) -> Result<Option<String>, StoreError>;
}

/// In-memory user directory.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    labels: DashMap<UserId, String>,
    online: DashMap<UserId, bool>,
}

impl MemoryDirectory {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user with a display label.
    #[must_use]
    pub fn with_user(self, user: impl Into<UserId>, label: impl Into<String>) -> Self {
        self.labels.insert(user.into(), label.into());
        self
    }

    /// Last persisted online flag for a user.
    #[must_use]
    pub fn is_online(&self, user: &UserId) -> bool {
        self.online.get(user).map(|e| *e.value()).unwrap_or(false)
    }
}

#[async_trait]
impl UserDirectory for MemoryDirectory {
    async fn set_online(&self, user: &UserId, online: bool) -> Result<(), StoreError> {
        self.online.insert(user.clone(), online);
        Ok(())
    }

    async fn label(&self, user: &UserId) -> Result<Option<String>, StoreError> {
        Ok(self.labels.get(user).map(|e| e.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_directory() {
        let directory = MemoryDirectory::new().with_user("alice", "alice@example.com");
        let alice = UserId::from("alice");

        assert_eq!(
            directory.label(&alice).await.unwrap().as_deref(),
            Some("alice@example.com")
        );
        assert!(directory.label(&"bob".into()).await.unwrap().is_none());

        assert!(!directory.is_online(&alice));
        directory.set_online(&alice, true).await.unwrap();
        assert!(directory.is_online(&alice));
    }
}
