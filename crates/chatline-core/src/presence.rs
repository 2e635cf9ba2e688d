//! Presence registry for chatline.
//!
//! Maps each online user to the one live connection that receives their
//! events. This is the only in-memory state shared by every connection
//! worker. It starts empty and is cleared on shutdown.
//!
//! At most one connection per user is routed to. A second connection
//! supersedes the first, and the first connection's later disconnect does
//! not evict the newer one.

use chatline_protocol::{ServerEvent, UserId};
use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, trace};

static CONNECTION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a live connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Create a connection ID from an existing string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a process-unique connection ID.
    #[must_use]
    pub fn generate() -> Self {
        let n = CONNECTION_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("conn_{:x}", n))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Sending half of a live connection.
///
/// Sends never block: events are queued for the connection's writer task,
/// and a closed connection simply drops them.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<ServerEvent>,
}

impl ConnectionHandle {
    /// Create a handle and the receiver its writer task drains.
    #[must_use]
    pub fn channel(id: ConnectionId) -> (Self, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { id, tx }, rx)
    }

    /// Get the connection ID.
    #[must_use]
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Queue an event for this connection.
    ///
    /// Returns `false` if the connection has gone away.
    pub fn send(&self, event: ServerEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    /// Check whether the connection's receiver has been dropped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Registry of online users and their live connections.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    connections: DashMap<UserId, ConnectionHandle>,
}

impl PresenceRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Route a user's events to `handle`.
    ///
    /// Returns the handle it replaced, if the user was already connected.
    pub fn register(&self, user: UserId, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        let connection = handle.id().clone();
        let previous = self.connections.insert(user.clone(), handle);

        match &previous {
            Some(old) => debug!(
                user = %user,
                connection = %connection,
                superseded = %old.id(),
                "Presence: connection superseded"
            ),
            None => debug!(user = %user, connection = %connection, "Presence: user online"),
        }

        previous
    }

    /// Remove a user's route, but only if it still points at `connection`.
    ///
    /// Returns `true` if the user went offline.
    pub fn unregister(&self, user: &UserId, connection: &ConnectionId) -> bool {
        let removed = self
            .connections
            .remove_if(user, |_, handle| handle.id() == connection)
            .is_some();

        if removed {
            debug!(user = %user, connection = %connection, "Presence: user offline");
        } else {
            trace!(user = %user, connection = %connection, "Presence: stale disconnect ignored");
        }

        removed
    }

    /// Get the live connection for a user.
    #[must_use]
    pub fn lookup(&self, user: &UserId) -> Option<ConnectionHandle> {
        self.connections.get(user).map(|entry| entry.value().clone())
    }

    /// Check if a user is online.
    #[must_use]
    pub fn is_online(&self, user: &UserId) -> bool {
        self.connections.contains_key(user)
    }

    /// All online users, sorted.
    #[must_use]
    pub fn snapshot(&self) -> Vec<UserId> {
        let mut users: Vec<UserId> = self.connections.iter().map(|e| e.key().clone()).collect();
        users.sort();
        users
    }

    /// Handles of every live connection.
    #[must_use]
    pub fn handles(&self) -> Vec<ConnectionHandle> {
        self.connections.iter().map(|e| e.value().clone()).collect()
    }

    /// Get the number of online users.
    #[must_use]
    pub fn count(&self) -> usize {
        self.connections.len()
    }

    /// Check if nobody is online.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Drop every route. Used on shutdown.
    pub fn clear(&self) {
        let count = self.connections.len();
        self.connections.clear();
        debug!(count, "Presence: registry cleared");
    }
}
