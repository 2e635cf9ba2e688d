//! Best-effort delivery of live events to connected users.
//!
//! The core publishes through [`Notifier`]; nothing is queued for offline
//! users and a dead connection is not an error. Offline users catch up by
//! re-fetching when they reconnect.

use crate::presence::PresenceRegistry;
use chatline_protocol::{ServerEvent, UserId};
use std::sync::Arc;
use tracing::trace;

/// Publish interface the core calls to push live events.
///
/// Implementations must not block and must tolerate a user with no
/// subscriber.
pub trait Notifier: Send + Sync {
    /// Push an event to one user. Returns `true` if it was handed to a
    /// live connection.
    fn notify(&self, user: &UserId, event: ServerEvent) -> bool;

    /// Push an event to every connected user. Returns how many received it.
    fn broadcast(&self, event: ServerEvent) -> usize;
}

/// Notifier that routes through the presence registry.
pub struct Fanout {
    presence: Arc<PresenceRegistry>,
}

impl Fanout {
    /// Create a fanout over a presence registry.
    #[must_use]
    pub fn new(presence: Arc<PresenceRegistry>) -> Self {
        Self { presence }
    }
}

impl Notifier for Fanout {
    fn notify(&self, user: &UserId, event: ServerEvent) -> bool {
        let kind = event.kind();
        let Some(handle) = self.presence.lookup(user) else {
            trace!(user = %user, event = kind.as_str(), "Fanout: user offline, event dropped");
            return false;
        };

        let delivered = handle.send(event);
        trace!(
            user = %user,
            connection = %handle.id(),
            event = kind.as_str(),
            delivered,
            "Fanout: event pushed"
        );
        delivered
    }

    fn broadcast(&self, event: ServerEvent) -> usize {
        // Handles are cloned out first so no registry shard stays locked
        // while events are queued.
        let handles = self.presence.handles();
        let count = handles
            .iter()
            .filter(|handle| handle.send(event.clone()))
            .count();
        trace!(event = event.kind().as_str(), recipients = count, "Fanout: broadcast");
        count
    }
}
