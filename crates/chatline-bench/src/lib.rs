//! Shared fixtures for chatline benchmarks.

use chatline_core::{
    ChatConfig, ChatService, ConnectionHandle, ConnectionId, MemoryDirectory, MemoryStore,
};
use chatline_protocol::{ServerEvent, UserId};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

/// A service over fresh in-memory backends.
#[must_use]
pub fn service() -> ChatService {
    ChatService::new(
        ChatConfig::default(),
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryDirectory::new()),
    )
}

/// A single-threaded runtime for driving async operations from criterion.
///
/// # Panics
///
/// Panics if the runtime cannot be built.
#[must_use]
pub fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to build benchmark runtime")
}

/// Connect `count` users named `user-0..` and return their event receivers.
pub async fn connect_users(
    service: &ChatService,
    count: usize,
) -> Vec<(UserId, UnboundedReceiver<ServerEvent>)> {
    let mut users = Vec::with_capacity(count);
    for i in 0..count {
        let user = UserId::new(format!("user-{}", i));
        let (handle, rx) = ConnectionHandle::channel(ConnectionId::generate());
        service.connect(&user, handle).await;
        users.push((user, rx));
    }
    users
}

/// Discard every queued event.
pub fn drain(rx: &mut UnboundedReceiver<ServerEvent>) -> usize {
    let mut n = 0;
    while rx.try_recv().is_ok() {
        n += 1;
    }
    n
}
