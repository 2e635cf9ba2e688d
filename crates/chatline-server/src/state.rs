use crate::config::Config;
use chatline_core::{ChatService, MemoryDirectory, MemoryStore};
use std::sync::Arc;

/// Shared server state.
pub struct AppState {
    /// The chat service.
    pub service: ChatService,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create app state backed by the in-memory store and user directory.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let service = ChatService::new(
            config.messaging.chat_config(),
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryDirectory::new()),
        );

        Self { service, config }
    }
}
