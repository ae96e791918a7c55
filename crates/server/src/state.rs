//! Application state shared across handlers.

use crate::registry::SessionRegistry;
use chunkyard_core::config::AppConfig;
use chunkyard_storage::{Assembler, ChunkStore};
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Chunk and output storage areas.
    pub store: ChunkStore,
    /// Builds final files from acknowledged chunks.
    pub assembler: Assembler,
    /// In-progress upload sessions.
    pub registry: Arc<SessionRegistry>,
}

impl AppState {
    /// Create state with an empty session registry.
    pub fn new(config: AppConfig, store: ChunkStore) -> Self {
        Self {
            config: Arc::new(config),
            assembler: Assembler::new(store.clone()),
            store,
            registry: Arc::new(SessionRegistry::new()),
        }
    }
}
