use std::sync::Arc;

use annotator_core::metadata::{MetadataCodec, PngCommentCodec};
use annotator_core::session::{InMemorySessionStore, SessionStore};

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Live working sessions.
    pub sessions: Arc<dyn SessionStore>,
    /// Reads and writes annotations inside image files.
    pub codec: Arc<dyn MetadataCodec>,
}

impl AppState {
    /// State with the in-memory session store and the PNG comment codec.
    pub fn new(config: ServerConfig) -> Self {
        let sessions = Arc::new(InMemorySessionStore::new(config.session.clone()));
        Self {
            config: Arc::new(config),
            sessions,
            codec: Arc::new(PngCommentCodec),
        }
    }
}
