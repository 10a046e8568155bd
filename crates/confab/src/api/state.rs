//! Shared application state.

use std::sync::Arc;

use crate::chat::MessageStore;
use crate::relay::{BroadcastEngine, ConnectionRegistry, RoomIndex};

/// State shared by every handler and connection task.
#[derive(Clone)]
pub struct AppState {
    /// Live WebSocket connections.
    pub registry: Arc<ConnectionRegistry>,
    /// Conversation room membership.
    pub rooms: Arc<RoomIndex>,
    /// Fan-out over the room index.
    pub broadcaster: Arc<BroadcastEngine>,
    /// Message persistence gateway.
    pub store: Arc<dyn MessageStore>,
    /// Origins accepted by the CORS layer. Empty means any origin.
    pub cors_origins: Vec<String>,
}

impl AppState {
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let rooms = Arc::new(RoomIndex::new());
        let broadcaster = Arc::new(BroadcastEngine::new(Arc::clone(&rooms)));

        Self {
            registry,
            rooms,
            broadcaster,
            store,
            cors_origins: Vec::new(),
        }
    }

    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = origins;
        self
    }
}
