//! Registry of live WebSocket connections.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::Utf8Bytes;
use log::debug;
use parking_lot::Mutex;
use tokio::sync::mpsc;

/// Identifies one WebSocket connection for its lifetime.
pub type ConnectionId = u64;

/// Sending half of a connection.
///
/// Handles are shared with the room index so broadcasts can reach the
/// connection without touching its socket directly. Frames queued here are
/// drained by the connection's writer task; once every holder drops the
/// handle the channel closes and the writer task ends.
#[derive(Debug)]
pub struct ConnectionHandle {
    id: ConnectionId,
    frames_tx: mpsc::UnboundedSender<Utf8Bytes>,
}

impl ConnectionHandle {
    pub fn new(id: ConnectionId, frames_tx: mpsc::UnboundedSender<Utf8Bytes>) -> Self {
        Self { id, frames_tx }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue an encoded frame for delivery. Returns false when the
    /// connection's writer is already gone.
    pub fn send_text(&self, frame: Utf8Bytes) -> bool {
        self.frames_tx.send(frame).is_ok()
    }
}

/// All live connections, keyed by id.
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<ConnectionId, Arc<ConnectionHandle>>>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Admit a new connection: allocate an id, create its outbound channel
    /// and hand back the receiving end for the writer task.
    pub fn register(&self) -> (Arc<ConnectionHandle>, mpsc::UnboundedReceiver<Utf8Bytes>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let handle = Arc::new(ConnectionHandle::new(id, frames_tx));

        self.connections.lock().insert(id, Arc::clone(&handle));
        debug!("Registered relay connection {}", id);

        (handle, frames_rx)
    }

    /// Forget a connection. Safe to call for ids already removed.
    pub fn unregister(&self, id: ConnectionId) {
        if self.connections.lock().remove(&id).is_some() {
            debug!("Unregistered relay connection {}", id);
        }
    }

    pub fn count(&self) -> usize {
        self.connections.lock().len()
    }

    /// Point-in-time copy of every live handle, for diagnostics.
    pub fn snapshot(&self) -> Vec<Arc<ConnectionHandle>> {
        self.connections.lock().values().cloned().collect()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
