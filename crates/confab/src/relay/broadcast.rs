//! Room fan-out.

use std::sync::Arc;

use axum::extract::ws::Utf8Bytes;
use log::{debug, warn};

use confab_protocol::ServerFrame;

use super::registry::ConnectionHandle;
use super::rooms::RoomIndex;

/// Fans server frames out to the members of a conversation room.
pub struct BroadcastEngine {
    rooms: Arc<RoomIndex>,
}

impl BroadcastEngine {
    pub fn new(rooms: Arc<RoomIndex>) -> Self {
        Self { rooms }
    }

    /// Deliver `frame` to the current members of `conversation_id`.
    ///
    /// Membership is snapshotted before any delivery and the frame is
    /// encoded once, with the same buffer queued for every recipient. A
    /// member whose writer is gone is logged and skipped; the rest still
    /// receive the frame. Returns how many members the frame was queued
    /// for.
    pub fn broadcast(&self, conversation_id: &str, frame: &ServerFrame) -> usize {
        let encoded = match serde_json::to_string(frame) {
            Ok(json) => Utf8Bytes::from(json),
            Err(err) => {
                warn!(
                    "Failed to encode frame for conversation {}: {}",
                    conversation_id, err
                );
                return 0;
            }
        };

        let members = self.rooms.members_of(conversation_id);
        let mut delivered = 0;
        for conn in &members {
            if conn.send_text(encoded.clone()) {
                delivered += 1;
            } else {
                warn!(
                    "Dropping frame for closed connection {} in conversation {}",
                    conn.id(),
                    conversation_id
                );
            }
        }

        debug!(
            "Broadcast frame to {}/{} members of conversation {}",
            delivered,
            members.len(),
            conversation_id
        );
        delivered
    }
}

/// Deliver a frame to a single connection, bypassing room membership.
pub fn send_to(conn: &ConnectionHandle, frame: &ServerFrame) -> bool {
    match serde_json::to_string(frame) {
        Ok(json) => conn.send_text(Utf8Bytes::from(json)),
        Err(err) => {
            warn!("Failed to encode frame for connection {}: {}", conn.id(), err);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::registry::ConnectionId;
    use chrono::Utc;
    use confab_protocol::{MessageSender, NewMessageData};
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    fn make_handle(id: ConnectionId) -> (Arc<ConnectionHandle>, UnboundedReceiver<Utf8Bytes>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(ConnectionHandle::new(id, tx)), rx)
    }

    fn make_engine() -> (BroadcastEngine, Arc<RoomIndex>) {
        let rooms = Arc::new(RoomIndex::new());
        (BroadcastEngine::new(Arc::clone(&rooms)), rooms)
    }

    fn sample_message() -> ServerFrame {
        ServerFrame::NewMessage {
            content: "hello".to_string(),
            conversation_id: "conv-1".to_string(),
            sender_id: "u-1".to_string(),
            sender_name: "Ada".to_string(),
            is_owner: true,
            data: NewMessageData {
                id: Some("msg-1".to_string()),
                created_at: Utc::now(),
                sender: MessageSender {
                    id: "u-1".to_string(),
                    name: "Ada".to_string(),
                },
            },
        }
    }

    #[test]
    fn test_broadcast_reaches_only_room_members() {
        let (engine, rooms) = make_engine();
        let (first, mut rx1) = make_handle(1);
        let (second, mut rx2) = make_handle(2);
        let (outsider, mut rx3) = make_handle(3);

        rooms.join(&first, "conv-1");
        rooms.join(&second, "conv-1");
        rooms.join(&outsider, "conv-2");

        let delivered = engine.broadcast("conv-1", &ServerFrame::join_ack("conv-1"));
        assert_eq!(delivered, 2);

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
        assert!(rx3.try_recv().is_err());
    }

    #[test]
    fn test_broadcast_to_empty_room() {
        let (engine, _rooms) = make_engine();
        let delivered = engine.broadcast("conv-none", &ServerFrame::join_ack("conv-none"));
        assert_eq!(delivered, 0);
    }

    #[test]
    fn test_broadcast_skips_closed_connections() {
        let (engine, rooms) = make_engine();
        let (live, mut live_rx) = make_handle(1);
        let (dead, dead_rx) = make_handle(2);

        rooms.join(&live, "conv-1");
        rooms.join(&dead, "conv-1");
        drop(dead_rx);

        let delivered = engine.broadcast("conv-1", &ServerFrame::join_ack("conv-1"));
        assert_eq!(delivered, 1);
        assert!(live_rx.try_recv().is_ok());
    }

    #[test]
    fn test_broadcast_encodes_frame_once() {
        let (engine, rooms) = make_engine();
        let (first, mut rx1) = make_handle(1);
        let (second, mut rx2) = make_handle(2);

        rooms.join(&first, "conv-1");
        rooms.join(&second, "conv-1");

        engine.broadcast("conv-1", &sample_message());

        let a = rx1.try_recv().unwrap();
        let b = rx2.try_recv().unwrap();
        // Both recipients share one encoded buffer.
        assert_eq!(a.as_str().as_ptr(), b.as_str().as_ptr());
    }

    #[test]
    fn test_broadcast_frame_is_valid_json() {
        let (engine, rooms) = make_engine();
        let (conn, mut rx) = make_handle(1);
        rooms.join(&conn, "conv-1");

        engine.broadcast("conv-1", &sample_message());

        let raw = rx.try_recv().unwrap();
        let frame: ServerFrame = serde_json::from_str(raw.as_str()).unwrap();
        match frame {
            ServerFrame::NewMessage {
                conversation_id,
                sender_name,
                is_owner,
                data,
                ..
            } => {
                assert_eq!(conversation_id, "conv-1");
                assert_eq!(sender_name, "Ada");
                assert!(is_owner);
                assert_eq!(data.id.as_deref(), Some("msg-1"));
            }
            other => panic!("decoded wrong variant: {other:?}"),
        }
    }

    #[test]
    fn test_send_to_single_connection() {
        let (_engine, rooms) = make_engine();
        let (target, mut target_rx) = make_handle(1);
        let (other, mut other_rx) = make_handle(2);

        rooms.join(&target, "conv-1");
        rooms.join(&other, "conv-1");

        assert!(send_to(&target, &ServerFrame::join_ack("conv-1")));
        assert!(target_rx.try_recv().is_ok());
        assert!(other_rx.try_recv().is_err());
    }
}
