//! Per-connection relay loop.

use std::sync::Arc;

use anyhow::Result;
use axum::extract::ws::{Message, Utf8Bytes, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use chrono::Utc;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use tokio::sync::mpsc;

use confab_protocol::{ClientFrame, MessageSender, NewMessageData, ServerFrame};

use crate::api::AppState;
use crate::chat::NewMessage;

use super::broadcast;
use super::registry::{ConnectionHandle, ConnectionId, ConnectionRegistry};
use super::rooms::RoomIndex;

/// WebSocket upgrade handler for `GET /ws`.
pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: AppState) {
    let (sink, mut stream) = socket.split();
    let (conn, frames_rx) = state.registry.register();
    info!("WebSocket client connected (connection {})", conn.id());

    let writer = tokio::spawn(write_frames(sink, frames_rx));

    // Teardown must happen exactly once, whether the loop below ends with a
    // close frame, a transport error, task cancellation or a panic. The
    // guard covers all of those.
    let _cleanup = CleanupGuard {
        conn_id: conn.id(),
        registry: Arc::clone(&state.registry),
        rooms: Arc::clone(&state.rooms),
    };

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientFrame>(text.as_str()) {
                Ok(frame) => {
                    if let Err(err) = dispatch_frame(&state, &conn, frame).await {
                        error!(
                            "Error handling frame from connection {}: {err:#}",
                            conn.id()
                        );
                    }
                }
                Err(err) => {
                    warn!(
                        "Dropping malformed frame from connection {}: {}",
                        conn.id(),
                        err
                    );
                }
            },
            Ok(Message::Binary(_)) => {
                debug!("Ignoring binary frame from connection {}", conn.id());
            }
            // Axum answers pings on its own.
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                debug!("Connection {} sent close", conn.id());
                break;
            }
            Err(err) => {
                warn!("WebSocket error on connection {}: {}", conn.id(), err);
                break;
            }
        }
    }

    writer.abort();
}

/// Forwards queued frames to the socket until the channel closes or a send
/// fails. The channel closes once every [`ConnectionHandle`] clone is gone,
/// so the task also winds down on teardown paths that never reach
/// `writer.abort()`.
async fn write_frames(
    mut sink: SplitSink<WebSocket, Message>,
    mut frames_rx: mpsc::UnboundedReceiver<Utf8Bytes>,
) {
    while let Some(frame) = frames_rx.recv().await {
        if sink.send(Message::Text(frame)).await.is_err() {
            break;
        }
    }
}

/// Runs connection teardown exactly once, on every exit path of the
/// connection task. Membership is purged before the registry entry goes
/// away, matching the joined-before-visible ordering on the way in.
struct CleanupGuard {
    conn_id: ConnectionId,
    registry: Arc<ConnectionRegistry>,
    rooms: Arc<RoomIndex>,
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        let left = self.rooms.purge_all(self.conn_id);
        if !left.is_empty() {
            debug!(
                "Purged connection {} from {} room(s)",
                self.conn_id,
                left.len()
            );
        }
        self.registry.unregister(self.conn_id);
        info!("WebSocket client disconnected (connection {})", self.conn_id);
    }
}

async fn dispatch_frame(
    state: &AppState,
    conn: &Arc<ConnectionHandle>,
    frame: ClientFrame,
) -> Result<()> {
    match frame {
        ClientFrame::Join { conversation_id } => {
            if conversation_id.is_empty() {
                debug!(
                    "Connection {} sent join without a conversation id",
                    conn.id()
                );
                return Ok(());
            }

            state.rooms.join(conn, &conversation_id);
            info!(
                "Connection {} joined conversation {}",
                conn.id(),
                conversation_id
            );

            if !broadcast::send_to(conn, &ServerFrame::join_ack(&conversation_id)) {
                warn!("Could not queue join_ack for connection {}", conn.id());
            }
            Ok(())
        }

        ClientFrame::Leave { conversation_id } => {
            if conversation_id.is_empty() {
                debug!(
                    "Connection {} sent leave without a conversation id",
                    conn.id()
                );
                return Ok(());
            }

            state.rooms.leave(conn.id(), &conversation_id);
            info!(
                "Connection {} left conversation {}",
                conn.id(),
                conversation_id
            );
            Ok(())
        }

        ClientFrame::Message {
            content,
            conversation_id,
            sender_id,
            sender_name,
            is_owner,
        } => {
            if conversation_id.is_empty() || content.is_empty() {
                debug!(
                    "Connection {} sent message without content or conversation id",
                    conn.id()
                );
                return Ok(());
            }

            let created_at = Utc::now();
            let message = NewMessage {
                content: content.clone(),
                sender_id: sender_id.clone(),
                conversation_id: conversation_id.clone(),
                is_owner,
                created_at,
            };

            // Live delivery does not depend on durability: a failed save is
            // logged and the frame goes out without its durable id.
            let message_id = match state.store.save_message(&message).await {
                Ok(id) => Some(id),
                Err(err) => {
                    warn!(
                        "Failed to save message in conversation {}: {err:#}",
                        conversation_id
                    );
                    None
                }
            };
            if let Err(err) = state
                .store
                .touch_conversation(&conversation_id, created_at)
                .await
            {
                warn!(
                    "Failed to update conversation {} timestamp: {err:#}",
                    conversation_id
                );
            }

            let frame = ServerFrame::NewMessage {
                content,
                conversation_id: conversation_id.clone(),
                sender_id: sender_id.clone(),
                sender_name: sender_name.clone(),
                is_owner,
                data: NewMessageData {
                    id: message_id,
                    created_at,
                    sender: MessageSender {
                        id: sender_id,
                        name: sender_name,
                    },
                },
            };
            state.broadcaster.broadcast(&conversation_id, &frame);
            Ok(())
        }
    }
}
