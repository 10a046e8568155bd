//! WebSocket conversation relay.
//!
//! This module carries live chat traffic between everyone watching the same
//! conversation: customers on a support widget and the staff answering them.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        Clients (widget, staff UI)                │
//! │  - One WebSocket connection each                                 │
//! │  - Send ClientFrame (join / leave / message)                     │
//! │  - Receive ServerFrame (join_ack / new_message)                  │
//! └───────────────────────────────┬──────────────────────────────────┘
//!                                 │ WebSocket
//! ┌───────────────────────────────▼──────────────────────────────────┐
//! │                        Connection loop (one task each)           │
//! │  - Decodes frames, validates, dispatches                         │
//! │  - Writer task drains the outbound channel                       │
//! │  - Cleanup guard purges membership on every exit path            │
//! └───────────┬───────────────────────────────┬──────────────────────┘
//!             │                               │
//! ┌───────────▼───────────┐       ┌───────────▼──────────────────────┐
//! │  ConnectionRegistry   │       │  RoomIndex + BroadcastEngine     │
//! │  (id -> handle)       │       │  (membership, room fan-out)      │
//! └───────────────────────┘       └──────────────────────────────────┘
//! ```
//!
//! Messages are persisted through [`crate::chat::MessageStore`] before
//! fan-out; a failed save is logged and the frame is delivered anyway,
//! minus its durable id.

mod broadcast;
mod connection;
mod registry;
mod rooms;

pub use broadcast::{BroadcastEngine, send_to};
pub use connection::ws_handler;
pub use registry::{ConnectionHandle, ConnectionId, ConnectionRegistry};
pub use rooms::RoomIndex;
