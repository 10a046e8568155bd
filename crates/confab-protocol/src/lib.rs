//! Canonical protocol types for Confab conversation relay traffic.
//!
//! Both the server and any Rust client build against these types so the
//! wire contract lives in exactly one place.

pub mod frames;

pub use frames::{ClientFrame, JoinAckData, MessageSender, NewMessageData, ServerFrame};
