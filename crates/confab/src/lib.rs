//! Confab Backend Library
//!
//! This library provides the core components for the Confab customer support
//! chat backend: the WebSocket conversation relay, message persistence, and
//! the HTTP surface around them.

pub mod api;
pub mod chat;
pub mod db;
pub mod relay;
