//! Chat message persistence.
//!
//! The relay hands finished messages to a [`MessageStore`] and carries on;
//! everything durable about a conversation lives behind that trait.

mod models;
mod store;

pub use models::{NewMessage, StoredMessage};
pub use store::{MessageStore, SqliteMessageStore};
