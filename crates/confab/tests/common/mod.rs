//! Shared helpers for integration tests.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;

use confab::api::{self, AppState};
use confab::chat::SqliteMessageStore;
use confab::db::Database;

/// Router backed by a fresh in-memory database.
pub async fn test_app() -> Router {
    let (app, _store) = test_app_with_store().await;
    app
}

/// Router plus direct store access for seeding and assertions.
pub async fn test_app_with_store() -> (Router, SqliteMessageStore) {
    let db = Database::in_memory().await.unwrap();
    let store = SqliteMessageStore::new(db.pool().clone());
    let state = AppState::new(Arc::new(store.clone()));
    (api::create_router(state), store)
}

/// A relay server listening on an ephemeral port, with handles into its
/// state for assertions.
pub struct TestServer {
    pub addr: SocketAddr,
    pub store: SqliteMessageStore,
    pub state: AppState,
}

pub async fn spawn_server() -> TestServer {
    let db = Database::in_memory().await.unwrap();
    let store = SqliteMessageStore::new(db.pool().clone());
    let state = AppState::new(Arc::new(store.clone()));
    let app = api::create_router(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer { addr, store, state }
}
