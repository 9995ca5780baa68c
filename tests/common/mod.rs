//! Shared fixtures for integration tests.

#![allow(dead_code, clippy::panic, missing_docs)]

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use sportzy_live::admission::AdmissionGate;
use sportzy_live::api;
use sportzy_live::app_state::AppState;
use sportzy_live::config::WsSettings;
use sportzy_live::domain::{BroadcastHub, ConnectionRegistry};
use sportzy_live::persistence::{MatchStore, MemoryStore};
use sportzy_live::service::LiveService;

/// Builds application state over an in-memory store.
pub fn state(gate: AdmissionGate) -> AppState {
    let registry = Arc::new(ConnectionRegistry::new(64));
    let (hub, _worker) = BroadcastHub::spawn(Arc::clone(&registry), 256);
    let store: Arc<dyn MatchStore> = Arc::new(MemoryStore::new());
    AppState {
        live_service: Arc::new(LiveService::new(store, hub)),
        registry,
        gate: Arc::new(gate),
        ws: WsSettings::default(),
    }
}

/// Builds the full router for `state`.
pub fn app(state: &AppState) -> Router {
    api::build_router(state.clone())
}

/// Serves `state` on an ephemeral local port and returns its address.
pub async fn spawn_server(state: &AppState) -> SocketAddr {
    let Ok(listener) = tokio::net::TcpListener::bind("127.0.0.1:0").await else {
        panic!("bind failed");
    };
    let Ok(addr) = listener.local_addr() else {
        panic!("no local addr");
    };
    let app = app(state);
    tokio::spawn(async move {
        let _ = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await;
    });
    addr
}
