//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::admission::AdmissionGate;
use crate::config::WsSettings;
use crate::domain::{BroadcastHub, ConnectionRegistry};
use crate::service::LiveService;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Match and commentary operations (commit, then publish).
    pub live_service: Arc<LiveService>,
    /// Live push connections.
    pub registry: Arc<ConnectionRegistry>,
    /// Admission gate shared by the request path and the handshake.
    pub gate: Arc<AdmissionGate>,
    /// Push-channel heartbeat settings.
    pub ws: WsSettings,
}

impl AppState {
    /// Returns the broadcast hub behind the live service.
    #[must_use]
    pub fn hub(&self) -> &BroadcastHub {
        self.live_service.hub()
    }
}
