//! Axum WebSocket upgrade handler.
//!
//! A handshake is admitted before the upgrade completes: the connection is
//! registered, checked against the handshake rule-set and activated only if
//! allowed. A denied handshake answers with the plain HTTP error response
//! and never reaches `Active`.

use std::net::SocketAddr;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, FromRequestParts, Query, Request, State};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use super::connection::run_connection;
use crate::admission::{Channel, RequestFacts};
use crate::app_state::AppState;
use crate::domain::{ConnectionHandle, OutboundQueue, Topic};
use crate::error::GatewayError;

/// Query parameters accepted on `/ws`.
#[derive(Debug, Default, Deserialize)]
pub struct WsQuery {
    /// Initial subscription: a match ID or `all`.
    #[serde(rename = "matchId")]
    pub match_id: Option<String>,
}

impl WsQuery {
    /// Initial topic; defaults to `all` when none is declared.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] for an unparsable `matchId`.
    pub fn initial_topic(&self) -> Result<Topic, GatewayError> {
        match self.match_id.as_deref() {
            None | Some("") => Ok(Topic::All),
            Some(raw) => raw.parse().map_err(GatewayError::InvalidRequest),
        }
    }
}

/// `GET /ws` — Upgrade HTTP connection to WebSocket.
pub async fn ws_handler(State(state): State<AppState>, req: Request) -> Response {
    let (mut parts, _body) = req.into_parts();
    let ws = match WebSocketUpgrade::from_request_parts(&mut parts, &state).await {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    let topic = match Query::<WsQuery>::try_from_uri(&parts.uri)
        .map_err(|e| GatewayError::InvalidRequest(e.body_text()))
        .and_then(|Query(query)| query.initial_topic())
    {
        Ok(topic) => topic,
        Err(err) => return err.into_response(),
    };

    let peer = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let facts = state
        .gate
        .facts(&parts.method, &parts.uri, &parts.headers, peer);

    let (handle, outbound) = match admit_handshake(&state, &facts, topic).await {
        Ok(admitted) => admitted,
        Err(err) => return err.into_response(),
    };

    let registry = std::sync::Arc::clone(&state.registry);
    let failed = handle.clone();
    ws.on_failed_upgrade(move |error| {
        tracing::debug!(connection_id = %failed.id(), %error, "websocket upgrade failed");
        tokio::spawn(async move {
            registry.deregister(&failed).await;
        });
    })
    .on_upgrade(move |socket| run_connection(socket, state, handle, outbound))
}

/// Registers a connection and runs the handshake rule-set against it.
///
/// On success the connection is `Active` and subscribed to `topic`. On any
/// denial or evaluation failure it is deregistered without ever becoming
/// `Active`.
///
/// # Errors
///
/// Returns [`GatewayError::AdmissionDenied`] or
/// [`GatewayError::AdmissionUnavailable`] from the gate, and
/// [`GatewayError::ShuttingDown`] once the registry stopped accepting.
pub async fn admit_handshake(
    state: &AppState,
    facts: &RequestFacts,
    topic: Topic,
) -> Result<(ConnectionHandle, OutboundQueue), GatewayError> {
    let (handle, outbound) = state.registry.register().await?;

    if let Err(err) = state.gate.protect(Channel::Handshake, facts) {
        state.registry.deregister(&handle).await;
        return Err(err);
    }
    if !state.registry.activate(&handle).await {
        state.registry.deregister(&handle).await;
        return Err(GatewayError::ShuttingDown);
    }
    state.registry.subscribe(&handle, topic).await;

    tracing::info!(connection_id = %handle.id(), %topic, "handshake admitted");
    Ok((handle, outbound))
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::admission::{AdmissionGate, GateSettings, RateRule};
    use crate::config::WsSettings;
    use crate::domain::{BroadcastHub, ConnectionRegistry, ConnectionState, MatchId};
    use crate::persistence::{MatchStore, MemoryStore};
    use crate::service::LiveService;

    fn state(gate: AdmissionGate) -> AppState {
        let registry = Arc::new(ConnectionRegistry::new(16));
        let (hub, _worker) = BroadcastHub::spawn(Arc::clone(&registry), 16);
        let store: Arc<dyn MatchStore> = Arc::new(MemoryStore::new());
        AppState {
            live_service: Arc::new(LiveService::new(store, hub)),
            registry,
            gate: Arc::new(gate),
            ws: WsSettings::default(),
        }
    }

    fn browser(identity: &str) -> RequestFacts {
        RequestFacts {
            identity: Some(identity.to_string()),
            method: "GET".to_string(),
            path: "/ws".to_string(),
            user_agent: Some("Mozilla/5.0 (X11; Linux x86_64)".to_string()),
            ..RequestFacts::default()
        }
    }

    #[test]
    fn initial_topic_defaults_to_all() {
        assert_eq!(WsQuery::default().initial_topic().ok(), Some(Topic::All));
        let query = WsQuery {
            match_id: Some("9".to_string()),
        };
        assert_eq!(query.initial_topic().ok(), Some(Topic::Match(MatchId::new(9))));
        let bad = WsQuery {
            match_id: Some("nine".to_string()),
        };
        assert!(matches!(bad.initial_topic(), Err(GatewayError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn sixth_handshake_in_window_is_denied_without_activation() {
        let settings = GateSettings {
            handshake_rule: RateRule::new(Duration::from_secs(2), 5),
            allowed_bots: HashSet::new(),
            ..GateSettings::default()
        };
        let state = state(AdmissionGate::enabled(settings));
        let facts = browser("10.0.0.1");

        let mut admitted = Vec::new();
        for _ in 0..5 {
            let Ok((handle, rx)) = admit_handshake(&state, &facts, Topic::All).await else {
                panic!("handshake within limit must be admitted");
            };
            assert_eq!(handle.state(), ConnectionState::Active);
            admitted.push((handle, rx));
        }

        let denied = admit_handshake(&state, &facts, Topic::All).await;
        let Err(err) = denied else {
            panic!("sixth handshake must be denied");
        };
        assert_eq!(err.status_code(), axum::http::StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(state.registry.len().await, 5);
        assert_eq!(state.registry.active_count().await, 5);
    }

    #[tokio::test]
    async fn disabled_gate_admits_any_volume() {
        let state = state(AdmissionGate::Disabled);
        let facts = browser("10.0.0.2");
        let mut admitted = Vec::new();
        for _ in 0..50 {
            let Ok(pair) = admit_handshake(&state, &facts, Topic::All).await else {
                panic!("disabled gate must admit");
            };
            admitted.push(pair);
        }
        assert_eq!(state.registry.active_count().await, 50);
    }

    #[tokio::test]
    async fn handshake_after_close_is_refused() {
        let state = state(AdmissionGate::Disabled);
        let _ = state.registry.close().await;
        let result = admit_handshake(&state, &browser("10.0.0.3"), Topic::All).await;
        assert!(matches!(result, Err(GatewayError::ShuttingDown)));
    }
}
