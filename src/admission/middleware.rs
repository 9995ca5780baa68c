//! Request-path admission middleware.
//!
//! Applied to the REST router with `axum::middleware::from_fn_with_state`.
//! Allowed requests continue to their handler; denials and evaluation
//! failures short-circuit with the matching [`GatewayError`] response.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use super::gate::Channel;
use crate::app_state::AppState;

/// Runs the request rule-set before the wrapped handler.
pub async fn admission_layer(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let facts = state
        .gate
        .facts(req.method(), req.uri(), req.headers(), peer);

    match state.gate.protect(Channel::Request, &facts) {
        Ok(()) => next.run(req).await,
        Err(err) => err.into_response(),
    }
}
