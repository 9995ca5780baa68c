//! Admission control for requests and push-channel handshakes.
//!
//! Every inbound HTTP request and every `/ws` handshake passes the
//! [`AdmissionGate`] first. The gate runs three rules in order and stops at
//! the first one that does not allow the caller:
//!
//! 1. [`Shield`] — static anomaly heuristics over the request shape.
//! 2. [`ClientClassifier`] — automated clients are denied unless their
//!    category is allow-listed.
//! 3. [`RateLimiter`] — per-identity window, with separate limits for
//!    requests and handshakes.

pub mod bot;
pub mod gate;
pub mod middleware;
pub mod rate_window;
pub mod shield;

use std::net::SocketAddr;

use axum::http::{HeaderMap, Method, Uri, header};

pub use bot::{BotCategory, ClientClass, ClientClassifier, UserAgentClassifier};
pub use gate::{
    AdmissionGate, AdmissionMode, AdmissionStats, Channel, Decision, DenyReason, EnabledGate,
    ForbiddenRule, GateSettings, spawn_janitor,
};
pub use middleware::admission_layer;
pub use rate_window::{RateLimiter, RateRule, RateWindow, WindowDecision};
pub use shield::Shield;

/// The parts of an inbound request the admission rules look at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestFacts {
    /// Caller identity used as the rate window key (client IP).
    pub identity: Option<String>,
    /// HTTP method.
    pub method: String,
    /// Request path.
    pub path: String,
    /// Raw query string, if any.
    pub query: Option<String>,
    /// `User-Agent` header, if present and valid UTF-8.
    pub user_agent: Option<String>,
    /// Total size of header names and values.
    pub header_bytes: usize,
}

impl RequestFacts {
    /// Extracts facts from request parts.
    ///
    /// With `trust_proxy` the left-most `X-Forwarded-For` entry (or
    /// `X-Real-IP`) is taken as the identity; otherwise only the socket
    /// peer address is used.
    #[must_use]
    pub fn from_request(
        method: &Method,
        uri: &Uri,
        headers: &HeaderMap,
        peer: Option<SocketAddr>,
        trust_proxy: bool,
    ) -> Self {
        let forwarded = trust_proxy
            .then(|| forwarded_identity(headers))
            .flatten();
        let identity = forwarded.or_else(|| peer.map(|addr| addr.ip().to_string()));

        let header_bytes = headers
            .iter()
            .map(|(name, value)| name.as_str().len().saturating_add(value.len()))
            .fold(0usize, usize::saturating_add);

        Self {
            identity,
            method: method.as_str().to_string(),
            path: uri.path().to_string(),
            query: uri.query().map(str::to_string),
            user_agent: headers
                .get(header::USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            header_bytes,
        }
    }
}

fn forwarded_identity(headers: &HeaderMap) -> Option<String> {
    let from_xff = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let from_real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    from_xff.or_else(from_real_ip).map(str::to_string)
}
