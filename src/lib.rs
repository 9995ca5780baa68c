//! # sportzy-live
//!
//! REST API and WebSocket push gateway for live sports matches and
//! commentary.
//!
//! Committed writes are fanned out to connected clients in commit order per
//! match, with at-most-once delivery and no replay. Every request and every
//! push-channel handshake passes a layered admission gate first (shield
//! heuristics, automated-client classification, per-identity rate windows).
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP, WebSocket)
//!     │
//!     ├── AdmissionGate (admission/)
//!     │
//!     ├── REST Handlers (api/)
//!     ├── WS Handler (ws/)
//!     │
//!     ├── LiveService (service/)
//!     │     ├── MatchStore ── PostgreSQL | in-memory (persistence/)
//!     │     └── BroadcastHub ── publish worker (domain/)
//!     │
//!     └── ConnectionRegistry (domain/)
//! ```

pub mod admission;
pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod service;
pub mod ws;
