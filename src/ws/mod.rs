//! WebSocket layer: handshake admission, connection loop, control messages.
//!
//! The endpoint at `/ws` is shared by all matches; subscriptions are scoped
//! after connect through `subscribe`/`unsubscribe` control messages.

pub mod connection;
pub mod handler;
pub mod messages;
