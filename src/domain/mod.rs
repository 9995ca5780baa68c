//! Domain layer: entities, push events, connection registry and hub.
//!
//! This module contains the server-side model of the live subsystem:
//! match and commentary entities, the wire envelope for pushed events,
//! per-connection subscriptions, the connection registry and the
//! broadcast hub that fans committed events out through it.

pub mod broadcast_hub;
pub mod connection_id;
pub mod connection_registry;
pub mod live_event;
pub mod match_id;
pub mod model;
pub mod subscription;

pub use broadcast_hub::{BroadcastHub, HubStats};
pub use connection_id::ConnectionId;
pub use connection_registry::{ConnectionHandle, ConnectionRegistry, ConnectionState, OutboundQueue};
pub use live_event::{Frame, LiveEvent};
pub use match_id::MatchId;
pub use model::{CommentaryEntry, Match, MatchStatus, NewCommentary, NewMatch};
pub use subscription::{SubscriptionSet, Topic};
