//! Domain events pushed to live connections.
//!
//! A [`LiveEvent`] is produced by the service layer strictly after the
//! underlying row is committed and is serialized once into the wire
//! envelope `{ "type": ..., "payload": ... }` before fan-out.

use std::sync::Arc;

use serde::Serialize;

use super::subscription::Topic;
use super::{CommentaryEntry, Match};

/// Serialized push frame shared by every recipient of one event.
pub type Frame = Arc<str>;

/// Committed domain event, tagged with its wire `type`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum LiveEvent {
    /// A match row was committed.
    #[serde(rename = "match:created")]
    MatchCreated(Match),
    /// A commentary row was committed.
    #[serde(rename = "commentary:new")]
    CommentaryNew(CommentaryEntry),
}

impl LiveEvent {
    /// Topic whose subscribers receive this event.
    ///
    /// Match creation goes to the `all` feed; commentary goes to its match
    /// (which `all` subscribers also receive).
    #[must_use]
    pub fn topic(&self) -> Topic {
        match self {
            Self::MatchCreated(_) => Topic::All,
            Self::CommentaryNew(entry) => Topic::Match(entry.match_id),
        }
    }

    /// Wire `type` discriminator.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::MatchCreated(_) => "match:created",
            Self::CommentaryNew(_) => "commentary:new",
        }
    }

    /// Serializes the envelope into a shareable frame.
    ///
    /// # Errors
    ///
    /// Returns the underlying [`serde_json::Error`] if serialization fails.
    pub fn to_frame(&self) -> Result<Frame, serde_json::Error> {
        serde_json::to_string(self).map(Frame::from)
    }
}
