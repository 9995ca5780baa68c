//! Push-channel control messages and server replies.
//!
//! Domain events travel as pre-serialized [`crate::domain::Frame`]s; the
//! types here cover only the per-connection conversation.

use serde::{Deserialize, Serialize};

use crate::domain::Topic;

/// Control messages a client can send.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start receiving events for a match, or `"all"`.
    Subscribe {
        /// Target topic.
        #[serde(rename = "matchId")]
        match_id: Topic,
    },
    /// Stop receiving events for a match, or `"all"`.
    Unsubscribe {
        /// Target topic.
        #[serde(rename = "matchId")]
        match_id: Topic,
    },
}

/// Replies the server sends outside the event stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerReply {
    /// Sent once after the connection is admitted.
    Welcome {
        /// Connection identifier.
        #[serde(rename = "connectionId")]
        connection_id: String,
    },
    /// Acknowledges a subscribe.
    Subscribed {
        /// Subscribed topic.
        #[serde(rename = "matchId")]
        match_id: Topic,
    },
    /// Acknowledges an unsubscribe.
    Unsubscribed {
        /// Removed topic.
        #[serde(rename = "matchId")]
        match_id: Topic,
    },
    /// Rejects a malformed control message.
    Error {
        /// Human-readable reason.
        message: String,
    },
}

impl ServerReply {
    /// Serializes the reply into a text frame, or `None` if it cannot be
    /// encoded.
    #[must_use]
    pub fn to_text(&self) -> Option<String> {
        encode(self)
    }
}

/// Encodes a reply body; failures are logged and yield `None`.
fn encode<T: Serialize>(value: &T) -> Option<String> {
    serde_json::to_string(value)
        .map_err(|e| tracing::error!(error = %e, "failed to serialize ws reply"))
        .ok()
}
