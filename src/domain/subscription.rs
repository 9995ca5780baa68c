//! Per-connection subscription set.
//!
//! Tracks which matches a push connection follows and filters events
//! server-side. Owned by the [`super::ConnectionRegistry`]; never exposed
//! to the transport directly.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::MatchId;

/// A subscription target: one match, or the `all` feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawTopic", into = "RawTopic")]
pub enum Topic {
    /// Every published event, including `match:created`.
    All,
    /// Commentary for a single match.
    Match(MatchId),
}

/// Wire form of a [`Topic`]: a number, a numeric string, or `"all"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawTopic {
    Id(i64),
    Text(String),
}

impl TryFrom<RawTopic> for Topic {
    type Error = String;

    fn try_from(raw: RawTopic) -> Result<Self, Self::Error> {
        match raw {
            RawTopic::Id(id) => Ok(Self::Match(MatchId::new(id))),
            RawTopic::Text(text) => text.parse(),
        }
    }
}

impl From<Topic> for RawTopic {
    fn from(topic: Topic) -> Self {
        match topic {
            Topic::All => Self::Text("all".to_string()),
            Topic::Match(id) => Self::Id(id.get()),
        }
    }
}

impl std::str::FromStr for Topic {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") || s == "*" {
            return Ok(Self::All);
        }
        s.parse::<MatchId>()
            .map(Self::Match)
            .map_err(|_| format!("invalid matchId {s:?}"))
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Match(id) => write!(f, "{id}"),
        }
    }
}

/// The set of topics a single connection is subscribed to.
#[derive(Debug, Default, Clone)]
pub struct SubscriptionSet {
    /// Explicit match subscriptions. Ignored for matching while `all` is set.
    match_ids: HashSet<MatchId>,
    /// Whether the `all` feed is subscribed.
    all: bool,
}

impl SubscriptionSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a topic. Returns `true` if the set changed.
    pub fn subscribe(&mut self, topic: Topic) -> bool {
        match topic {
            Topic::All => !std::mem::replace(&mut self.all, true),
            Topic::Match(id) => self.match_ids.insert(id),
        }
    }

    /// Removes a topic. Returns `true` if the set changed.
    pub fn unsubscribe(&mut self, topic: Topic) -> bool {
        match topic {
            Topic::All => std::mem::replace(&mut self.all, false),
            Topic::Match(id) => self.match_ids.remove(&id),
        }
    }

    /// Returns `true` if an event published on `topic` should be delivered.
    ///
    /// The `all` feed receives everything; a match topic is received by
    /// connections following that match explicitly.
    #[must_use]
    pub fn matches(&self, topic: Topic) -> bool {
        match topic {
            _ if self.all => true,
            Topic::All => false,
            Topic::Match(id) => self.match_ids.contains(&id),
        }
    }

    /// Number of explicitly followed matches.
    #[must_use]
    pub fn count(&self) -> usize {
        self.match_ids.len()
    }

    /// Returns `true` if the `all` feed is subscribed.
    #[must_use]
    pub fn is_subscribed_all(&self) -> bool {
        self.all
    }

    /// Returns `true` if nothing is subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.all && self.match_ids.is_empty()
    }
}
