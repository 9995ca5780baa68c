//! Type-safe match identifier.
//!
//! [`MatchId`] wraps the database-assigned `BIGSERIAL` key of a match so it
//! cannot be confused with commentary row IDs or connection identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Identifier of a sports match.
///
/// Assigned by the persistence layer when the match row is committed and
/// immutable thereafter. Used as the subscription target on the push
/// channel and as the ordering key for commentary publication.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
pub struct MatchId(i64);

impl MatchId {
    /// Creates a `MatchId` from a raw database key.
    #[must_use]
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// Returns the raw database key.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MatchId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<i64>().map(Self)
    }
}

impl From<i64> for MatchId {
    fn from(raw: i64) -> Self {
        Self(raw)
    }
}

impl From<MatchId> for i64 {
    fn from(id: MatchId) -> Self {
        id.0
    }
}
