//! Match and commentary entities.
//!
//! These are owned by the persistence layer; the broadcast core only sees
//! them as payloads of committed domain events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::MatchId;
use crate::error::GatewayError;

/// Maximum accepted length of a commentary message.
pub const MAX_COMMENTARY_LEN: usize = 2_000;

/// Lifecycle status of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    /// Start time is in the future.
    Scheduled,
    /// Started and not yet ended.
    Live,
    /// End time has passed.
    Ended,
}

impl MatchStatus {
    /// Derives the status of a match from its schedule at instant `now`.
    #[must_use]
    pub fn at(start_time: DateTime<Utc>, end_time: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        if now < start_time {
            return Self::Scheduled;
        }
        match end_time {
            Some(end) if now >= end => Self::Ended,
            _ => Self::Live,
        }
    }

    /// Stable string form used in the database column.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Live => "live",
            Self::Ended => "ended",
        }
    }

    /// Parses the database column value.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Persistence`] for an unknown status string.
    pub fn parse(s: &str) -> Result<Self, GatewayError> {
        match s {
            "scheduled" => Ok(Self::Scheduled),
            "live" => Ok(Self::Live),
            "ended" => Ok(Self::Ended),
            other => Err(GatewayError::Persistence(format!(
                "unknown match status {other:?}"
            ))),
        }
    }
}

/// A committed match row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    /// Database identifier.
    pub id: MatchId,
    /// Sport name (e.g. `"football"`).
    pub sport: String,
    /// Home team name.
    pub home_team: String,
    /// Away team name.
    pub away_team: String,
    /// Lifecycle status at commit time.
    pub status: MatchStatus,
    /// Scheduled kick-off.
    pub start_time: DateTime<Utc>,
    /// Scheduled or actual end, if known.
    pub end_time: Option<DateTime<Utc>>,
    /// Home score.
    pub home_score: i32,
    /// Away score.
    pub away_score: i32,
    /// Commit timestamp.
    pub created_at: DateTime<Utc>,
}

/// A committed commentary row, always scoped to exactly one match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommentaryEntry {
    /// Database identifier.
    pub id: i64,
    /// Owning match.
    pub match_id: MatchId,
    /// Match minute, if the entry is tied to game time.
    pub minute: Option<i32>,
    /// Period label (e.g. `"1H"`, `"Q3"`).
    pub period: Option<String>,
    /// Event kind (e.g. `"goal"`, `"foul"`).
    pub event_type: Option<String>,
    /// Player or official involved.
    pub actor: Option<String>,
    /// Team involved.
    pub team: Option<String>,
    /// Commentary text.
    pub message: String,
    /// Commit timestamp.
    pub timestamp: DateTime<Utc>,
}

/// Validated input for creating a match.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMatch {
    /// Sport name.
    pub sport: String,
    /// Home team.
    pub home_team: String,
    /// Away team.
    pub away_team: String,
    /// Scheduled kick-off.
    pub start_time: DateTime<Utc>,
    /// Optional end time.
    pub end_time: Option<DateTime<Utc>>,
    /// Initial home score.
    pub home_score: i32,
    /// Initial away score.
    pub away_score: i32,
}

impl NewMatch {
    /// Checks field-level constraints.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] describing the first
    /// violated constraint.
    pub fn validate(&self) -> Result<(), GatewayError> {
        for (field, value) in [
            ("sport", &self.sport),
            ("homeTeam", &self.home_team),
            ("awayTeam", &self.away_team),
        ] {
            if value.trim().is_empty() {
                return Err(GatewayError::InvalidRequest(format!("{field} must not be empty")));
            }
        }
        if let Some(end) = self.end_time
            && end <= self.start_time
        {
            return Err(GatewayError::InvalidRequest(
                "endTime must be after startTime".to_string(),
            ));
        }
        if self.home_score < 0 || self.away_score < 0 {
            return Err(GatewayError::InvalidRequest(
                "scores must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Validated input for adding a commentary entry.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewCommentary {
    /// Match minute.
    pub minute: Option<i32>,
    /// Period label.
    pub period: Option<String>,
    /// Event kind.
    pub event_type: Option<String>,
    /// Player or official involved.
    pub actor: Option<String>,
    /// Team involved.
    pub team: Option<String>,
    /// Commentary text.
    pub message: String,
}

impl NewCommentary {
    /// Checks field-level constraints.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] describing the first
    /// violated constraint.
    pub fn validate(&self) -> Result<(), GatewayError> {
        let text = self.message.trim();
        if text.is_empty() {
            return Err(GatewayError::InvalidRequest(
                "message must not be empty".to_string(),
            ));
        }
        if text.chars().count() > MAX_COMMENTARY_LEN {
            return Err(GatewayError::InvalidRequest(format!(
                "message exceeds {MAX_COMMENTARY_LEN} characters"
            )));
        }
        if let Some(minute) = self.minute
            && !(0..=200).contains(&minute)
        {
            return Err(GatewayError::InvalidRequest(
                "minute must be between 0 and 200".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn new_match() -> NewMatch {
        NewMatch {
            sport: "football".to_string(),
            home_team: "Arsenal".to_string(),
            away_team: "Chelsea".to_string(),
            start_time: Utc::now(),
            end_time: None,
            home_score: 0,
            away_score: 0,
        }
    }

    #[test]
    fn status_follows_schedule() {
        let now = Utc::now();
        let start = now + Duration::minutes(10);
        assert_eq!(MatchStatus::at(start, None, now), MatchStatus::Scheduled);

        let start = now - Duration::minutes(10);
        assert_eq!(MatchStatus::at(start, None, now), MatchStatus::Live);
        assert_eq!(
            MatchStatus::at(start, Some(now + Duration::minutes(80)), now),
            MatchStatus::Live
        );
        assert_eq!(MatchStatus::at(start, Some(now), now), MatchStatus::Ended);
    }

    #[test]
    fn status_round_trips_through_column_value() {
        for status in [MatchStatus::Scheduled, MatchStatus::Live, MatchStatus::Ended] {
            assert_eq!(MatchStatus::parse(status.as_str()).ok(), Some(status));
        }
        assert!(MatchStatus::parse("paused").is_err());
    }

    #[test]
    fn match_validation_rejects_blank_team() {
        let mut m = new_match();
        assert!(m.validate().is_ok());
        m.away_team = "  ".to_string();
        assert!(m.validate().is_err());
    }

    #[test]
    fn match_validation_rejects_inverted_schedule() {
        let mut m = new_match();
        m.end_time = Some(m.start_time - Duration::minutes(1));
        assert!(m.validate().is_err());
    }

    #[test]
    fn commentary_validation() {
        let mut c = NewCommentary {
            message: "Kick-off!".to_string(),
            minute: Some(0),
            ..NewCommentary::default()
        };
        assert!(c.validate().is_ok());
        c.minute = Some(-3);
        assert!(c.validate().is_err());
        c.minute = None;
        c.message = " ".to_string();
        assert!(c.validate().is_err());
    }

    #[test]
    fn match_serializes_camel_case() {
        let now = Utc::now();
        let m = Match {
            id: MatchId::new(5),
            sport: "football".to_string(),
            home_team: "A".to_string(),
            away_team: "B".to_string(),
            status: MatchStatus::Live,
            start_time: now,
            end_time: None,
            home_score: 1,
            away_score: 0,
            created_at: now,
        };
        let json = serde_json::to_value(&m).unwrap_or_default();
        assert_eq!(json["homeTeam"], "A");
        assert_eq!(json["status"], "live");
        assert_eq!(json["id"], 5);
    }
}
