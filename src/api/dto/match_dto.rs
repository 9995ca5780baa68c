//! Match request DTOs.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::domain::NewMatch;

/// Request body for `POST /matches`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateMatchRequest {
    /// Sport name (e.g. `"football"`).
    pub sport: String,
    /// Home team name.
    pub home_team: String,
    /// Away team name.
    pub away_team: String,
    /// Scheduled kick-off (RFC 3339).
    pub start_time: DateTime<Utc>,
    /// Optional end time (RFC 3339), after `startTime`.
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    /// Initial home score. Defaults to 0.
    #[serde(default)]
    pub home_score: i32,
    /// Initial away score. Defaults to 0.
    #[serde(default)]
    pub away_score: i32,
}

impl From<CreateMatchRequest> for NewMatch {
    fn from(req: CreateMatchRequest) -> Self {
        Self {
            sport: req.sport.trim().to_string(),
            home_team: req.home_team.trim().to_string(),
            away_team: req.away_team.trim().to_string(),
            start_time: req.start_time,
            end_time: req.end_time,
            home_score: req.home_score,
            away_score: req.away_score,
        }
    }
}
