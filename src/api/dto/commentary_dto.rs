//! Commentary request DTOs.

use serde::Deserialize;
use utoipa::ToSchema;

use crate::domain::NewCommentary;

/// Request body for `POST /matches/{id}/commentary`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentaryRequest {
    /// Match minute (0..=200).
    #[serde(default)]
    pub minute: Option<i32>,
    /// Period label (e.g. `"1H"`).
    #[serde(default)]
    pub period: Option<String>,
    /// Event kind (e.g. `"goal"`).
    #[serde(default)]
    pub event_type: Option<String>,
    /// Player or official involved.
    #[serde(default)]
    pub actor: Option<String>,
    /// Team involved.
    #[serde(default)]
    pub team: Option<String>,
    /// Commentary text.
    pub message: String,
}

impl From<CreateCommentaryRequest> for NewCommentary {
    fn from(req: CreateCommentaryRequest) -> Self {
        Self {
            minute: req.minute,
            period: req.period,
            event_type: req.event_type,
            actor: req.actor,
            team: req.team,
            message: req.message.trim().to_string(),
        }
    }
}
