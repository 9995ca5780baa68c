//! Commentary handlers: add and list entries of one match.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::{CreateCommentaryRequest, DataResponse, ListParams};
use crate::app_state::AppState;
use crate::domain::{CommentaryEntry, MatchId};
use crate::error::{ErrorResponse, GatewayError};

fn parse_match_id(raw: &str) -> Result<MatchId, GatewayError> {
    raw.parse()
        .map_err(|_| GatewayError::InvalidRequest(format!("invalid match id {raw:?}")))
}

/// `POST /matches/{id}/commentary` — Add a commentary entry.
///
/// # Errors
///
/// Returns [`GatewayError`] on invalid input, unknown match or storage
/// failure.
#[utoipa::path(
    post,
    path = "/matches/{id}/commentary",
    tag = "Commentary",
    summary = "Add commentary",
    description = "Stores a commentary entry and pushes `commentary:new` to clients subscribed to the match or to `all`.",
    params(("id" = i64, Path, description = "Match ID")),
    request_body = CreateCommentaryRequest,
    responses(
        (status = 201, description = "Entry created", body = DataResponse<CommentaryEntry>),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 404, description = "Match not found", body = ErrorResponse),
    )
)]
pub async fn create_commentary(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<CreateCommentaryRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let match_id = parse_match_id(&id)?;
    let entry = state
        .live_service
        .add_commentary(match_id, req.into())
        .await?;
    Ok((StatusCode::CREATED, Json(DataResponse::new(entry))))
}

/// `GET /matches/{id}/commentary` — List recent commentary, newest first.
///
/// # Errors
///
/// Returns [`GatewayError`] on unknown match or storage failure.
#[utoipa::path(
    get,
    path = "/matches/{id}/commentary",
    tag = "Commentary",
    summary = "List commentary",
    params(("id" = i64, Path, description = "Match ID"), ListParams),
    responses(
        (status = 200, description = "Recent commentary", body = DataResponse<Vec<CommentaryEntry>>),
        (status = 404, description = "Match not found", body = ErrorResponse),
    )
)]
pub async fn list_commentary(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, GatewayError> {
    let match_id = parse_match_id(&id)?;
    let entries = state
        .live_service
        .list_commentary(match_id, params.limit())
        .await?;
    Ok(Json(DataResponse::new(entries)))
}

/// Commentary routes.
pub fn routes() -> Router<AppState> {
    Router::new().route(
        "/matches/{id}/commentary",
        get(list_commentary).post(create_commentary),
    )
}
