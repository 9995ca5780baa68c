//! Match handlers: create and list.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::{CreateMatchRequest, DataResponse, ListParams};
use crate::app_state::AppState;
use crate::domain::Match;
use crate::error::{ErrorResponse, GatewayError};

/// `POST /matches` — Create a match and announce it to live clients.
///
/// # Errors
///
/// Returns [`GatewayError`] on invalid input or storage failure.
#[utoipa::path(
    post,
    path = "/matches",
    tag = "Matches",
    summary = "Create a match",
    description = "Stores a match, derives its status from the schedule and pushes `match:created` to every client subscribed to `all`.",
    request_body = CreateMatchRequest,
    responses(
        (status = 201, description = "Match created", body = DataResponse<Match>),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 403, description = "Request refused by admission", body = ErrorResponse),
        (status = 429, description = "Rate limited", body = ErrorResponse),
    )
)]
pub async fn create_match(
    State(state): State<AppState>,
    Json(req): Json<CreateMatchRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let created = state.live_service.create_match(req.into()).await?;
    Ok((StatusCode::CREATED, Json(DataResponse::new(created))))
}

/// `GET /matches` — List recent matches, newest first.
///
/// # Errors
///
/// Returns [`GatewayError`] on storage failure.
#[utoipa::path(
    get,
    path = "/matches",
    tag = "Matches",
    summary = "List matches",
    params(ListParams),
    responses(
        (status = 200, description = "Recent matches", body = DataResponse<Vec<Match>>),
    )
)]
pub async fn list_matches(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, GatewayError> {
    let matches = state.live_service.list_matches(params.limit()).await?;
    Ok(Json(DataResponse::new(matches)))
}

/// Match routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/matches", get(list_matches).post(create_match))
}
