//! System endpoints: banner and health check.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use crate::admission::AdmissionStats;
use crate::app_state::AppState;
use crate::domain::HubStats;

/// Banner returned at `/`.
#[derive(Debug, Serialize, ToSchema)]
pub struct BannerResponse {
    message: &'static str,
}

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    status: &'static str,
    timestamp: String,
    version: &'static str,
    /// Connections currently receiving pushes.
    connections: usize,
    /// Fan-out counters.
    #[schema(value_type = Object)]
    broadcast: HubStats,
    /// Admission gate counters.
    #[schema(value_type = Object)]
    admission: AdmissionStats,
}

/// `GET /` — Service banner.
#[utoipa::path(
    get,
    path = "/",
    tag = "System",
    summary = "Service banner",
    responses(
        (status = 200, description = "Service is running", body = BannerResponse),
    )
)]
pub async fn root_handler() -> impl IntoResponse {
    Json(BannerResponse {
        message: "Sportzy API is running.",
    })
}

/// `GET /health` — Service health status.
#[utoipa::path(
    get,
    path = "/health",
    tag = "System",
    summary = "Health check",
    description = "Returns service health, version, live connection count and broadcast/admission counters.",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
    )
)]
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy",
            timestamp: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION"),
            connections: state.registry.active_count().await,
            broadcast: state.hub().stats(),
            admission: state.gate.stats(),
        }),
    )
}

/// System routes mounted at the root level.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
}
