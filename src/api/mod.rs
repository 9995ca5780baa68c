//! REST API layer: route handlers, DTOs, and router composition.
//!
//! Every REST route runs behind the request-path admission middleware;
//! the push-channel handshake at `/ws` is admitted separately by its own
//! rule-set and is not wrapped here.

pub mod dto;
pub mod handlers;
pub mod openapi;

use axum::Router;
use axum::middleware::from_fn_with_state;
use axum::routing::get;

use crate::admission::admission_layer;
use crate::app_state::AppState;
use crate::ws::handler::ws_handler;

/// Builds the complete router: REST endpoints behind admission, `/ws`,
/// and (with the `swagger-ui` feature) the API explorer.
pub fn build_router(state: AppState) -> Router {
    let rest = handlers::routes().layer(from_fn_with_state(state.clone(), admission_layer));

    let router = Router::new().merge(rest).route("/ws", get(ws_handler));

    #[cfg(feature = "swagger-ui")]
    let router = {
        use utoipa::OpenApi;
        router.merge(
            utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
                .url("/api-docs/openapi.json", openapi::ApiDoc::openapi()),
        )
    };

    router.with_state(state)
}
