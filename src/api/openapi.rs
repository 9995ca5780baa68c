//! OpenAPI document assembled from the handler annotations.

use utoipa::OpenApi;

use super::dto::{CreateCommentaryRequest, CreateMatchRequest};
use super::handlers::{commentary, matches, system};
use crate::domain::{CommentaryEntry, Match, MatchStatus};
use crate::error::ErrorResponse;

/// OpenAPI description of the REST surface.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "Sportzy Live API",
        description = "Matches, commentary and the live push channel at `/ws`."
    ),
    paths(
        system::root_handler,
        system::health_handler,
        matches::create_match,
        matches::list_matches,
        commentary::create_commentary,
        commentary::list_commentary,
    ),
    components(schemas(
        Match,
        MatchStatus,
        CommentaryEntry,
        CreateMatchRequest,
        CreateCommentaryRequest,
        ErrorResponse,
    )),
    tags(
        (name = "System", description = "Banner and health"),
        (name = "Matches", description = "Match creation and listing"),
        (name = "Commentary", description = "Per-match commentary feed"),
    )
)]
pub struct ApiDoc;
