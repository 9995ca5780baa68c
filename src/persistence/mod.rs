//! Persistence layer: durable storage of matches and commentary.
//!
//! Provides the [`MatchStore`] trait used by the service layer and two
//! implementations: [`PostgresStore`] (`sqlx::PgPool`) for deployments and
//! [`MemoryStore`] for tests and database-less runs. A successful return
//! from an insert means the row is committed; only then may the caller
//! publish it.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::domain::{CommentaryEntry, Match, MatchId, MatchStatus, NewCommentary, NewMatch};
use crate::error::GatewayError;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

/// Create/read access to matches and commentary.
#[async_trait]
pub trait MatchStore: Send + Sync + std::fmt::Debug {
    /// Commits a new match and returns the stored row.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Persistence`] on storage failure.
    async fn insert_match(&self, new: &NewMatch, status: MatchStatus)
    -> Result<Match, GatewayError>;

    /// Loads one match.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Persistence`] on storage failure.
    async fn get_match(&self, id: MatchId) -> Result<Option<Match>, GatewayError>;

    /// Lists the most recently created matches, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Persistence`] on storage failure.
    async fn list_matches(&self, limit: u32) -> Result<Vec<Match>, GatewayError>;

    /// Commits a commentary entry for an existing match.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::MatchNotFound`] if the match does not exist
    /// and [`GatewayError::Persistence`] on storage failure.
    async fn insert_commentary(
        &self,
        match_id: MatchId,
        new: &NewCommentary,
    ) -> Result<CommentaryEntry, GatewayError>;

    /// Lists the most recent commentary of a match, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Persistence`] on storage failure.
    async fn list_commentary(
        &self,
        match_id: MatchId,
        limit: u32,
    ) -> Result<Vec<CommentaryEntry>, GatewayError>;

    /// Releases underlying resources. Called last during shutdown.
    async fn close(&self) {}
}
