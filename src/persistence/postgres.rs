//! PostgreSQL implementation of the persistence layer.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use super::MatchStore;
use crate::config::DatabaseSettings;
use crate::domain::{CommentaryEntry, Match, MatchId, MatchStatus, NewCommentary, NewMatch};
use crate::error::GatewayError;

/// Postgres error code for a foreign-key violation.
const FOREIGN_KEY_VIOLATION: &str = "23503";

type MatchRow = (
    i64,
    String,
    String,
    String,
    String,
    DateTime<Utc>,
    Option<DateTime<Utc>>,
    i32,
    i32,
    DateTime<Utc>,
);

type CommentaryRow = (
    i64,
    i64,
    Option<i32>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    String,
    DateTime<Utc>,
);

const MATCH_COLUMNS: &str =
    "id, sport, home_team, away_team, status, start_time, end_time, home_score, away_score, created_at";

const COMMENTARY_COLUMNS: &str =
    "id, match_id, minute, period, event_type, actor, team, message, created_at";

fn db_err(e: sqlx::Error) -> GatewayError {
    GatewayError::Persistence(e.to_string())
}

fn match_from_row(row: MatchRow) -> Result<Match, GatewayError> {
    let (id, sport, home_team, away_team, status, start_time, end_time, home_score, away_score, created_at) =
        row;
    Ok(Match {
        id: MatchId::new(id),
        sport,
        home_team,
        away_team,
        status: MatchStatus::parse(&status)?,
        start_time,
        end_time,
        home_score,
        away_score,
        created_at,
    })
}

fn commentary_from_row(row: CommentaryRow) -> CommentaryEntry {
    let (id, match_id, minute, period, event_type, actor, team, message, timestamp) = row;
    CommentaryEntry {
        id,
        match_id: MatchId::new(match_id),
        minute,
        period,
        event_type,
        actor,
        team,
        message,
        timestamp,
    }
}

/// PostgreSQL-backed store using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a store over an existing connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects and applies pending migrations from `migrations/`.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError::Persistence`] if the database is
    /// unreachable or a migration fails.
    pub async fn connect(settings: &DatabaseSettings) -> Result<Self, GatewayError> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(Duration::from_secs(settings.connect_timeout_secs))
            .connect(&settings.url)
            .await
            .map_err(db_err)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| GatewayError::Persistence(format!("migration failed: {e}")))?;

        tracing::info!(max_connections = settings.max_connections, "postgres store ready");
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl MatchStore for PostgresStore {
    async fn insert_match(
        &self,
        new: &NewMatch,
        status: MatchStatus,
    ) -> Result<Match, GatewayError> {
        let row = sqlx::query_as::<_, MatchRow>(&format!(
            "INSERT INTO matches (sport, home_team, away_team, status, start_time, end_time, home_score, away_score) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {MATCH_COLUMNS}"
        ))
        .bind(&new.sport)
        .bind(&new.home_team)
        .bind(&new.away_team)
        .bind(status.as_str())
        .bind(new.start_time)
        .bind(new.end_time)
        .bind(new.home_score)
        .bind(new.away_score)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        match_from_row(row)
    }

    async fn get_match(&self, id: MatchId) -> Result<Option<Match>, GatewayError> {
        let row = sqlx::query_as::<_, MatchRow>(&format!(
            "SELECT {MATCH_COLUMNS} FROM matches WHERE id = $1"
        ))
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(match_from_row).transpose()
    }

    async fn list_matches(&self, limit: u32) -> Result<Vec<Match>, GatewayError> {
        let rows = sqlx::query_as::<_, MatchRow>(&format!(
            "SELECT {MATCH_COLUMNS} FROM matches ORDER BY created_at DESC, id DESC LIMIT $1"
        ))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(match_from_row).collect()
    }

    async fn insert_commentary(
        &self,
        match_id: MatchId,
        new: &NewCommentary,
    ) -> Result<CommentaryEntry, GatewayError> {
        let row = sqlx::query_as::<_, CommentaryRow>(&format!(
            "INSERT INTO commentary (match_id, minute, period, event_type, actor, team, message) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {COMMENTARY_COLUMNS}"
        ))
        .bind(match_id.get())
        .bind(new.minute)
        .bind(&new.period)
        .bind(&new.event_type)
        .bind(&new.actor)
        .bind(&new.team)
        .bind(&new.message)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            let fk_violation = e
                .as_database_error()
                .and_then(|d| d.code())
                .is_some_and(|code| code == FOREIGN_KEY_VIOLATION);
            if fk_violation {
                GatewayError::MatchNotFound(match_id)
            } else {
                db_err(e)
            }
        })?;

        Ok(commentary_from_row(row))
    }

    async fn list_commentary(
        &self,
        match_id: MatchId,
        limit: u32,
    ) -> Result<Vec<CommentaryEntry>, GatewayError> {
        let rows = sqlx::query_as::<_, CommentaryRow>(&format!(
            "SELECT {COMMENTARY_COLUMNS} FROM commentary WHERE match_id = $1 \
             ORDER BY created_at DESC, id DESC LIMIT $2"
        ))
        .bind(match_id.get())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows.into_iter().map(commentary_from_row).collect())
    }

    async fn close(&self) {
        self.pool.close().await;
        tracing::info!("postgres pool closed");
    }
}
