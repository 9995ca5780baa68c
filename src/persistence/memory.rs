//! In-process store used by tests and when no database is configured.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::MatchStore;
use crate::domain::{CommentaryEntry, Match, MatchId, MatchStatus, NewCommentary, NewMatch};
use crate::error::GatewayError;

#[derive(Debug, Default)]
struct Tables {
    matches: BTreeMap<MatchId, Match>,
    commentary: Vec<CommentaryEntry>,
    next_match_id: i64,
    next_commentary_id: i64,
}

/// [`MatchStore`] keeping everything in memory. Data is lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MatchStore for MemoryStore {
    async fn insert_match(
        &self,
        new: &NewMatch,
        status: MatchStatus,
    ) -> Result<Match, GatewayError> {
        let mut tables = self.tables.write().await;
        tables.next_match_id = tables.next_match_id.saturating_add(1);
        let stored = Match {
            id: MatchId::new(tables.next_match_id),
            sport: new.sport.clone(),
            home_team: new.home_team.clone(),
            away_team: new.away_team.clone(),
            status,
            start_time: new.start_time,
            end_time: new.end_time,
            home_score: new.home_score,
            away_score: new.away_score,
            created_at: Utc::now(),
        };
        tables.matches.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn get_match(&self, id: MatchId) -> Result<Option<Match>, GatewayError> {
        Ok(self.tables.read().await.matches.get(&id).cloned())
    }

    async fn list_matches(&self, limit: u32) -> Result<Vec<Match>, GatewayError> {
        let tables = self.tables.read().await;
        Ok(tables
            .matches
            .values()
            .rev()
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn insert_commentary(
        &self,
        match_id: MatchId,
        new: &NewCommentary,
    ) -> Result<CommentaryEntry, GatewayError> {
        let mut tables = self.tables.write().await;
        if !tables.matches.contains_key(&match_id) {
            return Err(GatewayError::MatchNotFound(match_id));
        }
        tables.next_commentary_id = tables.next_commentary_id.saturating_add(1);
        let entry = CommentaryEntry {
            id: tables.next_commentary_id,
            match_id,
            minute: new.minute,
            period: new.period.clone(),
            event_type: new.event_type.clone(),
            actor: new.actor.clone(),
            team: new.team.clone(),
            message: new.message.clone(),
            timestamp: Utc::now(),
        };
        tables.commentary.push(entry.clone());
        Ok(entry)
    }

    async fn list_commentary(
        &self,
        match_id: MatchId,
        limit: u32,
    ) -> Result<Vec<CommentaryEntry>, GatewayError> {
        let tables = self.tables.read().await;
        Ok(tables
            .commentary
            .iter()
            .rev()
            .filter(|c| c.match_id == match_id)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}
