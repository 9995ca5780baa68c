//! Live service: commits matches and commentary, then publishes them.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock};

use crate::domain::{BroadcastHub, CommentaryEntry, Match, MatchId, MatchStatus, NewCommentary, NewMatch};
use crate::error::GatewayError;
use crate::persistence::MatchStore;

/// Orchestration layer for match and commentary writes.
///
/// Every mutation follows the pattern: validate → commit → publish. The
/// hub is only told about rows the store has already committed.
///
/// Match creation holds the creation guard exclusively across commit and
/// `match:created` enqueue; commentary writes take it shared while checking
/// that their match exists. A match is therefore visible to commentary only
/// once its announcement is already queued. Commentary writes for one match
/// are serialized by a per-match lock held across commit and publish, so
/// the publish queue sees them in commit order.
#[derive(Debug)]
pub struct LiveService {
    store: Arc<dyn MatchStore>,
    hub: BroadcastHub,
    creation: RwLock<()>,
    match_locks: DashMap<MatchId, Arc<Mutex<()>>>,
}

impl LiveService {
    /// Creates a new `LiveService`.
    #[must_use]
    pub fn new(store: Arc<dyn MatchStore>, hub: BroadcastHub) -> Self {
        Self {
            store,
            hub,
            creation: RwLock::new(()),
            match_locks: DashMap::new(),
        }
    }

    /// Returns a reference to the inner [`BroadcastHub`].
    #[must_use]
    pub fn hub(&self) -> &BroadcastHub {
        &self.hub
    }

    /// Returns the backing store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn MatchStore> {
        &self.store
    }

    /// Creates a match and announces it to `all` subscribers.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] for invalid input and
    /// [`GatewayError::Persistence`] if the commit fails.
    pub async fn create_match(&self, new: NewMatch) -> Result<Match, GatewayError> {
        new.validate()?;
        let status = MatchStatus::at(new.start_time, new.end_time, Utc::now());

        let _creating = self.creation.write().await;
        let created = self.store.insert_match(&new, status).await?;

        tracing::info!(match_id = %created.id, status = status.as_str(), "match created");
        if let Err(e) = self.hub.publish_match_created(&created).await {
            tracing::warn!(match_id = %created.id, error = %e, "match:created not published");
        }
        Ok(created)
    }

    /// Adds a commentary entry and pushes it to the match's subscribers.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] for invalid input,
    /// [`GatewayError::MatchNotFound`] if the match does not exist and
    /// [`GatewayError::Persistence`] if the commit fails.
    pub async fn add_commentary(
        &self,
        match_id: MatchId,
        new: NewCommentary,
    ) -> Result<CommentaryEntry, GatewayError> {
        new.validate()?;
        {
            let _visible = self.creation.read().await;
            if self.store.get_match(match_id).await?.is_none() {
                return Err(GatewayError::MatchNotFound(match_id));
            }
        }

        let lock = self.lock_for(match_id);
        let result = {
            let _guard = lock.lock().await;
            self.commit_commentary(match_id, &new).await
        };
        drop(lock);
        self.release_lock(match_id);
        result
    }

    async fn commit_commentary(
        &self,
        match_id: MatchId,
        new: &NewCommentary,
    ) -> Result<CommentaryEntry, GatewayError> {
        let entry = self.store.insert_commentary(match_id, new).await?;
        tracing::debug!(%match_id, commentary_id = entry.id, "commentary committed");
        if let Err(e) = self.hub.publish_commentary(match_id, &entry).await {
            tracing::warn!(%match_id, commentary_id = entry.id, error = %e, "commentary:new not published");
        }
        Ok(entry)
    }

    /// Lists recent matches, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Persistence`] on storage failure.
    pub async fn list_matches(&self, limit: u32) -> Result<Vec<Match>, GatewayError> {
        self.store.list_matches(limit).await
    }

    /// Lists recent commentary of a match, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::MatchNotFound`] if the match does not exist
    /// and [`GatewayError::Persistence`] on storage failure.
    pub async fn list_commentary(
        &self,
        match_id: MatchId,
        limit: u32,
    ) -> Result<Vec<CommentaryEntry>, GatewayError> {
        if self.store.get_match(match_id).await?.is_none() {
            return Err(GatewayError::MatchNotFound(match_id));
        }
        self.store.list_commentary(match_id, limit).await
    }

    fn lock_for(&self, match_id: MatchId) -> Arc<Mutex<()>> {
        Arc::clone(
            self.match_locks
                .entry(match_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }

    /// Drops the match's lock entry once no writer holds or awaits it.
    fn release_lock(&self, match_id: MatchId) {
        self.match_locks
            .remove_if(&match_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use tokio::sync::Notify;

    use super::*;
    use crate::domain::{ConnectionRegistry, OutboundQueue, Topic};
    use crate::persistence::MemoryStore;

    /// Commits matches immediately but acknowledges them late.
    #[derive(Debug, Default)]
    struct LateAckStore {
        inner: MemoryStore,
        committed: Notify,
    }

    #[async_trait]
    impl MatchStore for LateAckStore {
        async fn insert_match(
            &self,
            new: &NewMatch,
            status: MatchStatus,
        ) -> Result<Match, GatewayError> {
            let created = self.inner.insert_match(new, status).await?;
            self.committed.notify_one();
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(created)
        }

        async fn get_match(&self, id: MatchId) -> Result<Option<Match>, GatewayError> {
            self.inner.get_match(id).await
        }

        async fn list_matches(&self, limit: u32) -> Result<Vec<Match>, GatewayError> {
            self.inner.list_matches(limit).await
        }

        async fn insert_commentary(
            &self,
            match_id: MatchId,
            new: &NewCommentary,
        ) -> Result<CommentaryEntry, GatewayError> {
            self.inner.insert_commentary(match_id, new).await
        }

        async fn list_commentary(
            &self,
            match_id: MatchId,
            limit: u32,
        ) -> Result<Vec<CommentaryEntry>, GatewayError> {
            self.inner.list_commentary(match_id, limit).await
        }
    }

    fn service() -> (Arc<LiveService>, Arc<ConnectionRegistry>) {
        let registry = Arc::new(ConnectionRegistry::new(256));
        let (hub, _worker) = BroadcastHub::spawn(Arc::clone(&registry), 256);
        let store: Arc<dyn MatchStore> = Arc::new(MemoryStore::new());
        (Arc::new(LiveService::new(store, hub)), registry)
    }

    fn new_match(start_offset_min: i64) -> NewMatch {
        NewMatch {
            sport: "football".to_string(),
            home_team: "Home".to_string(),
            away_team: "Away".to_string(),
            start_time: Utc::now() + ChronoDuration::minutes(start_offset_min),
            end_time: None,
            home_score: 0,
            away_score: 0,
        }
    }

    fn line(text: &str) -> NewCommentary {
        NewCommentary {
            message: text.to_string(),
            ..NewCommentary::default()
        }
    }

    async fn listen(registry: &ConnectionRegistry, topic: Topic) -> OutboundQueue {
        let Ok((handle, rx)) = registry.register().await else {
            panic!("registration failed");
        };
        assert!(registry.activate(&handle).await);
        assert!(registry.subscribe(&handle, topic).await);
        rx
    }

    async fn next_json(rx: &mut OutboundQueue) -> serde_json::Value {
        let Ok(Some(frame)) = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await else {
            panic!("no frame delivered");
        };
        serde_json::from_str(&frame).unwrap_or_default()
    }

    #[tokio::test]
    async fn create_match_derives_status_and_publishes() {
        let (service, registry) = service();
        let mut rx = listen(&registry, Topic::All).await;

        let created = tokio_test::assert_ok!(service.create_match(new_match(30)).await);
        assert_eq!(created.status, MatchStatus::Scheduled);

        let value = next_json(&mut rx).await;
        assert_eq!(value["type"], "match:created");
        assert_eq!(value["payload"]["id"], created.id.get());

        let live = tokio_test::assert_ok!(service.create_match(new_match(-5)).await);
        assert_eq!(live.status, MatchStatus::Live);
    }

    #[tokio::test]
    async fn invalid_match_is_neither_stored_nor_published() {
        let (service, _registry) = service();
        let mut bad = new_match(0);
        bad.home_team = String::new();
        let result = service.create_match(bad).await;
        assert!(matches!(result, Err(GatewayError::InvalidRequest(_))));

        let listed = tokio_test::assert_ok!(service.list_matches(10).await);
        assert!(listed.is_empty());
        assert_eq!(service.hub().stats().published, 0);
    }

    #[tokio::test]
    async fn commentary_for_unknown_match_is_not_found() {
        let (service, _registry) = service();
        let result = service.add_commentary(MatchId::new(404), line("hello")).await;
        assert!(matches!(result, Err(GatewayError::MatchNotFound(_))));
        assert_eq!(service.hub().stats().published, 0);

        let listed = service.list_commentary(MatchId::new(404), 10).await;
        assert!(matches!(listed, Err(GatewayError::MatchNotFound(_))));
    }

    #[tokio::test]
    async fn concurrent_commentary_reaches_observers_in_commit_order() {
        let (service, registry) = service();
        let created = tokio_test::assert_ok!(service.create_match(new_match(-1)).await);
        let topic = Topic::Match(created.id);
        let mut rx_x = listen(&registry, topic).await;
        let mut rx_y = listen(&registry, topic).await;

        let mut tasks = Vec::new();
        for n in 0..16 {
            let service = Arc::clone(&service);
            let match_id = created.id;
            tasks.push(tokio::spawn(async move {
                service.add_commentary(match_id, line(&format!("line {n}"))).await
            }));
        }
        for task in tasks {
            let Ok(Ok(_)) = task.await else {
                panic!("commentary write failed");
            };
        }

        let mut seen_x = Vec::new();
        let mut seen_y = Vec::new();
        for _ in 0..16 {
            seen_x.push(next_json(&mut rx_x).await["payload"]["id"].as_i64());
            seen_y.push(next_json(&mut rx_y).await["payload"]["id"].as_i64());
        }
        assert_eq!(seen_x, seen_y);

        let mut sorted = seen_x.clone();
        sorted.sort_unstable();
        assert_eq!(seen_x, sorted, "delivery must follow commit (id) order");
    }

    #[tokio::test]
    async fn commentary_never_overtakes_its_match_announcement() {
        let registry = Arc::new(ConnectionRegistry::new(16));
        let (hub, _worker) = BroadcastHub::spawn(Arc::clone(&registry), 16);
        let store = Arc::new(LateAckStore::default());
        let service = Arc::new(LiveService::new(
            Arc::clone(&store) as Arc<dyn MatchStore>,
            hub,
        ));
        let mut rx = listen(&registry, Topic::All).await;

        let creating = tokio::spawn({
            let service = Arc::clone(&service);
            async move { service.create_match(new_match(-1)).await }
        });
        store.committed.notified().await;

        let entry = tokio_test::assert_ok!(service.add_commentary(MatchId::new(1), line("kick-off")).await);
        let Ok(Ok(created)) = creating.await else {
            panic!("match creation failed");
        };
        assert_eq!(entry.match_id, created.id);

        let first = next_json(&mut rx).await;
        let second = next_json(&mut rx).await;
        assert_eq!(first["type"], "match:created");
        assert_eq!(first["payload"]["id"], 1);
        assert_eq!(second["type"], "commentary:new");
        assert_eq!(second["payload"]["matchId"], 1);
    }

    #[tokio::test]
    async fn match_locks_are_released_after_writes() {
        let (service, _registry) = service();
        let created = tokio_test::assert_ok!(service.create_match(new_match(-1)).await);
        for n in 0..3 {
            tokio_test::assert_ok!(service.add_commentary(created.id, line(&format!("line {n}"))).await);
        }
        assert!(service.match_locks.is_empty());

        let missing = service.add_commentary(MatchId::new(999), line("nobody")).await;
        assert!(matches!(missing, Err(GatewayError::MatchNotFound(_))));
        assert!(service.match_locks.is_empty());
    }
}
