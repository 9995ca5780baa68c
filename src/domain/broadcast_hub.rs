//! Fan-out of committed domain events to live connections.
//!
//! [`BroadcastHub`] is the boundary between the persistence-commit path
//! and the push channel. Publishing serializes the event once, stamps it
//! from the registry's event clock and places it on a bounded FIFO queue.
//! A single worker task drains that queue and hands each frame to the
//! [`ConnectionRegistry`], so events leave in exactly the order they were
//! enqueued. Delivery is at-most-once with no replay.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::connection_registry::ConnectionRegistry;
use super::live_event::{Frame, LiveEvent};
use super::subscription::Topic;
use super::{CommentaryEntry, Match, MatchId};
use crate::error::GatewayError;

/// An event waiting for the publish worker.
#[derive(Debug)]
struct Published {
    seq: u64,
    topic: Topic,
    kind: &'static str,
    frame: Frame,
}

/// Running totals exposed on the health endpoint.
#[derive(Debug, Default)]
struct HubCounters {
    published: AtomicU64,
    delivered: AtomicU64,
    evicted: AtomicU64,
}

/// Point-in-time copy of the hub counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HubStats {
    /// Events accepted for publication.
    pub published: u64,
    /// Frames enqueued on connections.
    pub delivered: u64,
    /// Connections evicted during fan-out.
    pub evicted: u64,
}

/// Publishing side of the broadcast pipeline. Cheap to clone.
#[derive(Debug, Clone)]
pub struct BroadcastHub {
    queue: mpsc::Sender<Published>,
    registry: Arc<ConnectionRegistry>,
    counters: Arc<HubCounters>,
}

impl BroadcastHub {
    /// Creates the hub and spawns its publish worker.
    ///
    /// The worker exits once every `BroadcastHub` clone is dropped and the
    /// queue is drained; await the returned handle to wait for that.
    #[must_use]
    pub fn spawn(registry: Arc<ConnectionRegistry>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (queue, rx) = mpsc::channel(capacity.max(1));
        let counters = Arc::new(HubCounters::default());
        let worker = tokio::spawn(run_worker(
            rx,
            Arc::clone(&registry),
            Arc::clone(&counters),
        ));
        (
            Self {
                queue,
                registry,
                counters,
            },
            worker,
        )
    }

    /// Publishes `match:created` to every `all` subscriber.
    ///
    /// Must be called only after the match row is durably committed.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ShuttingDown`] if the worker has stopped and
    /// [`GatewayError::Internal`] if the event cannot be serialized.
    pub async fn publish_match_created(&self, created: &Match) -> Result<(), GatewayError> {
        self.publish(LiveEvent::MatchCreated(created.clone())).await
    }

    /// Publishes `commentary:new` to subscribers of `match_id` and of `all`.
    ///
    /// Must be called only after the commentary row is durably committed.
    /// Calls for the same match must be made in commit order.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] if `entry` belongs to a different
    /// match or cannot be serialized, and [`GatewayError::ShuttingDown`] if
    /// the worker has stopped.
    pub async fn publish_commentary(
        &self,
        match_id: MatchId,
        entry: &CommentaryEntry,
    ) -> Result<(), GatewayError> {
        if entry.match_id != match_id {
            return Err(GatewayError::Internal(format!(
                "commentary {} belongs to match {}, not {match_id}",
                entry.id, entry.match_id
            )));
        }
        self.publish(LiveEvent::CommentaryNew(entry.clone())).await
    }

    async fn publish(&self, event: LiveEvent) -> Result<(), GatewayError> {
        let frame = event
            .to_frame()
            .map_err(|e| GatewayError::Internal(format!("serialize {}: {e}", event.kind())))?;
        let published = Published {
            seq: self.registry.next_event_seq(),
            topic: event.topic(),
            kind: event.kind(),
            frame,
        };
        self.queue
            .send(published)
            .await
            .map_err(|_| GatewayError::ShuttingDown)?;
        self.counters.published.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Returns a snapshot of the fan-out counters.
    #[must_use]
    pub fn stats(&self) -> HubStats {
        HubStats {
            published: self.counters.published.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            evicted: self.counters.evicted.load(Ordering::Relaxed),
        }
    }
}

/// Drains the publish queue in FIFO order until every sender is gone.
async fn run_worker(
    mut rx: mpsc::Receiver<Published>,
    registry: Arc<ConnectionRegistry>,
    counters: Arc<HubCounters>,
) {
    while let Some(event) = rx.recv().await {
        let report = registry.deliver(event.topic, event.seq, &event.frame).await;
        counters
            .delivered
            .fetch_add(report.delivered as u64, Ordering::Relaxed);
        counters
            .evicted
            .fetch_add(report.evicted as u64, Ordering::Relaxed);
        tracing::debug!(
            seq = event.seq,
            kind = event.kind,
            topic = %event.topic,
            delivered = report.delivered,
            evicted = report.evicted,
            "event fanned out"
        );
    }
    tracing::info!("publish worker stopped");
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;

    use super::*;
    use crate::domain::MatchStatus;
    use crate::domain::connection_registry::{ConnectionHandle, OutboundQueue};

    fn sample_match(id: i64) -> Match {
        let now = Utc::now();
        Match {
            id: MatchId::new(id),
            sport: "football".to_string(),
            home_team: "Home".to_string(),
            away_team: "Away".to_string(),
            status: MatchStatus::Live,
            start_time: now,
            end_time: None,
            home_score: 0,
            away_score: 0,
            created_at: now,
        }
    }

    fn entry(id: i64, match_id: i64) -> CommentaryEntry {
        CommentaryEntry {
            id,
            match_id: MatchId::new(match_id),
            minute: None,
            period: None,
            event_type: None,
            actor: None,
            team: None,
            message: format!("entry {id}"),
            timestamp: Utc::now(),
        }
    }

    async fn subscriber(
        registry: &ConnectionRegistry,
        topic: Topic,
    ) -> (ConnectionHandle, OutboundQueue) {
        let Ok((handle, rx)) = registry.register().await else {
            panic!("registration failed");
        };
        assert!(registry.activate(&handle).await);
        assert!(registry.subscribe(&handle, topic).await);
        (handle, rx)
    }

    async fn next_json(rx: &mut OutboundQueue) -> serde_json::Value {
        let frame = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await;
        let Ok(Some(frame)) = frame else {
            panic!("no frame delivered");
        };
        serde_json::from_str(&frame).unwrap_or_default()
    }

    /// Waits until the worker has processed everything published so far.
    async fn settle(hub: &BroadcastHub, registry: &ConnectionRegistry) {
        let (probe, mut rx) = subscriber(registry, Topic::All).await;
        let Ok(()) = hub.publish_match_created(&sample_match(-1)).await else {
            panic!("probe publish failed");
        };
        let _ = next_json(&mut rx).await;
        registry.deregister(&probe).await;
    }

    #[tokio::test]
    async fn match_created_goes_to_all_subscribers_only() {
        let registry = Arc::new(ConnectionRegistry::new(16));
        let (hub, _worker) = BroadcastHub::spawn(Arc::clone(&registry), 16);
        let (_all, mut rx_all) = subscriber(&registry, Topic::All).await;
        let (_one, mut rx_one) = subscriber(&registry, Topic::Match(MatchId::new(1))).await;

        let Ok(()) = hub.publish_match_created(&sample_match(1)).await else {
            panic!("publish failed");
        };
        let value = next_json(&mut rx_all).await;
        assert_eq!(value["type"], "match:created");
        assert_eq!(value["payload"]["id"], 1);

        settle(&hub, &registry).await;
        assert!(rx_one.try_recv().is_err());
    }

    #[tokio::test]
    async fn commentary_is_scoped_to_its_match() {
        let registry = Arc::new(ConnectionRegistry::new(16));
        let (hub, _worker) = BroadcastHub::spawn(Arc::clone(&registry), 16);
        let (_a, mut rx_a) = subscriber(&registry, Topic::Match(MatchId::new(1))).await;
        let (_b, mut rx_b) = subscriber(&registry, Topic::Match(MatchId::new(2))).await;
        let (_all, mut rx_all) = subscriber(&registry, Topic::All).await;

        let Ok(()) = hub.publish_commentary(MatchId::new(2), &entry(10, 2)).await else {
            panic!("publish failed");
        };

        let value = next_json(&mut rx_b).await;
        assert_eq!(value["type"], "commentary:new");
        assert_eq!(value["payload"]["matchId"], 2);
        assert_eq!(next_json(&mut rx_all).await["payload"]["id"], 10);

        settle(&hub, &registry).await;
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn per_match_order_is_identical_for_all_observers() {
        let registry = Arc::new(ConnectionRegistry::new(64));
        let (hub, _worker) = BroadcastHub::spawn(Arc::clone(&registry), 64);
        let topic = Topic::Match(MatchId::new(7));
        let (_x, mut rx_x) = subscriber(&registry, topic).await;
        let (_y, mut rx_y) = subscriber(&registry, topic).await;

        for id in 1..=20 {
            let Ok(()) = hub.publish_commentary(MatchId::new(7), &entry(id, 7)).await else {
                panic!("publish failed");
            };
        }

        for id in 1..=20 {
            assert_eq!(next_json(&mut rx_x).await["payload"]["id"], id);
            assert_eq!(next_json(&mut rx_y).await["payload"]["id"], id);
        }
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_not_retained() {
        let registry = Arc::new(ConnectionRegistry::new(16));
        let (hub, _worker) = BroadcastHub::spawn(Arc::clone(&registry), 16);

        let Ok(()) = hub.publish_commentary(MatchId::new(42), &entry(1, 42)).await else {
            panic!("publish to empty registry must not fail");
        };
        settle(&hub, &registry).await;

        let (_late, mut rx) = subscriber(&registry, Topic::Match(MatchId::new(42))).await;
        settle(&hub, &registry).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(hub.stats().published, 3);
    }

    #[tokio::test]
    async fn mismatched_commentary_is_rejected() {
        let registry = Arc::new(ConnectionRegistry::new(16));
        let (hub, _worker) = BroadcastHub::spawn(Arc::clone(&registry), 16);
        let result = hub.publish_commentary(MatchId::new(1), &entry(1, 2)).await;
        assert!(matches!(result, Err(GatewayError::Internal(_))));
    }

    #[tokio::test]
    async fn worker_stops_when_hub_dropped() {
        let registry = Arc::new(ConnectionRegistry::new(16));
        let (hub, worker) = BroadcastHub::spawn(Arc::clone(&registry), 16);
        let Ok(()) = hub.publish_match_created(&sample_match(1)).await else {
            panic!("publish failed");
        };
        drop(hub);
        let joined = tokio::time::timeout(Duration::from_secs(1), worker).await;
        assert!(matches!(joined, Ok(Ok(()))));
    }
}
