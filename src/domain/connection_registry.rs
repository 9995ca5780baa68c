//! Registry of live push connections and their subscriptions.
//!
//! [`ConnectionRegistry`] is the only owner of connection lifecycle state.
//! All slots live in one `HashMap` behind a single [`tokio::sync::RwLock`]:
//! fan-out takes the read lock, lifecycle and subscription changes take the
//! write lock, and every individual operation is atomic.
//!
//! Each connection gets a bounded outbound queue. The registry keeps the
//! sending half; the transport task drains the receiving half into the
//! socket. Enqueueing never waits: a full queue marks the connection as a
//! slow consumer and it is evicted (its queued frames are dropped).

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{RwLock, mpsc};
use tokio::time::Instant;

use super::live_event::Frame;
use super::subscription::{SubscriptionSet, Topic};
use super::ConnectionId;
use crate::error::{GatewayError, TransportError};

/// Lifecycle state of a push connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// Registered, handshake admission not yet passed. Receives nothing.
    Connecting = 0,
    /// Admitted; receives events matching its subscriptions.
    Active = 1,
    /// Being torn down; receives nothing further.
    Closing = 2,
    /// Removed from the registry.
    Closed = 3,
}

impl ConnectionState {
    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Connecting,
            1 => Self::Active,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// State shared between the registry and the transport task.
///
/// Only the registry writes it; the transport reads it to stop writing
/// frames as soon as the connection leaves `Active`.
#[derive(Debug)]
struct SharedState(AtomicU8);

impl SharedState {
    fn load(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn store(&self, state: ConnectionState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

/// Handle given to the transport layer for one registered connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    state: Arc<SharedState>,
}

impl ConnectionHandle {
    /// Connection identifier.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Current lifecycle state as last set by the registry.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state.load()
    }

    /// Returns `true` while the connection may receive frames.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state() == ConnectionState::Active
    }
}

/// Receiving half of a connection's bounded outbound queue.
pub type OutboundQueue = mpsc::Receiver<Frame>;

/// One registered connection.
#[derive(Debug)]
struct Slot {
    state: Arc<SharedState>,
    outbound: mpsc::Sender<Frame>,
    subscriptions: SubscriptionSet,
    /// Event clock value at registration; events stamped at or below it
    /// were published before this connection existed.
    joined_at: u64,
    last_activity: Instant,
}

impl Slot {
    fn set_state(&self, state: ConnectionState) {
        self.state.store(state);
    }
}

/// Read-only view of an active subscriber handed to fan-out callbacks.
#[derive(Debug)]
pub struct Subscriber<'a> {
    id: ConnectionId,
    outbound: &'a mpsc::Sender<Frame>,
}

impl Subscriber<'_> {
    /// Connection identifier.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Enqueues a frame without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::QueueFull`] if the consumer is too slow and
    /// [`TransportError::Closed`] if the transport dropped its queue.
    pub fn try_enqueue(&self, frame: &Frame) -> Result<(), TransportError> {
        self.outbound
            .try_send(Arc::clone(frame))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => TransportError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => TransportError::Closed,
            })
    }
}

/// Outcome of delivering one event.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Connections the frame was enqueued on.
    pub delivered: usize,
    /// Connections evicted because enqueueing failed.
    pub evicted: usize,
}

#[derive(Debug)]
struct Inner {
    accepting: bool,
    slots: HashMap<ConnectionId, Slot>,
}

/// Authoritative tracker of live push connections.
#[derive(Debug)]
pub struct ConnectionRegistry {
    inner: RwLock<Inner>,
    event_clock: AtomicU64,
    queue_capacity: usize,
}

impl ConnectionRegistry {
    /// Creates an empty registry whose connections get outbound queues of
    /// `queue_capacity` frames.
    #[must_use]
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            inner: RwLock::new(Inner {
                accepting: true,
                slots: HashMap::new(),
            }),
            event_clock: AtomicU64::new(0),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Allocates a connection in `Connecting` state.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ShuttingDown`] once [`Self::close`] ran.
    pub async fn register(&self) -> Result<(ConnectionHandle, OutboundQueue), GatewayError> {
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let id = ConnectionId::new();
        let state = Arc::new(SharedState(AtomicU8::new(ConnectionState::Connecting as u8)));

        let mut inner = self.inner.write().await;
        if !inner.accepting {
            return Err(GatewayError::ShuttingDown);
        }
        let joined_at = self.event_clock.load(Ordering::Acquire);
        inner.slots.insert(
            id,
            Slot {
                state: Arc::clone(&state),
                outbound: tx,
                subscriptions: SubscriptionSet::new(),
                joined_at,
                last_activity: Instant::now(),
            },
        );
        drop(inner);

        tracing::debug!(connection_id = %id, "connection registered");
        Ok((ConnectionHandle { id, state }, rx))
    }

    /// Transitions `Connecting` → `Active`.
    ///
    /// Returns `false` if the connection is unknown or not `Connecting`.
    pub async fn activate(&self, handle: &ConnectionHandle) -> bool {
        let mut inner = self.inner.write().await;
        if !inner.accepting {
            return false;
        }
        let Some(slot) = inner.slots.get_mut(&handle.id) else {
            return false;
        };
        if slot.state.load() != ConnectionState::Connecting {
            return false;
        }
        slot.set_state(ConnectionState::Active);
        slot.last_activity = Instant::now();
        tracing::debug!(connection_id = %handle.id, "connection activated");
        true
    }

    /// Adds `topic` to an `Active` connection's subscriptions.
    ///
    /// No-op (returns `false`) for any other state.
    pub async fn subscribe(&self, handle: &ConnectionHandle, topic: Topic) -> bool {
        self.with_active_slot(handle, |slot| {
            slot.subscriptions.subscribe(topic);
        })
        .await
    }

    /// Removes `topic` from an `Active` connection's subscriptions.
    ///
    /// No-op (returns `false`) for any other state.
    pub async fn unsubscribe(&self, handle: &ConnectionHandle, topic: Topic) -> bool {
        self.with_active_slot(handle, |slot| {
            slot.subscriptions.unsubscribe(topic);
        })
        .await
    }

    /// Records inbound activity (message or pong) on a connection.
    pub async fn touch(&self, handle: &ConnectionHandle) {
        let _ = self
            .with_active_slot(handle, |slot| slot.last_activity = Instant::now())
            .await;
    }

    /// Time since the last recorded activity, or `None` if the connection
    /// is no longer registered.
    pub async fn idle_for(&self, handle: &ConnectionHandle) -> Option<Duration> {
        let inner = self.inner.read().await;
        inner
            .slots
            .get(&handle.id)
            .map(|slot| slot.last_activity.elapsed())
    }

    /// Moves a connection to `Closing`: it stops receiving frames and its
    /// subscriptions are frozen, but it stays registered until
    /// [`Self::deregister`].
    pub async fn mark_closing(&self, handle: &ConnectionHandle) {
        let inner = self.inner.read().await;
        if let Some(slot) = inner.slots.get(&handle.id)
            && slot.state.load() != ConnectionState::Closed
        {
            slot.set_state(ConnectionState::Closing);
        }
    }

    /// Removes a connection and marks it `Closed`. Idempotent.
    ///
    /// Dropping the slot drops the sending half of the outbound queue;
    /// anything still queued is discarded by the transport, which checks
    /// the state before every write.
    pub async fn deregister(&self, handle: &ConnectionHandle) -> bool {
        let mut inner = self.inner.write().await;
        Self::remove_slot(&mut inner, handle.id)
    }

    fn remove_slot(inner: &mut Inner, id: ConnectionId) -> bool {
        match inner.slots.remove(&id) {
            Some(slot) => {
                slot.set_state(ConnectionState::Closed);
                tracing::debug!(connection_id = %id, "connection deregistered");
                true
            }
            None => false,
        }
    }

    /// Stamps a new event with the next value of the event clock.
    pub fn next_event_seq(&self) -> u64 {
        self.event_clock.fetch_add(1, Ordering::AcqRel).saturating_add(1)
    }

    /// Invokes `f` for every `Active` connection subscribed to `topic` that
    /// was registered before the event stamped `seq` was published.
    ///
    /// Slots that are not `Active` (e.g. closed mid-iteration by the
    /// transport) are skipped.
    pub async fn for_each_subscriber<F>(&self, topic: Topic, seq: u64, mut f: F)
    where
        F: FnMut(&Subscriber<'_>),
    {
        let inner = self.inner.read().await;
        for (id, slot) in &inner.slots {
            if slot.state.load() != ConnectionState::Active
                || slot.joined_at >= seq
                || !slot.subscriptions.matches(topic)
            {
                continue;
            }
            f(&Subscriber {
                id: *id,
                outbound: &slot.outbound,
            });
        }
    }

    /// Enqueues `frame` on every subscriber of `topic` and evicts those
    /// whose queue is full or closed.
    pub async fn deliver(&self, topic: Topic, seq: u64, frame: &Frame) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        let mut failed = Vec::new();

        self.for_each_subscriber(topic, seq, |sub| match sub.try_enqueue(frame) {
            Ok(()) => report.delivered = report.delivered.saturating_add(1),
            Err(err) => failed.push((sub.id(), err)),
        })
        .await;

        if !failed.is_empty() {
            let mut inner = self.inner.write().await;
            for (id, err) in failed {
                if Self::remove_slot(&mut inner, id) {
                    report.evicted = report.evicted.saturating_add(1);
                    tracing::warn!(connection_id = %id, error = %err, "evicting push connection");
                }
            }
        }
        report
    }

    /// Stops accepting registrations and deregisters every connection.
    ///
    /// Returns the number of connections that were closed.
    pub async fn close(&self) -> usize {
        let mut inner = self.inner.write().await;
        inner.accepting = false;
        let closed = inner.slots.len();
        for (_, slot) in inner.slots.drain() {
            slot.set_state(ConnectionState::Closed);
        }
        tracing::info!(closed, "connection registry closed");
        closed
    }

    /// Returns `true` while new connections are accepted.
    pub async fn is_accepting(&self) -> bool {
        self.inner.read().await.accepting
    }

    /// Number of registered connections in any state.
    pub async fn len(&self) -> usize {
        self.inner.read().await.slots.len()
    }

    /// Returns `true` if no connection is registered.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.slots.is_empty()
    }

    /// Number of `Active` connections.
    pub async fn active_count(&self) -> usize {
        self.inner
            .read()
            .await
            .slots
            .values()
            .filter(|slot| slot.state.load() == ConnectionState::Active)
            .count()
    }

    async fn with_active_slot<F>(&self, handle: &ConnectionHandle, f: F) -> bool
    where
        F: FnOnce(&mut Slot),
    {
        let mut inner = self.inner.write().await;
        match inner.slots.get_mut(&handle.id) {
            Some(slot) if slot.state.load() == ConnectionState::Active => {
                f(slot);
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::MatchId;

    const M1: Topic = Topic::Match(MatchId::new(1));
    const M2: Topic = Topic::Match(MatchId::new(2));

    fn frame(text: &str) -> Frame {
        Frame::from(text)
    }

    async fn active(registry: &ConnectionRegistry) -> (ConnectionHandle, OutboundQueue) {
        let Ok((handle, rx)) = registry.register().await else {
            panic!("registration failed");
        };
        assert!(registry.activate(&handle).await);
        (handle, rx)
    }

    #[tokio::test]
    async fn register_starts_connecting() {
        let registry = ConnectionRegistry::new(8);
        let Ok((handle, _rx)) = registry.register().await else {
            panic!("registration failed");
        };
        assert_eq!(handle.state(), ConnectionState::Connecting);
        assert_eq!(registry.len().await, 1);
        assert_eq!(registry.active_count().await, 0);
    }

    #[tokio::test]
    async fn connecting_connection_receives_nothing() {
        let registry = ConnectionRegistry::new(8);
        let Ok((handle, mut rx)) = registry.register().await else {
            panic!("registration failed");
        };
        assert!(!registry.subscribe(&handle, Topic::All).await);

        let seq = registry.next_event_seq();
        let report = registry.deliver(Topic::All, seq, &frame("x")).await;
        assert_eq!(report.delivered, 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn activate_is_single_shot() {
        let registry = ConnectionRegistry::new(8);
        let (handle, _rx) = active(&registry).await;
        assert!(handle.is_active());
        assert!(!registry.activate(&handle).await);
    }

    #[tokio::test]
    async fn delivery_respects_subscriptions() {
        let registry = ConnectionRegistry::new(8);
        let (a, mut rx_a) = active(&registry).await;
        let (all, mut rx_all) = active(&registry).await;
        registry.subscribe(&a, M1).await;
        registry.subscribe(&all, Topic::All).await;

        let seq = registry.next_event_seq();
        let report = registry.deliver(M2, seq, &frame("m2")).await;
        assert_eq!(report.delivered, 1);

        let seq = registry.next_event_seq();
        let report = registry.deliver(M1, seq, &frame("m1")).await;
        assert_eq!(report.delivered, 2);

        assert_eq!(rx_a.try_recv().ok().as_deref(), Some("m1"));
        assert!(rx_a.try_recv().is_err());
        assert_eq!(rx_all.try_recv().ok().as_deref(), Some("m2"));
        assert_eq!(rx_all.try_recv().ok().as_deref(), Some("m1"));
    }

    #[tokio::test]
    async fn late_registration_skips_earlier_event() {
        let registry = ConnectionRegistry::new(8);
        let seq = registry.next_event_seq();

        let (late, mut rx) = active(&registry).await;
        registry.subscribe(&late, M1).await;

        let report = registry.deliver(M1, seq, &frame("old")).await;
        assert_eq!(report.delivered, 0);
        assert!(rx.try_recv().is_err());

        let seq = registry.next_event_seq();
        registry.deliver(M1, seq, &frame("new")).await;
        assert_eq!(rx.try_recv().ok().as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn slow_consumer_is_evicted() {
        let registry = ConnectionRegistry::new(1);
        let (slow, _rx_slow) = active(&registry).await;
        let (fast, mut rx_fast) = active(&registry).await;
        registry.subscribe(&slow, Topic::All).await;
        registry.subscribe(&fast, Topic::All).await;

        let seq = registry.next_event_seq();
        assert_eq!(registry.deliver(M1, seq, &frame("1")).await.delivered, 2);
        assert_eq!(rx_fast.try_recv().ok().as_deref(), Some("1"));

        let seq = registry.next_event_seq();
        let report = registry.deliver(M1, seq, &frame("2")).await;
        assert_eq!(report, DeliveryReport { delivered: 1, evicted: 1 });
        assert_eq!(slow.state(), ConnectionState::Closed);
        assert!(fast.is_active());
        assert_eq!(rx_fast.try_recv().ok().as_deref(), Some("2"));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn dropped_queue_is_evicted() {
        let registry = ConnectionRegistry::new(4);
        let (handle, rx) = active(&registry).await;
        registry.subscribe(&handle, Topic::All).await;
        drop(rx);

        let seq = registry.next_event_seq();
        let report = registry.deliver(Topic::All, seq, &frame("x")).await;
        assert_eq!(report.evicted, 1);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn deregister_is_idempotent() {
        let registry = ConnectionRegistry::new(4);
        let (handle, _rx) = active(&registry).await;
        assert!(registry.deregister(&handle).await);
        assert!(!registry.deregister(&handle).await);
        assert_eq!(handle.state(), ConnectionState::Closed);
        assert!(!registry.subscribe(&handle, M1).await);
        assert!(registry.idle_for(&handle).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn touch_resets_idle_time() {
        let registry = ConnectionRegistry::new(4);
        let (handle, _rx) = active(&registry).await;

        tokio::time::advance(Duration::from_secs(5)).await;
        let Some(idle) = registry.idle_for(&handle).await else {
            panic!("connection must be registered");
        };
        assert!(idle >= Duration::from_secs(5));

        registry.touch(&handle).await;
        let Some(idle) = registry.idle_for(&handle).await else {
            panic!("connection must be registered");
        };
        assert!(idle < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn closing_connection_is_frozen() {
        let registry = ConnectionRegistry::new(4);
        let (handle, mut rx) = active(&registry).await;
        registry.subscribe(&handle, Topic::All).await;
        registry.mark_closing(&handle).await;

        assert_eq!(handle.state(), ConnectionState::Closing);
        assert!(!registry.unsubscribe(&handle, Topic::All).await);
        let seq = registry.next_event_seq();
        assert_eq!(registry.deliver(Topic::All, seq, &frame("x")).await.delivered, 0);
        assert!(rx.try_recv().is_err());
        assert!(registry.deregister(&handle).await);
    }

    #[tokio::test]
    async fn close_rejects_new_registrations() {
        let registry = ConnectionRegistry::new(4);
        let (a, _rx_a) = active(&registry).await;
        let Ok((b, _rx_b)) = registry.register().await else {
            panic!("registration failed");
        };

        assert_eq!(registry.close().await, 2);
        assert_eq!(a.state(), ConnectionState::Closed);
        assert!(!registry.activate(&b).await);
        assert!(!registry.is_accepting().await);
        assert!(matches!(registry.register().await, Err(GatewayError::ShuttingDown)));
    }

    #[tokio::test]
    async fn for_each_subscriber_visits_only_matches() {
        let registry = ConnectionRegistry::new(4);
        let (a, _rx_a) = active(&registry).await;
        let (b, _rx_b) = active(&registry).await;
        registry.subscribe(&a, M1).await;
        registry.subscribe(&b, M2).await;

        let seq = registry.next_event_seq();
        let mut visited = Vec::new();
        registry
            .for_each_subscriber(M1, seq, |sub| visited.push(sub.id()))
            .await;
        assert_eq!(visited, vec![a.id()]);
    }
}
