//! Per-identity rate windows.
//!
//! A [`RateWindow`] counts admitted calls for one identity inside the
//! current interval and restarts once the interval has been exceeded.
//! [`RateLimiter`] keeps one window per identity for a single rule in a
//! [`DashMap`]; each check runs under that identity's shard lock, so two
//! concurrent checks can never both observe a stale window and both reset
//! it. Different identities never contend on a global lock.

use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::error::AdmissionError;

/// Interval and limit of one rate rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateRule {
    /// Window length.
    pub interval: Duration,
    /// Calls admitted per window.
    pub max: u32,
}

impl RateRule {
    /// Creates a rule admitting `max` calls per `interval`.
    #[must_use]
    pub const fn new(interval: Duration, max: u32) -> Self {
        Self { interval, max }
    }
}

/// Result of counting one call against a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowDecision {
    /// Admitted; `remaining` more calls fit in the current window.
    Allowed {
        /// Calls left in the window after this one.
        remaining: u32,
    },
    /// Over the limit until the window resets.
    Limited {
        /// Time until the current window ends.
        retry_after: Duration,
    },
}

/// Counter for one identity under one rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindow {
    start: Instant,
    count: u32,
}

impl RateWindow {
    /// Opens an empty window at `now`.
    #[must_use]
    pub const fn new(now: Instant) -> Self {
        Self { start: now, count: 0 }
    }

    /// Calls admitted in the current window.
    #[must_use]
    pub const fn count(&self) -> u32 {
        self.count
    }

    /// Returns `true` once more than `interval` has passed since the start.
    /// A call at exactly `start + interval` still belongs to this window.
    #[must_use]
    pub fn is_expired(&self, now: Instant, interval: Duration) -> bool {
        now.saturating_duration_since(self.start) > interval
    }

    /// Counts one call at `now`.
    ///
    /// An expired window restarts at `now` with count 1. Denied calls are
    /// not counted, so `count` never exceeds `rule.max`.
    pub fn hit(&mut self, now: Instant, rule: RateRule) -> WindowDecision {
        if self.is_expired(now, rule.interval) {
            *self = Self::new(now);
        }
        if self.count >= rule.max {
            let elapsed = now.saturating_duration_since(self.start);
            return WindowDecision::Limited {
                retry_after: rule.interval.saturating_sub(elapsed),
            };
        }
        self.count = self.count.saturating_add(1);
        WindowDecision::Allowed {
            remaining: rule.max.saturating_sub(self.count),
        }
    }
}

/// Rate windows for every identity under one rule.
#[derive(Debug)]
pub struct RateLimiter {
    rule: RateRule,
    capacity: usize,
    windows: DashMap<String, RateWindow>,
}

impl RateLimiter {
    /// Creates a limiter tracking at most `capacity` identities.
    #[must_use]
    pub fn new(rule: RateRule, capacity: usize) -> Self {
        Self {
            rule,
            capacity: capacity.max(1),
            windows: DashMap::new(),
        }
    }

    /// The rule this limiter enforces.
    #[must_use]
    pub const fn rule(&self) -> RateRule {
        self.rule
    }

    /// Counts one call from `identity` at `now`.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::WindowStoreExhausted`] when a new identity
    /// arrives, the store is full and no window has expired.
    pub fn check(&self, identity: &str, now: Instant) -> Result<WindowDecision, AdmissionError> {
        if !self.windows.contains_key(identity) && self.windows.len() >= self.capacity {
            let purged = self.purge_expired(now);
            if purged == 0 && self.windows.len() >= self.capacity {
                return Err(AdmissionError::WindowStoreExhausted {
                    capacity: self.capacity,
                });
            }
        }

        let mut window = self
            .windows
            .entry(identity.to_owned())
            .or_insert_with(|| RateWindow::new(now));
        Ok(window.hit(now, self.rule))
    }

    /// Drops every expired window. Returns how many were removed.
    pub fn purge_expired(&self, now: Instant) -> usize {
        let before = self.windows.len();
        let interval = self.rule.interval;
        self.windows.retain(|_, w| !w.is_expired(now, interval));
        before.saturating_sub(self.windows.len())
    }

    /// Number of identities currently tracked.
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.windows.len()
    }

    /// Current window of `identity`, if tracked.
    #[must_use]
    pub fn window(&self, identity: &str) -> Option<RateWindow> {
        self.windows.get(identity).map(|w| *w)
    }
}
