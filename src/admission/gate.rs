//! The admission decision pipeline.
//!
//! [`AdmissionGate`] is built once at startup. Without an admission key it
//! is [`AdmissionGate::Disabled`] and admits everything without evaluating
//! any rule. Otherwise it is [`AdmissionGate::Enabled`] and runs shield,
//! classification and rate window in that order for the channel the call
//! arrived on.
//!
//! In [`AdmissionMode::DryRun`] denials are computed, counted and logged
//! but never enforced. The mode applies to every rule at once.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::task::JoinHandle;

use super::bot::{BotCategory, ClientClass, ClientClassifier, UserAgentClassifier};
use super::rate_window::{RateLimiter, RateRule, WindowDecision};
use super::shield::Shield;
use super::RequestFacts;
use crate::error::{AdmissionError, GatewayError};

/// How often expired rate windows are purged.
pub const JANITOR_PERIOD: Duration = Duration::from_secs(30);

/// Whether denials are enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdmissionMode {
    /// Denials are enforced.
    Live,
    /// Denials are recorded only.
    DryRun,
}

impl FromStr for AdmissionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LIVE" => Ok(Self::Live),
            "DRY_RUN" | "DRYRUN" => Ok(Self::DryRun),
            _ => Err(format!("expected LIVE or DRY_RUN, got {s:?}")),
        }
    }
}

/// Which entry point a call came through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// An ordinary HTTP request.
    Request,
    /// A push-channel upgrade.
    Handshake,
}

impl Channel {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Handshake => "handshake",
        }
    }
}

/// Which forbidding rule fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForbiddenRule {
    /// A shield signature matched.
    Shield(&'static str),
    /// An automated client outside the allow-list.
    Bot(BotCategory),
}

/// Why a caller was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// Over the rate limit.
    RateLimit {
        /// Milliseconds until the window resets.
        retry_after_ms: u64,
    },
    /// Blocked by shield or classification.
    Forbidden(ForbiddenRule),
}

impl DenyReason {
    /// Returns `true` for rate-limit denials.
    #[must_use]
    pub const fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimit { .. })
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RateLimit { retry_after_ms } => {
                write!(f, "rate_limit (retry after {retry_after_ms} ms)")
            }
            Self::Forbidden(ForbiddenRule::Shield(signature)) => {
                write!(f, "forbidden (shield: {signature})")
            }
            Self::Forbidden(ForbiddenRule::Bot(category)) => {
                write!(f, "forbidden (bot: {category})")
            }
        }
    }
}

/// Result of a successful evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Proceed.
    Allow,
    /// Reject with the given reason.
    Deny(DenyReason),
}

/// Configuration of an enabled gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateSettings {
    /// Enforcement mode for all rules.
    pub mode: AdmissionMode,
    /// Window applied to ordinary requests.
    pub request_rule: RateRule,
    /// Window applied to handshakes.
    pub handshake_rule: RateRule,
    /// Automated categories that are let through.
    pub allowed_bots: HashSet<BotCategory>,
    /// Take the identity from proxy headers.
    pub trust_proxy: bool,
    /// Bound on identities tracked per rule.
    pub max_identities: usize,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            mode: AdmissionMode::Live,
            request_rule: RateRule::new(Duration::from_secs(10), 50),
            handshake_rule: RateRule::new(Duration::from_secs(2), 5),
            allowed_bots: [BotCategory::SearchEngine, BotCategory::Preview]
                .into_iter()
                .collect(),
            trust_proxy: false,
            max_identities: 100_000,
        }
    }
}

/// Counter snapshot exposed on the health endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AdmissionStats {
    /// Whether the gate evaluates rules at all.
    pub enabled: bool,
    /// Active mode, if enabled.
    pub mode: Option<AdmissionMode>,
    /// Denials enforced.
    pub denied: u64,
    /// Denials recorded but not enforced (dry run).
    pub dry_run_denied: u64,
    /// Evaluations that failed.
    pub errors: u64,
}

/// Rules and state of an enabled gate.
#[derive(Debug)]
pub struct EnabledGate {
    mode: AdmissionMode,
    trust_proxy: bool,
    shield: Shield,
    classifier: Box<dyn ClientClassifier>,
    allowed_bots: HashSet<BotCategory>,
    request_limiter: RateLimiter,
    handshake_limiter: RateLimiter,
    denied: AtomicU64,
    dry_run_denied: AtomicU64,
    errors: AtomicU64,
}

impl EnabledGate {
    fn new(settings: GateSettings, classifier: Box<dyn ClientClassifier>) -> Self {
        Self {
            mode: settings.mode,
            trust_proxy: settings.trust_proxy,
            shield: Shield::new(),
            classifier,
            allowed_bots: settings.allowed_bots,
            request_limiter: RateLimiter::new(settings.request_rule, settings.max_identities),
            handshake_limiter: RateLimiter::new(settings.handshake_rule, settings.max_identities),
            denied: AtomicU64::new(0),
            dry_run_denied: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    const fn limiter(&self, channel: Channel) -> &RateLimiter {
        match channel {
            Channel::Request => &self.request_limiter,
            Channel::Handshake => &self.handshake_limiter,
        }
    }

    /// Runs the rule pipeline without applying the mode.
    fn evaluate(
        &self,
        channel: Channel,
        facts: &RequestFacts,
        now: Instant,
    ) -> Result<Decision, AdmissionError> {
        if let Some(hit) = self.shield.inspect(facts) {
            return Ok(Decision::Deny(DenyReason::Forbidden(ForbiddenRule::Shield(
                hit.signature,
            ))));
        }

        if let ClientClass::Automated(category) = self.classifier.classify(facts)?
            && !self.allowed_bots.contains(&category)
        {
            return Ok(Decision::Deny(DenyReason::Forbidden(ForbiddenRule::Bot(
                category,
            ))));
        }

        let identity = facts
            .identity
            .as_deref()
            .ok_or(AdmissionError::MissingIdentity)?;
        match self.limiter(channel).check(identity, now)? {
            WindowDecision::Allowed { .. } => Ok(Decision::Allow),
            WindowDecision::Limited { retry_after } => {
                let retry_after_ms = u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX);
                Ok(Decision::Deny(DenyReason::RateLimit { retry_after_ms }))
            }
        }
    }

    fn check(
        &self,
        channel: Channel,
        facts: &RequestFacts,
        now: Instant,
    ) -> Result<Decision, AdmissionError> {
        let decision = match self.evaluate(channel, facts, now) {
            Ok(decision) => decision,
            Err(err) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                return Err(err);
            }
        };

        let Decision::Deny(reason) = decision else {
            return Ok(Decision::Allow);
        };
        let identity = facts.identity.as_deref().unwrap_or("-");
        match self.mode {
            AdmissionMode::Live => {
                self.denied.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    channel = channel.as_str(),
                    identity,
                    path = %facts.path,
                    %reason,
                    "admission denied"
                );
                Ok(decision)
            }
            AdmissionMode::DryRun => {
                self.dry_run_denied.fetch_add(1, Ordering::Relaxed);
                tracing::info!(
                    channel = channel.as_str(),
                    identity,
                    path = %facts.path,
                    %reason,
                    "admission would deny (dry run)"
                );
                Ok(Decision::Allow)
            }
        }
    }
}

/// The process-wide admission gate.
#[derive(Debug)]
pub enum AdmissionGate {
    /// No admission key configured: every call is allowed unevaluated.
    Disabled,
    /// Rules are evaluated on every call.
    Enabled(EnabledGate),
}

impl AdmissionGate {
    /// Builds an enabled gate with the default `User-Agent` classifier.
    #[must_use]
    pub fn enabled(settings: GateSettings) -> Self {
        Self::with_classifier(settings, Box::new(UserAgentClassifier))
    }

    /// Builds an enabled gate with a custom classifier.
    #[must_use]
    pub fn with_classifier(settings: GateSettings, classifier: Box<dyn ClientClassifier>) -> Self {
        Self::Enabled(EnabledGate::new(settings, classifier))
    }

    /// Builds the gate from optional settings; `None` disables it.
    #[must_use]
    pub fn from_settings(settings: Option<GateSettings>) -> Self {
        settings.map_or(Self::Disabled, Self::enabled)
    }

    /// Returns `true` if rules are evaluated.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled(_))
    }

    /// Extracts [`RequestFacts`] using this gate's proxy trust setting.
    #[must_use]
    pub fn facts(
        &self,
        method: &axum::http::Method,
        uri: &axum::http::Uri,
        headers: &axum::http::HeaderMap,
        peer: Option<std::net::SocketAddr>,
    ) -> RequestFacts {
        let trust_proxy = match self {
            Self::Disabled => false,
            Self::Enabled(gate) => gate.trust_proxy,
        };
        RequestFacts::from_request(method, uri, headers, peer, trust_proxy)
    }

    /// Evaluates a call at `now` and applies the mode.
    ///
    /// In dry-run mode a denial is recorded and `Allow` is returned.
    ///
    /// # Errors
    ///
    /// Returns an [`AdmissionError`] if a rule could not be evaluated. The
    /// caller must treat this as a denial.
    pub fn check_at(
        &self,
        channel: Channel,
        facts: &RequestFacts,
        now: Instant,
    ) -> Result<Decision, AdmissionError> {
        match self {
            Self::Disabled => Ok(Decision::Allow),
            Self::Enabled(gate) => gate.check(channel, facts, now),
        }
    }

    /// Evaluates a call now. See [`Self::check_at`].
    ///
    /// # Errors
    ///
    /// Returns an [`AdmissionError`] if a rule could not be evaluated.
    pub fn check(&self, channel: Channel, facts: &RequestFacts) -> Result<Decision, AdmissionError> {
        self.check_at(channel, facts, Instant::now())
    }

    /// Evaluates a call and maps the outcome onto [`GatewayError`].
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::AdmissionDenied`] for an enforced denial and
    /// [`GatewayError::AdmissionUnavailable`] if evaluation failed.
    pub fn protect(&self, channel: Channel, facts: &RequestFacts) -> Result<(), GatewayError> {
        match self.check(channel, facts)? {
            Decision::Allow => Ok(()),
            Decision::Deny(reason) => Err(GatewayError::AdmissionDenied(reason)),
        }
    }

    /// Drops expired rate windows for both channels.
    pub fn purge_expired(&self, now: Instant) -> usize {
        match self {
            Self::Disabled => 0,
            Self::Enabled(gate) => gate
                .request_limiter
                .purge_expired(now)
                .saturating_add(gate.handshake_limiter.purge_expired(now)),
        }
    }

    /// Returns a snapshot of the gate counters.
    #[must_use]
    pub fn stats(&self) -> AdmissionStats {
        match self {
            Self::Disabled => AdmissionStats {
                enabled: false,
                mode: None,
                denied: 0,
                dry_run_denied: 0,
                errors: 0,
            },
            Self::Enabled(gate) => AdmissionStats {
                enabled: true,
                mode: Some(gate.mode),
                denied: gate.denied.load(Ordering::Relaxed),
                dry_run_denied: gate.dry_run_denied.load(Ordering::Relaxed),
                errors: gate.errors.load(Ordering::Relaxed),
            },
        }
    }
}

/// Spawns the background task that purges expired rate windows.
///
/// Returns `None` for a disabled gate.
#[must_use]
pub fn spawn_janitor(gate: &Arc<AdmissionGate>) -> Option<JoinHandle<()>> {
    if !gate.is_enabled() {
        return None;
    }
    let gate = Arc::clone(gate);
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(JANITOR_PERIOD);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let purged = gate.purge_expired(Instant::now());
            if purged > 0 {
                tracing::debug!(purged, "expired rate windows purged");
            }
        }
    }))
}
