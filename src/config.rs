//! Gateway configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). Numeric settings fall back to their
//! defaults when unset or unparsable; settings that change security
//! behaviour (admission mode, bot allow-list, listen address) are strict
//! and abort startup with a [`ConfigError`] when invalid.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;

use crate::admission::{AdmissionMode, BotCategory, GateSettings, RateRule};
use crate::error::ConfigError;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    Text,
    /// One JSON object per line.
    Json,
}

/// PostgreSQL connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseSettings {
    /// Connection string.
    pub url: String,
    /// Maximum pool size.
    pub max_connections: u32,
    /// Timeout in seconds for acquiring a connection.
    pub connect_timeout_secs: u64,
}

/// Push-channel settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WsSettings {
    /// Bound of each connection's outbound queue.
    pub outbound_capacity: usize,
    /// Interval between server pings.
    pub ping_interval: Duration,
    /// Silence after which a connection is evicted.
    pub idle_timeout: Duration,
}

impl Default for WsSettings {
    fn default() -> Self {
        Self {
            outbound_capacity: 64,
            ping_interval: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(60),
        }
    }
}

/// Top-level gateway configuration.
///
/// Loaded once at startup via [`GatewayConfig::from_env`].
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Socket address to bind the HTTP server to.
    pub listen_addr: SocketAddr,

    /// Allowed browser origin; `*` allows any.
    pub cors_origin: String,

    /// PostgreSQL settings; `None` selects the in-memory store.
    pub database: Option<DatabaseSettings>,

    /// Admission rules; `None` when no admission key is configured.
    pub admission: Option<GateSettings>,

    /// Push-channel settings.
    pub ws: WsSettings,

    /// Capacity of the commit → publish queue.
    pub publish_queue_capacity: usize,

    /// Log output format.
    pub log_format: LogFormat,
}

impl GatewayConfig {
    /// Loads configuration from the process environment.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for invalid strict settings or when
    /// admission is required but `ADMISSION_KEY` is missing.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// See [`Self::from_env`].
    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(get);

        let listen_raw = env.string("LISTEN_ADDR", "0.0.0.0:8000");
        let listen_addr =
            listen_raw
                .parse::<SocketAddr>()
                .map_err(|e| ConfigError::Invalid {
                    key: "LISTEN_ADDR",
                    value: listen_raw.clone(),
                    reason: e.to_string(),
                })?;

        let database = env.non_empty("DATABASE_URL").map(|url| DatabaseSettings {
            url,
            max_connections: env.parse("DATABASE_MAX_CONNECTIONS", 10),
            connect_timeout_secs: env.parse("DATABASE_CONNECT_TIMEOUT_SECS", 5),
        });

        let admission = match env.non_empty("ADMISSION_KEY") {
            Some(_) => Some(admission_settings(&env)?),
            None if env.bool("ADMISSION_REQUIRED", false) => {
                return Err(ConfigError::MissingAdmissionKey);
            }
            None => None,
        };

        let defaults = WsSettings::default();
        let ws = WsSettings {
            outbound_capacity: env.parse("WS_OUTBOUND_CAPACITY", defaults.outbound_capacity),
            ping_interval: Duration::from_secs(
                env.parse("WS_PING_INTERVAL_SECS", defaults.ping_interval.as_secs()),
            ),
            idle_timeout: Duration::from_secs(
                env.parse("WS_IDLE_TIMEOUT_SECS", defaults.idle_timeout.as_secs()),
            ),
        };

        let log_format = match env.string("LOG_FORMAT", "text").to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Text,
        };

        Ok(Self {
            listen_addr,
            cors_origin: env.string("CORS_ORIGIN", "http://localhost:3000"),
            database,
            admission,
            ws,
            publish_queue_capacity: env.parse("PUBLISH_QUEUE_CAPACITY", 1024),
            log_format,
        })
    }
}

fn admission_settings<F>(env: &Env<F>) -> Result<GateSettings, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = GateSettings::default();

    let mode_raw = env.string("ADMISSION_MODE", "LIVE");
    let mode: AdmissionMode = mode_raw.parse().map_err(|reason| ConfigError::Invalid {
        key: "ADMISSION_MODE",
        value: mode_raw.clone(),
        reason,
    })?;

    let bots_raw = env.string("ADMISSION_ALLOWED_BOTS", "search_engine,preview");
    let allowed_bots = bots_raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse::<BotCategory>)
        .collect::<Result<HashSet<_>, _>>()
        .map_err(|reason| ConfigError::Invalid {
            key: "ADMISSION_ALLOWED_BOTS",
            value: bots_raw.clone(),
            reason,
        })?;

    let rule = |interval_key: &str, max_key: &str, fallback: RateRule| {
        let interval_ms = env.parse(
            interval_key,
            u64::try_from(fallback.interval.as_millis()).unwrap_or(u64::MAX),
        );
        RateRule::new(
            Duration::from_millis(interval_ms.max(1)),
            env.parse(max_key, fallback.max),
        )
    };

    Ok(GateSettings {
        mode,
        request_rule: rule(
            "ADMISSION_HTTP_INTERVAL_MS",
            "ADMISSION_HTTP_MAX",
            defaults.request_rule,
        ),
        handshake_rule: rule(
            "ADMISSION_WS_INTERVAL_MS",
            "ADMISSION_WS_MAX",
            defaults.handshake_rule,
        ),
        allowed_bots,
        trust_proxy: env.bool("ADMISSION_TRUST_PROXY", false),
        max_identities: env.parse("ADMISSION_MAX_IDENTITIES", defaults.max_identities),
    })
}

/// Typed accessors over a variable lookup.
struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn non_empty(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.non_empty(key).unwrap_or_else(|| default.to_string())
    }

    /// Parses a variable as `T`, returning `default` on missing or invalid
    /// values.
    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        self.non_empty(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    /// Accepts `"true"`, `"1"`, `"false"`, `"0"` (case-insensitive).
    fn bool(&self, key: &str, default: bool) -> bool {
        match self.non_empty(key).map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("true" | "1") => true,
            Some("false" | "0") => false,
            _ => default,
        }
    }
}
