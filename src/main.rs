//! sportzy-live server entry point.
//!
//! Starts the Axum HTTP server with REST and WebSocket endpoints.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::http::{HeaderValue, Method, header};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use sportzy_live::admission::{AdmissionGate, spawn_janitor};
use sportzy_live::api;
use sportzy_live::app_state::AppState;
use sportzy_live::config::{GatewayConfig, LogFormat};
use sportzy_live::domain::{BroadcastHub, ConnectionRegistry};
use sportzy_live::persistence::{MatchStore, MemoryStore, PostgresStore};
use sportzy_live::service::LiveService;

/// How long shutdown waits for the publish worker to drain.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Configuration decides the log format, so load it first and report
    // any error once tracing is up.
    let config = GatewayConfig::from_env();
    init_tracing(config.as_ref().map_or(LogFormat::Text, |c| c.log_format));
    let config = config.context("invalid configuration")?;
    tracing::info!(addr = %config.listen_addr, "starting sportzy-live");

    // Persistence
    let store: Arc<dyn MatchStore> = match &config.database {
        Some(db) => Arc::new(
            PostgresStore::connect(db)
                .await
                .context("database unavailable")?,
        ),
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    // Broadcast core
    let registry = Arc::new(ConnectionRegistry::new(config.ws.outbound_capacity));
    let (hub, publish_worker) =
        BroadcastHub::spawn(Arc::clone(&registry), config.publish_queue_capacity);
    let live_service = Arc::new(LiveService::new(Arc::clone(&store), hub));

    // Admission
    let gate = Arc::new(AdmissionGate::from_settings(config.admission.clone()));
    let gate_stats = gate.stats();
    tracing::info!(
        enabled = gate_stats.enabled,
        mode = ?gate_stats.mode,
        "admission gate configured"
    );
    let janitor = spawn_janitor(&gate);

    let app_state = AppState {
        live_service,
        registry: Arc::clone(&registry),
        gate,
        ws: config.ws,
    };

    let app = api::build_router(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config.cors_origin)?);

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(Arc::clone(&registry)))
    .await?;

    // HTTP is drained; every hub handle is gone with the router, so the
    // worker finishes once its queue is empty.
    if tokio::time::timeout(DRAIN_TIMEOUT, publish_worker).await.is_err() {
        tracing::warn!("publish worker did not drain in time");
    }
    if let Some(janitor) = janitor {
        janitor.abort();
    }
    store.close().await;
    tracing::info!("shutdown complete");

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

fn cors_layer(origin: &str) -> anyhow::Result<CorsLayer> {
    if origin == "*" {
        return Ok(CorsLayer::permissive());
    }
    let origin = HeaderValue::from_str(origin).context("invalid CORS_ORIGIN")?;
    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]))
}

/// Resolves on Ctrl-C or SIGTERM after the registry has stopped accepting
/// handshakes and dropped every live connection.
async fn shutdown_signal(registry: Arc<ConnectionRegistry>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    let closed = registry.close().await;
    tracing::info!(closed, "shutdown signal received, live connections closed");
}
