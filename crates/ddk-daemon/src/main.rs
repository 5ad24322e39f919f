//! ddk-daemon entry point.
//!
//! This file is intentionally thin: it sets up tracing, loads layered config,
//! picks the storage backend, wires middleware, and starts the HTTP server.
//! All route handlers live in `routes.rs`; all shared state types live in
//! `state.rs`.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use ddk_audit::{AuditSink, JsonlAuditSink, NullAuditSink};
use ddk_config::{DaemonSettings, UnusedKeyPolicy};
use ddk_daemon::{routes, state};
use ddk_store::{MemoryStore, Store};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env.local if present (dev convenience).
    // Silent if the file does not exist — production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let settings = load_settings()?;

    // Postgres when DDK_DATABASE_URL is set, in-memory otherwise. Migrations
    // run at every boot; they are embedded and idempotent.
    let (store, backend): (Arc<dyn Store>, &'static str) =
        match std::env::var(ddk_db::ENV_DB_URL) {
            Ok(_) => {
                let pool = ddk_db::connect_from_env().await?;
                ddk_db::migrate(&pool).await.context("running migrations")?;
                info!("postgres store ready");
                (Arc::new(ddk_db::PgStore::new(pool)), "postgres")
            }
            Err(_) => {
                info!("DDK_DATABASE_URL not set; using in-memory store");
                (Arc::new(MemoryStore::new()), "memory")
            }
        };

    let audit: Arc<dyn AuditSink> = match settings.audit_path.as_deref() {
        Some(path) => {
            info!(path, hash_chain = settings.audit_hash_chain, "audit log enabled");
            Arc::new(
                JsonlAuditSink::new(path, settings.audit_hash_chain)
                    .context("opening audit log")?,
            )
        }
        None => Arc::new(NullAuditSink),
    };

    let shared = Arc::new(state::AppState::new(store, audit, backend, &settings));

    state::spawn_heartbeat(shared.bus.clone(), Duration::from_secs(1));

    let started = shared
        .timers
        .start_enabled()
        .await
        .context("starting day-end timers")?;
    if !started.is_empty() {
        info!(facilities = started.len(), "day-end timers running");
    }

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr = match bind_addr_from_env() {
        Some(addr) => addr,
        None => settings
            .bind_addr
            .parse::<SocketAddr>()
            .with_context(|| format!("invalid bind_addr {:?}", settings.bind_addr))?,
    };
    info!("ddk-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .await
        .context("server crashed")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

/// Layered YAML from `DDK_CONFIG` (comma-separated paths, later files win);
/// full defaults when unset. Unused keys warn at boot rather than abort.
fn load_settings() -> anyhow::Result<DaemonSettings> {
    let Ok(raw) = std::env::var("DDK_CONFIG") else {
        return Ok(DaemonSettings::default());
    };
    let paths: Vec<&str> = raw
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    let loaded = ddk_config::load_layered_yaml(&paths)?;

    let report = ddk_config::report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn)?;
    if !report.is_clean() {
        tracing::warn!(
            unused = ?report.unused_leaf_pointers,
            "config contains keys nothing consumes"
        );
    }
    info!(config_hash = %loaded.config_hash, "layered config loaded");

    DaemonSettings::from_config_json(&loaded.config_json)
}

/// `DDK_DAEMON_ADDR` beats the config file's `daemon.bind_addr`.
fn bind_addr_from_env() -> Option<SocketAddr> {
    std::env::var("DDK_DAEMON_ADDR").ok()?.parse().ok()
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
        "http://localhost:1420",
        "http://127.0.0.1:1420",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}
