//! Application entry point for the `weather-proxy` service.
//!
//! This binary orchestrates the full startup sequence for the proxy that sits
//! between weather generator/dashboard clients and the storage backend:
//! - Loading configuration from environment variables or `.env`
//! - Initializing structured logging/tracing
//! - Hashing the role secrets (fatal if a secret file is unreadable)
//! - Connecting the storage backend and creating its partitions
//! - Mounting all API routes via the `routes` gateway (EMBP pattern)
//! - Binding the Axum HTTP server and serving requests
//!
//! # Environment Variables
//! - `PROXY_TARGET_HOST` (**required**) – host clients must present
//! - `INGEST_PASSWORD_FILE`, `QUERY_PASSWORD_FILE` (**required**) – role secrets
//! - `DATABASE_URL` (optional) – PostgreSQL connection string; in-memory if unset
//! - `PROXY_LOG_LEVEL` (optional) – log verbosity (default: `debug`)
//! - `PROXY_SPAN_EVENTS` (optional) – span event mode for tracing
//!
//! See `config.rs` for the full list.
use std::{env, sync::Arc};

use axum::Router;
use dotenvy::dotenv;
use is_terminal::IsTerminal;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use anyhow::Result;

mod config;
mod credentials;
mod error;
mod ingest;
mod models;
mod query;
mod registry;
mod routes;
mod schema;
mod state;
mod store;

pub use config::Config;

// Re-exported for routes/*.rs and the handlers, so siblings depend on this
// gateway rather than on each other's file layout.
pub use error::ProxyError;
pub use state::AppState;

use credentials::CredentialStore;
use store::{BackendRoles, MemoryStore, PostgresStore, Store};

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    init_tracing();
    dotenv().ok();

    let cfg = config::load_from_env()?;
    cfg.log_config();

    let credentials = CredentialStore::load(&cfg)?;

    let store: Arc<dyn Store> = match &cfg.db_url {
        Some(db_url) => {
            tracing::info!("Attempting to connect to database");
            let roles = BackendRoles {
                ingest: cfg.ingest_db_role.clone(),
                query: cfg.query_db_role.clone(),
            };
            let pg = PostgresStore::connect(db_url, cfg.db_pool_max, cfg.backend_timeout, roles)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;
            tracing::info!("Successfully connected to database");
            Arc::new(pg)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; observations are kept in memory only");
            Arc::new(MemoryStore::new())
        }
    };

    store
        .ensure_partitions()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create storage partitions: {}", e))?;

    let state = AppState::new(&cfg, store, credentials);
    tracing::info!(
        buckets = state.registry.bucket_count(),
        "sensor registry tracker ready"
    );

    // Build app from routes gateway (EMBP)
    let app: Router = routes::router(state);

    tracing::info!("Listening on {}", cfg.bind_addr);

    let listener = tokio::net::TcpListener::bind(cfg.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ---

/// Initialize the global tracing subscriber for structured logging.
///
/// This function configures the [`tracing_subscriber`] with:
/// - Log target, file, and line number output enabled
/// - Color output controlled by TTY detection and `FORCE_COLOR` env var:
///   - `FORCE_COLOR=1|true|yes`: force colors on
///   - `FORCE_COLOR=0|false|no`: force colors off
///   - unset or other values: auto-detect TTY
/// - Span event emission mode controlled by the `PROXY_SPAN_EVENTS` env var:
///   - `"full"`       : emit ENTER, EXIT, and CLOSE events with timing
///   - `"enter_exit"` : emit ENTER and EXIT only
///   - unset or other values: emit CLOSE events only (default)
/// - Log level controlled by the `PROXY_LOG_LEVEL` env var
///
/// Call once at startup, before any logging macro runs.
fn init_tracing() {
    // ---
    let span_events = match env::var("PROXY_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    // Determine if we should use colors
    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stdout().is_terminal(),
    };

    // Use RUST_LOG if available, otherwise fall back to PROXY_LOG_LEVEL
    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("PROXY_LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("info") => "info",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "debug",
        };
        EnvFilter::new(format!("{level},sqlx::query=warn"))
    };

    tracing_subscriber::fmt()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}
