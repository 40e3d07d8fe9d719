// src/routes/health.rs
//! Liveness check for the proxy.
//!
//! This module defines the `/status` route used by container orchestrators
//! and by clients checking that the proxy is up. It follows the Explicit
//! Module Boundary Pattern (EMBP):
//! - Internal to this file: endpoint handler and its response type
//! - Exports to the gateway (`mod.rs`): a subrouter containing `/status`

use axum::{extract::State, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::AppState;

/// JSON response body for the `/status` endpoint.
#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
    timestamp: DateTime<Utc>,
    uptime_seconds: u64,
}

/// Handle `GET /status`.
///
/// Reports uptime since process start. Deliberately does not touch the
/// storage backend.
async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "alive",
        timestamp: Utc::now(),
        uptime_seconds: state.uptime().as_secs(),
    })
}

/// Create a subrouter containing the `/status` route.
pub fn router() -> Router<AppState> {
    Router::new().route("/status", get(status))
}
