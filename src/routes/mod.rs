//! Route gateway for the proxy service.
//!
//! Each sibling module exports a subrouter; this gateway merges them and
//! attaches the shared state, so `main.rs` never sees individual endpoints.
//! Routes only extract arguments, dispatch, and map statuses.

use axum::Router;

use crate::AppState;

mod data_gen;
mod health;
mod web_app;

// ---

pub fn router(state: AppState) -> Router {
    // ---
    Router::new()
        .merge(data_gen::router())
        .merge(web_app::router())
        .merge(health::router())
        .with_state(state)
}
