use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tracing::debug;

use crate::query::{self, QueryRequest, QueryResult};
use crate::{AppState, ProxyError};

// ---

/// Dashboard clients send a JSON body; older ones do so on `GET`.
pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/web_app", get(handler).post(handler))
}

#[derive(Serialize)]
struct QueryResponse {
    status: &'static str,
    message: &'static str,
    result: QueryResult,
}

async fn handler(
    State(state): State<AppState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Response {
    // ---
    let Json(req) = match payload {
        Ok(json) => json,
        Err(rejection) => return ProxyError::InvalidFormat(rejection.body_text()).into_response(),
    };

    match query::run_query(&state, req).await {
        Ok(result) => {
            debug!("/web_app - returning OK");
            let body = QueryResponse {
                status: "Success",
                message: "Query succeeded.",
                result,
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => e.into_response(),
    }
}
