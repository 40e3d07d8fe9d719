use axum::{
    extract::{rejection::FormRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Form, Json, Router,
};
use serde::Serialize;
use tracing::info;

use crate::ingest::{self, IngestRequest, SensorStatus};
use crate::{AppState, ProxyError};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/data_gen", post(handler))
}

#[derive(Serialize)]
struct IngestResponse {
    status: &'static str,
    message: String,
    ack: bool,
    id: String,
    sensor_status: SensorStatus,
}

async fn handler(
    State(state): State<AppState>,
    payload: Result<Form<IngestRequest>, FormRejection>,
) -> Response {
    // ---
    let Form(req) = match payload {
        Ok(form) => form,
        Err(rejection) => return ProxyError::InvalidFormat(rejection.body_text()).into_response(),
    };

    match ingest::insert_observation(&state, req).await {
        Ok(outcome) => {
            info!(kind = %outcome.kind, id = %outcome.id, "POST /data_gen - stored");
            let body = IngestResponse {
                status: "Success",
                message: format!(
                    "Insert into '{}' succeeded. Acknowledgement: {}. Document ID: {}",
                    outcome.kind, outcome.ack, outcome.id
                ),
                ack: outcome.ack,
                id: outcome.id,
                sensor_status: outcome.sensor_status,
            };
            (StatusCode::CREATED, Json(body)).into_response()
        }
        Err(e) => e.into_response(),
    }
}
