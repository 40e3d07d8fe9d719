//! Smoke tests against a running proxy.
//!
//! Run with `cargo test -- --ignored` after starting the service. The tests
//! read the same environment the proxy does (`PROXY_TARGET_HOST`,
//! `PROXY_TARGET_PORT`, `INGEST_PASSWORD_FILE`, `QUERY_PASSWORD_FILE`) plus
//! `BASE_URL` for where to reach it.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};

#[derive(Debug, Deserialize)]
struct StatusBody {
    status: String,
    timestamp: DateTime<Utc>,
    uptime_seconds: u64,
}

#[derive(Debug, Deserialize)]
struct IngestBody {
    status: String,
    ack: bool,
    id: String,
    sensor_status: String,
}

fn base_url() -> String {
    std::env::var("BASE_URL").unwrap_or_else(|_| "http://localhost:8079".into())
}

fn target() -> (String, String) {
    // ---
    let host = std::env::var("PROXY_TARGET_HOST").unwrap_or_else(|_| "localhost".into());
    let port = std::env::var("PROXY_TARGET_PORT").unwrap_or_else(|_| "8079".into());
    (host, port)
}

fn secret_digest(var: &str) -> Result<String> {
    // ---
    let path = std::env::var(var).with_context(|| format!("{var} must be set"))?;
    let secret = std::fs::read(&path).with_context(|| format!("cannot read {path}"))?;
    Ok(hex::encode(Sha256::digest(&secret)))
}

#[tokio::test]
#[ignore = "requires a running proxy"]
async fn status_endpoint_reports_alive() -> Result<()> {
    // ---
    let body: StatusBody = Client::new()
        .get(format!("{}/status", base_url()))
        .send()
        .await?
        .json()
        .await?;

    assert_eq!(body.status, "alive");
    assert!(body.timestamp <= Utc::now());
    assert!(body.uptime_seconds < 60 * 60 * 24 * 365);
    Ok(())
}

#[tokio::test]
#[ignore = "requires a running proxy"]
async fn ingest_then_real_time_query() -> Result<()> {
    // ---
    let client = Client::new();
    let (host, port) = target();
    let document = json!({
        "sensor_name": "22181_vienna",
        "time_recorded": Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        "latitude": 38.9,
        "longitude": -77.26,
        "city": "Vienna",
        "county": "Fairfax County",
        "state": "Virginia",
        "zip_code": 22181,
        "metric": 14.5,
    });

    let response = client
        .post(format!("{}/data_gen", base_url()))
        .form(&[
            ("username", "data_gen".to_string()),
            ("password", secret_digest("INGEST_PASSWORD_FILE")?),
            ("host", host.clone()),
            ("port", port.clone()),
            ("collection", "temp_c".to_string()),
            ("document_str", document.to_string()),
        ])
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);

    let body: IngestBody = response.json().await?;
    assert_eq!(body.status, "Success");
    assert!(body.ack);
    assert!(!body.id.is_empty());
    assert_ne!(body.sensor_status, "store-write-failed");

    let response = client
        .post(format!("{}/web_app", base_url()))
        .json(&json!({
            "purpose": "real-time",
            "username": "web_view",
            "password": secret_digest("QUERY_PASSWORD_FILE")?,
            "host": host,
            "port": port,
            "filters": {
                "metric_or_customary": "Metric",
                "all_or_selected": "Selected Options",
                "selected_sensors": ["22181_vienna"],
            },
        }))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body: serde_json::Value = response.json().await?;
    let readings = body["result"]["temp_c"]
        .as_array()
        .context("temp_c missing from result")?;
    assert_eq!(readings.len(), 1);
    assert_eq!(readings[0]["sensor_name"], "22181_vienna");
    assert_eq!(readings[0]["latest_value"], 14.5);
    Ok(())
}

#[tokio::test]
#[ignore = "requires a running proxy"]
async fn wrong_password_is_rejected() -> Result<()> {
    // ---
    let (host, port) = target();
    let response = Client::new()
        .post(format!("{}/data_gen", base_url()))
        .form(&[
            ("username", "data_gen"),
            ("password", "not-a-digest"),
            ("host", host.as_str()),
            ("port", port.as_str()),
            ("collection", "temp_c"),
            ("document_str", "{}"),
        ])
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}
