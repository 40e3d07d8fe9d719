//! Query handler for the dashboard.
//!
//! Three purposes share one authorized entry point:
//! - `sensors`: the registry listing
//! - `real-time`: latest value per sensor for each kind of a unit system
//! - `historical`: every reading inside a closed time interval
//!
//! Each requested kind is queried on its own partition. An empty list for a
//! kind is a normal answer.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::credentials::Role;
use crate::models::{
    opt_string_or_number, parse_timestamp, HistoricalReading, LatestReading, MeasurementKind,
    Sensor, UnitSystem,
};
use crate::state::{require, AppState};
use crate::store::with_timeout;
use crate::ProxyError;

// ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    Sensors,
    RealTime,
    Historical,
}

impl Purpose {
    // ---
    /// Accepts the dashboard's numeric codes (`0`, `1`, `2`) or their names.
    pub fn from_value(value: &Value) -> Result<Self, ProxyError> {
        // ---
        let label = match value {
            Value::Number(n) => n.to_string(),
            Value::String(s) => s.trim().to_ascii_lowercase(),
            other => return Err(ProxyError::UnknownPurpose(other.to_string())),
        };
        match label.as_str() {
            "0" | "sensors" => Ok(Purpose::Sensors),
            "1" | "real-time" | "real_time" | "realtime" => Ok(Purpose::RealTime),
            "2" | "historical" => Ok(Purpose::Historical),
            _ => Err(ProxyError::UnknownPurpose(label)),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct QueryFilters {
    // ---
    /// `Metric` or `Customary`; anything else means metric.
    #[serde(alias = "unit_system")]
    pub metric_or_customary: Option<String>,
    /// `All`, or `Selected Options` to restrict to `selected_sensors`.
    pub all_or_selected: Option<String>,
    pub selected_sensors: Option<Vec<String>>,
}

impl QueryFilters {
    // ---
    pub fn unit_system(&self) -> UnitSystem {
        UnitSystem::from_label(self.metric_or_customary.as_deref())
    }

    /// Sensor names to restrict to; empty means every sensor.
    pub fn sensor_filter(&self) -> Vec<String> {
        // ---
        let selected = self
            .all_or_selected
            .as_deref()
            .is_some_and(|s| s.trim().to_ascii_lowercase().starts_with("selected"));
        if !selected {
            return Vec::new();
        }
        self.selected_sensors
            .iter()
            .flatten()
            .filter(|s| !s.trim().is_empty())
            .cloned()
            .collect()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TimeRange {
    #[serde(alias = "start")]
    pub start_date_time: Option<String>,
    #[serde(alias = "end")]
    pub end_date_time: Option<String>,
}

/// JSON body sent by dashboard clients.
#[derive(Debug, Default, Deserialize)]
pub struct QueryRequest {
    // ---
    pub purpose: Option<Value>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub host: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub port: Option<String>,
    pub filters: Option<QueryFilters>,
    pub time_range: Option<TimeRange>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryResult {
    Sensors(Vec<Sensor>),
    Latest(BTreeMap<MeasurementKind, Vec<LatestReading>>),
    Historical(BTreeMap<MeasurementKind, Vec<HistoricalReading>>),
}

/// Authorize a dashboard call and run the requested purpose.
pub async fn run_query(state: &AppState, req: QueryRequest) -> Result<QueryResult, ProxyError> {
    // ---
    let purpose = req
        .purpose
        .ok_or_else(|| ProxyError::MissingField("purpose".to_string()))?;
    let username = require(req.username, "username")?;
    let password = require(req.password, "password")?;
    let host = require(req.host, "host")?;
    let port = require(req.port, "port")?;

    state.authorize(Role::Query, &username, &password, &host, &port)?;

    let purpose = Purpose::from_value(&purpose)?;
    let filters = req.filters.unwrap_or_default();
    let kinds = filters.unit_system().kinds();
    let sensors = filters.sensor_filter();

    tracing::debug!(?purpose, sensor_count = sensors.len(), "running dashboard query");

    match purpose {
        Purpose::Sensors => sensors_listing(state).await.map(QueryResult::Sensors),
        Purpose::RealTime => latest(state, &kinds, &sensors).await.map(QueryResult::Latest),
        Purpose::Historical => {
            let (start, end) = time_bounds(req.time_range)?;
            historical(state, &kinds, &sensors, start, end)
                .await
                .map(QueryResult::Historical)
        }
    }
}

/// Every registered sensor, ordered by name.
pub async fn sensors_listing(state: &AppState) -> Result<Vec<Sensor>, ProxyError> {
    with_timeout(state.backend_timeout, state.query_store.list_sensors())
        .await
        .map_err(ProxyError::from_query)
}

/// Latest value per sensor for each of `kinds`.
pub async fn latest(
    state: &AppState,
    kinds: &[MeasurementKind],
    sensors: &[String],
) -> Result<BTreeMap<MeasurementKind, Vec<LatestReading>>, ProxyError> {
    // ---
    let mut result = BTreeMap::new();
    for &kind in kinds {
        let rows = with_timeout(state.backend_timeout, state.query_store.latest(kind, sensors))
            .await
            .map_err(ProxyError::from_query)?;
        result.insert(kind, rows);
    }
    Ok(result)
}

/// Readings with `start <= time_recorded <= end` for each of `kinds`.
pub async fn historical(
    state: &AppState,
    kinds: &[MeasurementKind],
    sensors: &[String],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<BTreeMap<MeasurementKind, Vec<HistoricalReading>>, ProxyError> {
    // ---
    if start > end {
        return Err(ProxyError::InvalidFormat(format!(
            "time range start {start} is after end {end}"
        )));
    }

    let mut result = BTreeMap::new();
    for &kind in kinds {
        let rows = with_timeout(
            state.backend_timeout,
            state.query_store.historical(kind, sensors, start, end),
        )
        .await
        .map_err(ProxyError::from_query)?;
        result.insert(kind, rows);
    }
    Ok(result)
}

fn time_bounds(range: Option<TimeRange>) -> Result<(DateTime<Utc>, DateTime<Utc>), ProxyError> {
    // ---
    let range = range.ok_or_else(|| ProxyError::MissingField("time_range".to_string()))?;
    let start = require(range.start_date_time, "time_range.start_date_time")?;
    let end = require(range.end_date_time, "time_range.end_date_time")?;
    Ok((parse_timestamp(&start)?, parse_timestamp(&end)?))
}
