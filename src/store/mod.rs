//! Storage backend abstraction.
//!
//! One append-only partition per [`MeasurementKind`] plus the sensor
//! registry partition. The proxy only ever inserts, finds, and aggregates;
//! nothing here updates or deletes.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::credentials::Role;
use crate::models::{HistoricalReading, LatestReading, MeasurementKind, Observation, Sensor};

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::{BackendRoles, PostgresStore};

// ---

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Operation timed out")]
    Timeout,

    /// The backend refused our own credentials or privileges.
    #[error("Backend authentication rejected: {0}")]
    AuthRejected(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait Store: Send + Sync {
    /// A handle on the same data restricted to the privileges of `role`:
    /// ingest may insert and read, query may only read. A write through a
    /// query handle fails with [`StoreError::AuthRejected`].
    fn for_role(&self, role: Role) -> Arc<dyn Store>;

    /// Create every kind partition and the sensor partition if absent.
    async fn ensure_partitions(&self) -> Result<(), StoreError>;

    /// Append one observation; returns the id assigned to it.
    async fn insert_observation(
        &self,
        kind: MeasurementKind,
        observation: &Observation,
    ) -> Result<String, StoreError>;

    async fn sensor_exists(&self, sensor_name: &str) -> Result<bool, StoreError>;

    /// Insert a registry row. Returns `false` when the name was already
    /// present, which is not an error.
    async fn insert_sensor(&self, sensor: &Sensor) -> Result<bool, StoreError>;

    async fn list_sensors(&self) -> Result<Vec<Sensor>, StoreError>;

    /// Most recent value per sensor. An empty `sensors` slice means all.
    async fn latest(
        &self,
        kind: MeasurementKind,
        sensors: &[String],
    ) -> Result<Vec<LatestReading>, StoreError>;

    /// Rows with `start <= time_recorded <= end`, newest first.
    async fn historical(
        &self,
        kind: MeasurementKind,
        sensors: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<HistoricalReading>, StoreError>;
}

/// Bound a backend call so a stuck backend cannot hold the caller forever.
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    // ---
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout),
    }
}
