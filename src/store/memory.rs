//! In-memory storage backend.
//!
//! Used when no `DATABASE_URL` is configured and by the handler tests. It
//! follows the same append-only, partition-per-kind rules as the PostgreSQL
//! backend, including the unique key on sensor names and the read-only
//! privileges of query-role handles.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{Store, StoreError};
use crate::credentials::Role;
use crate::models::{HistoricalReading, LatestReading, MeasurementKind, Observation, Sensor};

// ---

#[derive(Debug, Default)]
struct Partitions {
    observations: HashMap<MeasurementKind, Vec<Observation>>,
    sensors: BTreeMap<String, Sensor>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    data: Arc<RwLock<Partitions>>,
    read_only: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored observations for `kind`.
    #[cfg(test)]
    pub async fn observation_count(&self, kind: MeasurementKind) -> usize {
        let data = self.data.read().await;
        data.observations.get(&kind).map_or(0, Vec::len)
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        // ---
        if self.read_only {
            return Err(StoreError::AuthRejected(
                "permission denied: role has read-only access".to_string(),
            ));
        }
        Ok(())
    }
}

fn matches_filter(sensors: &[String], sensor_name: &str) -> bool {
    sensors.is_empty() || sensors.iter().any(|s| s == sensor_name)
}

#[async_trait]
impl Store for MemoryStore {
    fn for_role(&self, role: Role) -> Arc<dyn Store> {
        Arc::new(Self {
            data: Arc::clone(&self.data),
            read_only: role == Role::Query,
        })
    }

    async fn ensure_partitions(&self) -> Result<(), StoreError> {
        // ---
        self.check_writable()?;
        let mut data = self.data.write().await;
        for kind in MeasurementKind::ALL {
            data.observations.entry(kind).or_default();
        }
        Ok(())
    }

    async fn insert_observation(
        &self,
        kind: MeasurementKind,
        observation: &Observation,
    ) -> Result<String, StoreError> {
        // ---
        self.check_writable()?;
        let mut data = self.data.write().await;
        data.observations
            .entry(kind)
            .or_default()
            .push(observation.clone());
        Ok(Uuid::new_v4().to_string())
    }

    async fn sensor_exists(&self, sensor_name: &str) -> Result<bool, StoreError> {
        let data = self.data.read().await;
        Ok(data.sensors.contains_key(sensor_name))
    }

    async fn insert_sensor(&self, sensor: &Sensor) -> Result<bool, StoreError> {
        // ---
        self.check_writable()?;
        let mut data = self.data.write().await;
        if data.sensors.contains_key(&sensor.sensor_name) {
            return Ok(false);
        }
        data.sensors
            .insert(sensor.sensor_name.clone(), sensor.clone());
        Ok(true)
    }

    async fn list_sensors(&self) -> Result<Vec<Sensor>, StoreError> {
        let data = self.data.read().await;
        Ok(data.sensors.values().cloned().collect())
    }

    async fn latest(
        &self,
        kind: MeasurementKind,
        sensors: &[String],
    ) -> Result<Vec<LatestReading>, StoreError> {
        // ---
        let data = self.data.read().await;
        let Some(rows) = data.observations.get(&kind) else {
            return Ok(Vec::new());
        };

        // Reverse first so that among equal timestamps the later insert wins.
        let mut matching: Vec<&Observation> = rows
            .iter()
            .rev()
            .filter(|obs| matches_filter(sensors, &obs.sensor_name))
            .collect();
        matching.sort_by(|a, b| b.time_recorded.cmp(&a.time_recorded));

        let mut seen = HashSet::new();
        Ok(matching
            .into_iter()
            .filter(|obs| seen.insert(obs.sensor_name.clone()))
            .map(|obs| LatestReading {
                sensor_name: obs.sensor_name.clone(),
                latest_value: obs.metric.clone(),
            })
            .collect())
    }

    async fn historical(
        &self,
        kind: MeasurementKind,
        sensors: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<HistoricalReading>, StoreError> {
        // ---
        let data = self.data.read().await;
        let Some(rows) = data.observations.get(&kind) else {
            return Ok(Vec::new());
        };

        let mut matching: Vec<HistoricalReading> = rows
            .iter()
            .filter(|obs| obs.time_recorded >= start && obs.time_recorded <= end)
            .filter(|obs| matches_filter(sensors, &obs.sensor_name))
            .map(HistoricalReading::from)
            .collect();
        matching.sort_by(|a, b| b.time_recorded.cmp(&a.time_recorded));
        Ok(matching)
    }
}
