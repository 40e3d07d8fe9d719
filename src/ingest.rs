//! Ingestion handler: one observation in, registry reconciled.
//!
//! The observation insert is the primary fact of an ingest call. Keeping
//! the sensor registry in step is secondary bookkeeping: if it fails, the
//! caller still gets a success and finds the problem in `sensor_status`.

use serde::{Deserialize, Serialize};

use crate::credentials::Role;
use crate::models::{MeasurementKind, Observation};
use crate::state::{require, AppState};
use crate::store::with_timeout;
use crate::ProxyError;

// ---

/// Form fields posted by generator clients.
#[derive(Debug, Default, Deserialize)]
pub struct IngestRequest {
    // ---
    pub username: Option<String>,
    /// SHA-256 hex digest of the role secret.
    pub password: Option<String>,
    pub host: Option<String>,
    pub port: Option<String>,
    /// Measurement kind, naming the target partition.
    pub collection: Option<String>,
    /// JSON text of the observation document.
    pub document_str: Option<String>,
}

/// What happened to the sensor registry during an ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SensorStatus {
    /// First sighting: cached and written to the registry partition.
    AddedToCacheAndStore,
    /// The registry already had the sensor; only the cache was updated.
    AddedToCacheOnly,
    /// Cache hit; the registry was not consulted.
    ///
    /// A hit can land while the ingest that cached the name is still writing
    /// the registry row. If that write then fails, the name is forgotten and
    /// the next ingest for the sensor checks the registry again.
    AlreadyCached,
    /// The registry check or write failed; the observation still stands.
    StoreWriteFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestOutcome {
    pub kind: MeasurementKind,
    pub ack: bool,
    pub id: String,
    pub sensor_status: SensorStatus,
}

/// Validate, authorize, and store one observation.
pub async fn insert_observation(
    state: &AppState,
    req: IngestRequest,
) -> Result<IngestOutcome, ProxyError> {
    // ---
    let username = require(req.username, "username")?;
    let password = require(req.password, "password")?;
    let host = require(req.host, "host")?;
    let port = require(req.port, "port")?;
    let collection = require(req.collection, "collection")?;
    let document = require(req.document_str, "document_str")?;

    state.authorize(Role::Ingest, &username, &password, &host, &port)?;

    let kind: MeasurementKind = collection.parse()?;
    let observation = Observation::from_document(kind, &document)?;

    let id = with_timeout(
        state.backend_timeout,
        state.ingest_store.insert_observation(kind, &observation),
    )
    .await
    .map_err(|e| ProxyError::from_insert(kind.as_str(), e))?;

    let sensor_status = reconcile_sensor(state, &observation).await;
    tracing::debug!(
        %kind,
        sensor = %observation.sensor_name,
        %id,
        ?sensor_status,
        "observation stored"
    );

    Ok(IngestOutcome {
        kind,
        ack: true,
        id,
        sensor_status,
    })
}

/// Make sure the registry partition knows the observation's sensor.
///
/// A tracker hit skips the store entirely. On a miss the store is asked,
/// and the sensor written only if absent. Any store failure un-caches the
/// name so the next ingest for that sensor tries again.
async fn reconcile_sensor(state: &AppState, observation: &Observation) -> SensorStatus {
    // ---
    let name = observation.sensor_name.as_str();
    if state.registry.insert_if_absent(name) {
        return SensorStatus::AlreadyCached;
    }

    let exists = with_timeout(state.backend_timeout, state.ingest_store.sensor_exists(name)).await;
    let result = match exists {
        Ok(true) => Ok(false),
        Ok(false) => {
            with_timeout(
                state.backend_timeout,
                state.ingest_store.insert_sensor(&observation.sensor()),
            )
            .await
        }
        Err(e) => Err(e),
    };

    match result {
        Ok(true) => {
            tracing::info!(sensor = %name, tracked = state.registry.len(), "new sensor registered");
            SensorStatus::AddedToCacheAndStore
        }
        // Present already, or another ingest won the insert race.
        Ok(false) => SensorStatus::AddedToCacheOnly,
        Err(e) => {
            tracing::warn!(sensor = %name, error = %e, "sensor registry write failed");
            state.registry.forget(name);
            SensorStatus::StoreWriteFailed
        }
    }
}
