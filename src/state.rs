//! Shared application state handed to every request handler.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::credentials::{CredentialStore, Role};
use crate::registry::RegistryTracker;
use crate::store::Store;
use crate::{Config, ProxyError};

// ---

#[derive(Clone)]
pub struct AppState {
    // ---
    /// Storage backend as seen by ingest calls (read-write).
    pub ingest_store: Arc<dyn Store>,

    /// Storage backend as seen by query calls (read-only).
    pub query_store: Arc<dyn Store>,

    pub credentials: Arc<CredentialStore>,

    /// Process-wide sensor existence cache.
    pub registry: Arc<RegistryTracker>,

    /// Address clients must name as their target.
    pub target_host: Arc<str>,
    pub target_port: u16,

    /// Bound applied to every storage call.
    pub backend_timeout: Duration,

    pub started_at: Instant,
}

impl AppState {
    // ---
    pub fn new(cfg: &Config, store: Arc<dyn Store>, credentials: CredentialStore) -> Self {
        // ---
        Self {
            ingest_store: store.for_role(Role::Ingest),
            query_store: store.for_role(Role::Query),
            credentials: Arc::new(credentials),
            registry: Arc::new(RegistryTracker::new(cfg.registry_expected_sensors)),
            target_host: Arc::from(cfg.target_host.as_str()),
            target_port: cfg.target_port,
            backend_timeout: cfg.backend_timeout,
            started_at: Instant::now(),
        }
    }

    /// Check the caller's role credentials, then its target address.
    ///
    /// Both failures are `Unauthorized`; the credential check runs first so a
    /// caller without valid credentials learns nothing about the address.
    pub fn authorize(
        &self,
        role: Role,
        username: &str,
        password_hash: &str,
        host: &str,
        port: &str,
    ) -> Result<(), ProxyError> {
        // ---
        if !self.credentials.verify(role, username, password_hash) {
            let purpose = match role {
                Role::Ingest => "data generation",
                Role::Query => "web view",
            };
            return Err(ProxyError::Unauthorized(format!(
                "invalid username or password for {purpose} API call."
            )));
        }

        let port_matches = port.trim().parse::<u16>().ok() == Some(self.target_port);
        if host.trim() != &*self.target_host || !port_matches {
            tracing::warn!(%host, %port, "client targeted a different proxy address");
            return Err(ProxyError::Unauthorized("invalid host or port.".to_string()));
        }

        Ok(())
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Unwrap a required request field.
pub fn require(value: Option<String>, field: &str) -> Result<String, ProxyError> {
    value.ok_or_else(|| ProxyError::MissingField(field.to_string()))
}


#[cfg(test)]
mod tests {
    // ---
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_authorize_accepts_matching_caller() {
        // ---
        let (state, _) = memory_state();
        assert!(state
            .authorize(Role::Ingest, INGEST_ROLE, &ingest_hash(), TARGET_HOST, TARGET_PORT)
            .is_ok());
    }

    #[test]
    fn test_authorize_rejects_wrong_role_secret() {
        // ---
        let (state, _) = memory_state();
        let err = state
            .authorize(Role::Ingest, INGEST_ROLE, &query_hash(), TARGET_HOST, TARGET_PORT)
            .unwrap_err();
        assert!(matches!(err, ProxyError::Unauthorized(_)));
    }

    #[test]
    fn test_authorize_rejects_other_target() {
        // ---
        let (state, _) = memory_state();
        for (host, port) in [("localhost", TARGET_PORT), (TARGET_HOST, "8000"), (TARGET_HOST, "abc")] {
            let err = state
                .authorize(Role::Query, QUERY_ROLE, &query_hash(), host, port)
                .unwrap_err();
            assert!(matches!(err, ProxyError::Unauthorized(msg) if msg.contains("host or port")));
        }
    }
}
