//! Role credentials, hashed once at startup.
//!
//! Clients never send their secret; they send the SHA-256 hex digest of the
//! secret file's bytes. The proxy computes the same digest from its own copy
//! of the file when it starts and only ever compares digests afterwards.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::Config;

// ---

/// The two fixed roles the proxy knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Generator clients writing observations.
    Ingest,
    /// Dashboard clients reading aggregates.
    Query,
}

#[derive(Debug, Clone)]
struct Credential {
    name: String,
    digest: String,
}

/// Immutable store of the two role credentials.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    ingest: Credential,
    query: Credential,
}

impl CredentialStore {
    // ---
    /// Read and hash both secret files named in the configuration.
    ///
    /// A missing or unreadable file is an error; the caller treats it as
    /// fatal and refuses to start.
    pub fn load(cfg: &Config) -> Result<Self> {
        // ---
        let ingest = read_digest(&cfg.ingest_password_file)?;
        let query = read_digest(&cfg.query_password_file)?;

        tracing::info!(
            ingest_role = %cfg.ingest_role,
            query_role = %cfg.query_role,
            "role credentials loaded"
        );

        Ok(Self::from_digests(
            (&cfg.ingest_role, ingest),
            (&cfg.query_role, query),
        ))
    }

    /// Build a store from already-hashed secrets.
    pub fn from_digests(ingest: (&str, String), query: (&str, String)) -> Self {
        // ---
        Self {
            ingest: Credential {
                name: ingest.0.to_string(),
                digest: ingest.1,
            },
            query: Credential {
                name: query.0.to_string(),
                digest: query.1,
            },
        }
    }

    /// True when `name` is the configured name of `role` and `password_hash`
    /// equals that role's digest.
    pub fn verify(&self, role: Role, name: &str, password_hash: &str) -> bool {
        // ---
        let cred = match role {
            Role::Ingest => &self.ingest,
            Role::Query => &self.query,
        };
        let presented = password_hash.trim().to_ascii_lowercase();
        let matches: bool = if cred.digest.len() == presented.len() {
            cred.digest.as_bytes().ct_eq(presented.as_bytes()).into()
        } else {
            false
        };
        cred.name == name && matches
    }
}

/// SHA-256 hex digest of `secret`, exactly as clients compute it.
pub fn hash_secret(secret: &[u8]) -> String {
    hex::encode(Sha256::digest(secret))
}

fn read_digest(path: &Path) -> Result<String> {
    // ---
    let secret =
        fs::read(path).with_context(|| format!("cannot read secret file {}", path.display()))?;
    Ok(hash_secret(&secret))
}
