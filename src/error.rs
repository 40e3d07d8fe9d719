//! Request-level error taxonomy and its HTTP mapping.
//!
//! Every expected failure branch of an ingest or query call is one of these
//! variants. They are recovered at the route boundary through
//! [`IntoResponse`], so none of them can take the process down.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// A required request or document field was absent.
    #[error("Invalid request: missing field '{0}'.")]
    MissingField(String),

    /// A field was present but could not be decoded.
    #[error("Invalid request: invalid format ({0}).")]
    InvalidFormat(String),

    /// Client credentials or target address did not match.
    #[error("Invalid request: {0}")]
    Unauthorized(String),

    /// The storage backend rejected our own credentials.
    #[error("Authentication with the storage backend rejected: {0}")]
    Forbidden(String),

    #[error("Insert into partition '{kind}' failed: {reason}")]
    InsertFailure { kind: String, reason: String },

    #[error("Query failed: {0}")]
    QueryFailure(String),

    #[error("Invalid request: unknown purpose '{0}'.")]
    UnknownPurpose(String),
}

impl ProxyError {
    // ---
    /// Map a backend failure on the write path.
    pub fn from_insert(kind: &str, err: StoreError) -> Self {
        match err {
            StoreError::AuthRejected(msg) => ProxyError::Forbidden(msg),
            other => ProxyError::InsertFailure {
                kind: kind.to_string(),
                reason: other.to_string(),
            },
        }
    }

    /// Map a backend failure on the read path.
    pub fn from_query(err: StoreError) -> Self {
        match err {
            StoreError::AuthRejected(msg) => ProxyError::Forbidden(msg),
            other => ProxyError::QueryFailure(other.to_string()),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        // ---
        match self {
            ProxyError::MissingField(_)
            | ProxyError::InvalidFormat(_)
            | ProxyError::UnknownPurpose(_)
            | ProxyError::InsertFailure { .. }
            | ProxyError::QueryFailure(_) => StatusCode::BAD_REQUEST,
            ProxyError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ProxyError::Forbidden(_) => StatusCode::FORBIDDEN,
        }
    }

    fn status_label(&self) -> &'static str {
        match self {
            ProxyError::Unauthorized(_) => "Unauthorized",
            ProxyError::Forbidden(_) => "Forbidden",
            _ => "Error",
        }
    }
}

/// JSON error body, mirroring the success envelope without a payload.
#[derive(Debug, Serialize)]
struct ErrorBody {
    status: &'static str,
    message: String,
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        // ---
        let status = self.status_code();
        match &self {
            ProxyError::InsertFailure { .. } | ProxyError::QueryFailure(_) => {
                tracing::error!(error = %self, "backend operation failed")
            }
            ProxyError::Forbidden(_) => tracing::warn!(error = %self, "backend rejected credentials"),
            _ => tracing::debug!(error = %self, "request rejected"),
        }

        let body = ErrorBody {
            status: self.status_label(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_status_mapping() {
        // ---
        assert_eq!(ProxyError::MissingField("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ProxyError::InvalidFormat("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ProxyError::UnknownPurpose("7".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ProxyError::Unauthorized("x".into()).status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ProxyError::Forbidden("x".into()).status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ProxyError::QueryFailure("x".into()).status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_backend_auth_rejection_becomes_forbidden() {
        // ---
        let err = ProxyError::from_insert("temp_c", StoreError::AuthRejected("28P01".into()));
        assert!(matches!(err, ProxyError::Forbidden(_)));

        let err = ProxyError::from_insert("temp_c", StoreError::Timeout);
        assert!(matches!(err, ProxyError::InsertFailure { .. }));

        let err = ProxyError::from_query(StoreError::Backend("boom".into()));
        assert!(matches!(err, ProxyError::QueryFailure(_)));
    }
}
