//! Error types for the controller.
//!
//! Defines custom error types with classification for retry behavior and
//! for best-effort call sites inside a reconcile cycle.

use std::time::Duration;
use thiserror::Error;

use crate::metadata::MetadataError;

/// How an error affects the reconcile cycle it occurs in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    /// Logged and swallowed at best-effort call sites.
    Ignorable,
    /// Aborts the cycle; the error policy requeues.
    AbortCycle,
}

/// Error type for controller operations
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// The cluster object is older than the StatefulSet it owns
    #[error("Staleness: cluster {name} resourceVersion {cluster_rv} is older than owner-rv {owner_rv}")]
    Staleness {
        name: String,
        cluster_rv: String,
        owner_rv: String,
    },

    /// ZooKeeper metadata store error
    #[error("Metadata store error: {0}")]
    MetadataStore(#[from] MetadataError),

    /// Missing required field in resource
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Validation error in resource spec
    #[error("Validation error: {0}")]
    Validation(String),

    /// Transient error that should be retried
    #[error("Transient error: {0}")]
    Transient(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Check if this error indicates a not-found condition
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Kube(kube::Error::Api(e)) if e.code == 404)
    }

    /// Check if this error is an optimistic-concurrency conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Kube(kube::Error::Api(e)) if e.code == 409)
    }

    /// Check if this error should be retried
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube(e) => {
                // Conflicts, rate limiting, server errors and transport failures
                matches!(
                    e,
                    kube::Error::Api(api_err)
                        if api_err.code >= 500 || api_err.code == 429 || api_err.code == 409
                ) || matches!(e, kube::Error::Service(_))
            }
            Error::Staleness { .. } | Error::MetadataStore(_) | Error::Transient(_) => true,
            Error::Validation(_) | Error::MissingField(_) => false,
            Error::Serialization(_) => false,
        }
    }

    /// Whether a best-effort call site may swallow this error.
    pub fn severity(&self) -> Severity {
        match self {
            _ if self.is_not_found() => Severity::Ignorable,
            _ => Severity::AbortCycle,
        }
    }

    /// Get the recommended requeue duration for this error
    pub fn requeue_after(&self) -> Duration {
        if self.is_retryable() {
            Duration::from_secs(30)
        } else {
            Duration::from_secs(300)
        }
    }

    /// Build a NotFound API error, as returned by the API server.
    pub fn not_found(kind: &str, name: &str) -> Self {
        Error::Kube(api_error(404, "NotFound", format!("{kind} \"{name}\" not found")))
    }

    /// Build an AlreadyExists API error.
    pub fn already_exists(kind: &str, name: &str) -> Self {
        Error::Kube(api_error(
            409,
            "AlreadyExists",
            format!("{kind} \"{name}\" already exists"),
        ))
    }

    /// Build an InternalError API error carrying `message`.
    pub fn internal(message: &str) -> Self {
        Error::Kube(api_error(500, "InternalError", message.to_string()))
    }

    /// Build a Conflict API error for a stale resourceVersion.
    pub fn conflict(kind: &str, name: &str) -> Self {
        Error::Kube(api_error(
            409,
            "Conflict",
            format!("Operation cannot be fulfilled on {kind} \"{name}\": the object has been modified"),
        ))
    }
}

fn api_error(code: u16, reason: &str, message: String) -> kube::Error {
    let body = serde_json::json!({
        "status": "Failure",
        "message": message,
        "reason": reason,
        "code": code,
    });
    match serde_json::from_value(body) {
        Ok(response) => kube::Error::Api(response),
        Err(e) => kube::Error::SerdeError(e),
    }
}

/// Result type alias for controller operations
pub type Result<T> = std::result::Result<T, Error>;
