//! Error types for pv-migrate.
//!
//! All errors use `thiserror` for ergonomic error handling and proper error chains.

use thiserror::Error;

/// Result type alias for pv-migrate operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

/// Main error type for pv-migrate.
///
/// Every variant is fatal: the orchestrator never retries, it tears down the
/// run's ephemeral objects and reports the failure.
#[derive(Error, Debug)]
pub enum MigrateError {
    // Claim errors
    #[error("persistent volume claim {namespace}/{name} not found")]
    ClaimNotFound {
        namespace: String,
        name: String,
        #[source]
        source: kube::Error,
    },

    #[error("persistent volume claim {namespace}/{name} is not bound (phase: {phase})")]
    ClaimNotBound { namespace: String, name: String, phase: String },

    // Key material errors
    #[error("SSH key generation failed: {reason}")]
    KeyGen { reason: String },

    // Cluster object errors
    #[error("failed to create {kind} {name}: {source}")]
    Create {
        kind: &'static str,
        name: String,
        #[source]
        source: kube::Error,
    },

    #[error("service {name} has no usable address")]
    NoServiceAddress { name: String },

    #[error("pod {name} reached terminal phase {phase}")]
    PodTerminal { name: String, phase: String },

    #[error("watch stream for {name} ended before a terminal phase")]
    WatchClosed { name: String },

    // Generic cluster API errors
    #[error(transparent)]
    Api(#[from] kube::Error),

    #[error("watch failed: {0}")]
    Watch(#[from] kube::runtime::watcher::Error),
}
