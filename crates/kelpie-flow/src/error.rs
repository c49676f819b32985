//! Error types for flow execution.

use kelpie_store::{LockError, StoreError};
use std::time::Duration;
use thiserror::Error;

/// Error type for flow execution.
#[derive(Debug, Error)]
pub enum FlowError {
    /// A required parameter is missing or empty.
    #[error("missing or empty parameter: {0}")]
    MissingParameter(String),

    /// A parameter is present but has the wrong shape.
    #[error("parameter '{key}' has the wrong type: expected {expected}")]
    BadParameter { key: String, expected: &'static str },

    /// The requested storage software is not in the supported set.
    #[error("SDS '{0}' is not supported")]
    UnsupportedSds(String),

    /// Cluster names must not contain whitespace.
    #[error("whitespace not allowed in cluster name: '{0}'")]
    InvalidClusterName(String),

    /// Node locking failed; the flow is not retried.
    #[error("failed to lock nodes: {0}")]
    Lock(#[from] LockError),

    /// One or more SSH setup jobs failed.
    #[error("SSH setup failed for jobs {jobs:?} in cluster {integration_id}")]
    SshSetupFailed {
        jobs: Vec<String>,
        integration_id: String,
    },

    /// The storage-software install procedure failed.
    #[error("SDS install failed: {0}")]
    InstallFailed(String),

    /// Detection reported no cluster id for a node after the wait.
    #[error("no detected cluster id for node '{0}'")]
    DetectionIncomplete(String),

    /// The import sub-job failed.
    #[error("import of newly created cluster failed, job id: {job_id}")]
    ImportFailed { job_id: String },

    /// A poll loop exhausted its deadline.
    #[error("timed out after {0:?} waiting for {1}")]
    Timeout(Duration, String),

    /// Payload serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Store failure that survived the retry policy.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type for flow operations.
pub type Result<T> = std::result::Result<T, FlowError>;
