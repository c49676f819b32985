//! Store client trait and error types.
//!
//! The trait abstracts the consistent store backend the same way the
//! rest of the system expects to use it: quorum reads and writes on
//! slash-delimited keys, with key absence reported in-band.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Transient connectivity loss. The retry layer reconnects once and
    /// retries the identical operation; a second failure propagates.
    #[error("store connection failure: {0}")]
    Connection(String),

    /// Non-retryable backend failure.
    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_connection(&self) -> bool {
        matches!(self, StoreError::Connection(_))
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// One immediate child returned by [`StoreClient::read_dir`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    /// Full key path of the child.
    pub key: String,
    /// Leaf value; empty for directory children.
    pub value: String,
    /// Whether the child is itself a directory.
    pub dir: bool,
}

impl KeyValue {
    /// Last path segment of the child key.
    pub fn segment(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }
}

/// Client for the hierarchical central store.
///
/// Implementations can back onto etcd, an in-memory map, or anything
/// else with linearizable single-key reads-after-writes. Key absence is
/// not an error condition: `read` returns `Ok(None)` and `read_dir`
/// returns an empty vector for a missing subtree.
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Quorum read of a single leaf.
    async fn read(&self, key: &str) -> Result<Option<String>>;

    /// List the immediate children of a directory key.
    async fn read_dir(&self, key: &str) -> Result<Vec<KeyValue>>;

    /// Write a single leaf. `quorum` requests a linearizable write.
    async fn write(&self, key: &str, value: &str, quorum: bool) -> Result<()>;

    /// Delete a leaf. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Write `value` at `key` only if the key does not already exist.
    ///
    /// Returns `true` if the key was created, `false` if it was already
    /// present. This is the primitive node locks are built on.
    async fn create(&self, key: &str, value: &str) -> Result<bool>;

    /// Refresh the lease on a subtree without touching its values.
    async fn refresh(&self, key: &str, ttl: Duration) -> Result<()>;

    /// Re-establish the connection after a [`StoreError::Connection`].
    async fn reconnect(&self) -> Result<()>;
}

/// Normalize a key to the canonical stored form (no leading or
/// trailing slashes). Callers pass keys in either style.
pub(crate) fn normalize(key: &str) -> &str {
    key.trim_matches('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("/queue/j1/status"), "queue/j1/status");
        assert_eq!(normalize("queue/j1/status/"), "queue/j1/status");
        assert_eq!(normalize("queue"), "queue");
    }

    #[test]
    fn test_key_value_segment() {
        let kv = KeyValue {
            key: "nodes/n1/DetectedCluster".to_string(),
            value: String::new(),
            dir: true,
        };
        assert_eq!(kv.segment(), "DetectedCluster");
    }

    #[test]
    fn test_error_classification() {
        assert!(StoreError::Connection("refused".into()).is_connection());
        assert!(!StoreError::Backend("bad key".into()).is_connection());
    }
}
