//! Distributed per-node locks.
//!
//! Exactly one flow may operate on a node at a time. A lock is the
//! presence of a key under `locks/nodes/<node_id>`, valued with the
//! owning flow id; absence means unlocked. Acquisition over a node set
//! is all-or-nothing: a half-locked set would deadlock or corrupt
//! concurrent flows operating on overlapping sets.

use crate::client::{StoreClient, StoreError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

const LOCK_ROOT: &str = "locks/nodes";

/// Error type for lock operations.
#[derive(Debug, Error)]
pub enum LockError {
    /// A node in the requested set is already locked by another flow.
    #[error("node '{node}' is already locked by '{holder}'")]
    Held { node: String, holder: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type for lock operations.
pub type Result<T> = std::result::Result<T, LockError>;

/// Manager for per-node mutual-exclusion claims.
#[derive(Clone)]
pub struct NodeLockManager {
    store: Arc<dyn StoreClient>,
}

impl NodeLockManager {
    pub fn new(store: Arc<dyn StoreClient>) -> Self {
        Self { store }
    }

    fn lock_key(node_id: &str) -> String {
        format!("{}/{}", LOCK_ROOT, node_id)
    }

    /// Claim every node in `node_ids` for `owner`, all-or-nothing.
    ///
    /// On the first node that is already held, every claim made so far
    /// is rolled back before the error is returned, so a failed acquire
    /// never leaves partial state behind.
    pub async fn acquire(&self, node_ids: &[String], owner: &str) -> Result<()> {
        let mut claimed: Vec<String> = Vec::with_capacity(node_ids.len());

        for node in node_ids {
            let key = Self::lock_key(node);
            match self.store.create(&key, owner).await {
                Ok(true) => {
                    debug!(node = %node, owner, "node locked");
                    claimed.push(key);
                }
                Ok(false) => {
                    let holder = self
                        .store
                        .read(&key)
                        .await
                        .ok()
                        .flatten()
                        .unwrap_or_default();
                    self.rollback(&claimed).await;
                    return Err(LockError::Held {
                        node: node.clone(),
                        holder,
                    });
                }
                Err(err) => {
                    self.rollback(&claimed).await;
                    return Err(err.into());
                }
            }
        }
        Ok(())
    }

    /// Release the claims on `node_ids` unconditionally.
    ///
    /// Idempotent: absent keys are fine, and a failure to delete one
    /// key does not stop the remaining releases. Flows call this on
    /// every exit path.
    pub async fn release(&self, node_ids: &[String]) {
        for node in node_ids {
            let key = Self::lock_key(node);
            if let Err(err) = self.store.delete(&key).await {
                warn!(node = %node, error = %err, "failed to release node lock");
            } else {
                debug!(node = %node, "node lock released");
            }
        }
    }

    /// Current holder of a node's lock, if any.
    pub async fn holder(&self, node_id: &str) -> Result<Option<String>> {
        Ok(self.store.read(&Self::lock_key(node_id)).await?)
    }

    async fn rollback(&self, claimed: &[String]) {
        for key in claimed {
            if let Err(err) = self.store.delete(key).await {
                warn!(key = %key, error = %err, "failed to roll back partial lock claim");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::retry::RetryingStore;

    fn manager() -> (NodeLockManager, Arc<RetryingStore<MemoryStore>>) {
        let store = Arc::new(RetryingStore::new(MemoryStore::new()));
        (NodeLockManager::new(store.clone()), store)
    }

    fn nodes(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_acquire_and_release() {
        let (locks, _store) = manager();
        let set = nodes(&["n1", "n2"]);

        locks.acquire(&set, "flow-1").await.unwrap();
        assert_eq!(locks.holder("n1").await.unwrap().as_deref(), Some("flow-1"));

        locks.release(&set).await;
        assert_eq!(locks.holder("n1").await.unwrap(), None);
        assert_eq!(locks.holder("n2").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_overlapping_sets_excluded() {
        let (locks, _store) = manager();
        locks.acquire(&nodes(&["n1", "n2"]), "flow-1").await.unwrap();

        let err = locks
            .acquire(&nodes(&["n2", "n3"]), "flow-2")
            .await
            .unwrap_err();
        assert!(matches!(err, LockError::Held { ref node, ref holder }
            if node == "n2" && holder == "flow-1"));

        // After release the overlapping set can be acquired.
        locks.release(&nodes(&["n1", "n2"])).await;
        locks.acquire(&nodes(&["n2", "n3"]), "flow-2").await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_acquire_leaves_no_residue() {
        let (locks, _store) = manager();
        locks.acquire(&nodes(&["n2"]), "flow-1").await.unwrap();

        // n1 gets claimed first, then n2 refuses; n1 must be rolled back.
        assert!(locks.acquire(&nodes(&["n1", "n2"]), "flow-2").await.is_err());
        assert_eq!(locks.holder("n1").await.unwrap(), None);
        assert_eq!(locks.holder("n2").await.unwrap().as_deref(), Some("flow-1"));
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let (locks, _store) = manager();
        let set = nodes(&["n1"]);
        locks.acquire(&set, "flow-1").await.unwrap();
        locks.release(&set).await;
        locks.release(&set).await;
        assert_eq!(locks.holder("n1").await.unwrap(), None);
    }
}
