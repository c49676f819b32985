//! In-memory store backend.
//!
//! Used by tests and standalone mode, the same role the memory state
//! store plays for the workflow engine. Besides the plain map it keeps
//! a write counter (so tests can assert that hash-deduplicated saves
//! skipped their writes) and a connection-fault hook for exercising the
//! retry layer.

use crate::client::{normalize, KeyValue, Result, StoreClient, StoreError};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// In-memory [`StoreClient`] backed by an ordered map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Mutex<BTreeMap<String, String>>,
    writes: AtomicU64,
    refreshes: AtomicU64,
    reconnects: AtomicU64,
    fail_next: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of leaf writes performed so far.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of lease refreshes requested so far.
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::SeqCst)
    }

    /// Number of reconnects requested so far.
    pub fn reconnect_count(&self) -> u64 {
        self.reconnects.load(Ordering::SeqCst)
    }

    /// Make the next `n` operations fail with a connection error.
    pub fn fail_next_ops(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Snapshot of all stored keys, for test assertions.
    pub fn keys(&self) -> Vec<String> {
        self.data.lock().unwrap().keys().cloned().collect()
    }

    fn check_fault(&self) -> Result<()> {
        let mut remaining = self.fail_next.load(Ordering::SeqCst);
        while remaining > 0 {
            match self.fail_next.compare_exchange(
                remaining,
                remaining - 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return Err(StoreError::Connection("injected fault".to_string())),
                Err(actual) => remaining = actual,
            }
        }
        Ok(())
    }
}

#[async_trait]
impl StoreClient for MemoryStore {
    async fn read(&self, key: &str) -> Result<Option<String>> {
        self.check_fault()?;
        Ok(self.data.lock().unwrap().get(normalize(key)).cloned())
    }

    async fn read_dir(&self, key: &str) -> Result<Vec<KeyValue>> {
        self.check_fault()?;
        let prefix = format!("{}/", normalize(key));
        let data = self.data.lock().unwrap();

        let mut children: Vec<KeyValue> = Vec::new();
        for (stored, value) in data.range(prefix.clone()..) {
            let Some(rest) = stored.strip_prefix(&prefix) else {
                break;
            };
            match rest.split_once('/') {
                // Deeper descendant: surface the immediate child as a
                // directory, once.
                Some((first, _)) => {
                    let child_key = format!("{}{}", prefix, first);
                    if children.last().map(|c| c.key.as_str()) != Some(child_key.as_str()) {
                        children.push(KeyValue {
                            key: child_key,
                            value: String::new(),
                            dir: true,
                        });
                    }
                }
                None => children.push(KeyValue {
                    key: stored.clone(),
                    value: value.clone(),
                    dir: false,
                }),
            }
        }
        Ok(children)
    }

    async fn write(&self, key: &str, value: &str, _quorum: bool) -> Result<()> {
        self.check_fault()?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.data
            .lock()
            .unwrap()
            .insert(normalize(key).to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.check_fault()?;
        self.data.lock().unwrap().remove(normalize(key));
        Ok(())
    }

    async fn create(&self, key: &str, value: &str) -> Result<bool> {
        self.check_fault()?;
        let mut data = self.data.lock().unwrap();
        let key = normalize(key).to_string();
        if data.contains_key(&key) {
            return Ok(false);
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        data.insert(key, value.to_string());
        Ok(true)
    }

    async fn refresh(&self, _key: &str, _ttl: Duration) -> Result<()> {
        // Leases are a backend concern; the memory store only counts
        // the requests so tests can assert them.
        self.check_fault()?;
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn reconnect(&self) -> Result<()> {
        self.reconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_write_delete() {
        let store = MemoryStore::new();
        assert_eq!(store.read("/queue/j1/status").await.unwrap(), None);

        store.write("/queue/j1/status", "new", true).await.unwrap();
        assert_eq!(
            store.read("queue/j1/status").await.unwrap().as_deref(),
            Some("new")
        );

        store.delete("/queue/j1/status").await.unwrap();
        assert_eq!(store.read("/queue/j1/status").await.unwrap(), None);
        // Deleting again is fine.
        store.delete("/queue/j1/status").await.unwrap();
    }

    #[tokio::test]
    async fn test_read_dir_mixes_leaves_and_dirs() {
        let store = MemoryStore::new();
        store.write("clusters/c1/sync_status", "done", true).await.unwrap();
        store.write("clusters/c2/sync_status", "new", true).await.unwrap();
        store.write("clusters/marker", "x", true).await.unwrap();

        let children = store.read_dir("/clusters").await.unwrap();
        assert_eq!(children.len(), 3);
        assert!(children
            .iter()
            .any(|c| c.key == "clusters/c1" && c.dir));
        assert!(children
            .iter()
            .any(|c| c.key == "clusters/c2" && c.dir));
        assert!(children
            .iter()
            .any(|c| c.key == "clusters/marker" && !c.dir && c.value == "x"));
    }

    #[tokio::test]
    async fn test_read_dir_absent_is_empty() {
        let store = MemoryStore::new();
        assert!(store.read_dir("/nowhere").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_read_dir_does_not_leak_siblings() {
        let store = MemoryStore::new();
        store.write("nodes/n1/fqdn", "a", true).await.unwrap();
        store.write("nodes2/n9/fqdn", "b", true).await.unwrap();

        let children = store.read_dir("nodes").await.unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].key, "nodes/n1");
    }

    #[tokio::test]
    async fn test_create_only_if_absent() {
        let store = MemoryStore::new();
        assert!(store.create("locks/nodes/n1", "flow-1").await.unwrap());
        assert!(!store.create("locks/nodes/n1", "flow-2").await.unwrap());
        assert_eq!(
            store.read("locks/nodes/n1").await.unwrap().as_deref(),
            Some("flow-1")
        );
    }

    #[tokio::test]
    async fn test_write_counter() {
        let store = MemoryStore::new();
        store.write("a", "1", true).await.unwrap();
        store.write("a", "2", true).await.unwrap();
        store.read("a").await.unwrap();
        assert_eq!(store.write_count(), 2);
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let store = MemoryStore::new();
        store.fail_next_ops(1);
        assert!(matches!(
            store.read("a").await,
            Err(StoreError::Connection(_))
        ));
        assert_eq!(store.read("a").await.unwrap(), None);
    }
}
