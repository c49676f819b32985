//! Reconnect-once retry policy.
//!
//! On a connection failure the wrapper reconnects exactly once and
//! retries the identical operation; a second failure propagates to the
//! caller. Backend errors and key absence pass through untouched. All
//! higher layers (entities, locks, flows) talk to the store through
//! this wrapper so the policy is applied uniformly.

use crate::client::{KeyValue, Result, StoreClient, StoreError};
use async_trait::async_trait;
use std::time::Duration;
use tracing::warn;

/// [`StoreClient`] wrapper applying the reconnect-once retry policy.
#[derive(Debug)]
pub struct RetryingStore<S> {
    inner: S,
}

impl<S: StoreClient> RetryingStore<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    /// Access the wrapped client.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    async fn recover(&self, op: &str, key: &str, err: &StoreError) -> Result<()> {
        warn!(op, key, error = %err, "store connection lost, reconnecting");
        self.inner.reconnect().await
    }
}

#[async_trait]
impl<S: StoreClient> StoreClient for RetryingStore<S> {
    async fn read(&self, key: &str) -> Result<Option<String>> {
        match self.inner.read(key).await {
            Err(err) if err.is_connection() => {
                self.recover("read", key, &err).await?;
                self.inner.read(key).await
            }
            other => other,
        }
    }

    async fn read_dir(&self, key: &str) -> Result<Vec<KeyValue>> {
        match self.inner.read_dir(key).await {
            Err(err) if err.is_connection() => {
                self.recover("read_dir", key, &err).await?;
                self.inner.read_dir(key).await
            }
            other => other,
        }
    }

    async fn write(&self, key: &str, value: &str, quorum: bool) -> Result<()> {
        match self.inner.write(key, value, quorum).await {
            Err(err) if err.is_connection() => {
                self.recover("write", key, &err).await?;
                self.inner.write(key, value, quorum).await
            }
            other => other,
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match self.inner.delete(key).await {
            Err(err) if err.is_connection() => {
                self.recover("delete", key, &err).await?;
                self.inner.delete(key).await
            }
            other => other,
        }
    }

    async fn create(&self, key: &str, value: &str) -> Result<bool> {
        match self.inner.create(key, value).await {
            Err(err) if err.is_connection() => {
                self.recover("create", key, &err).await?;
                self.inner.create(key, value).await
            }
            other => other,
        }
    }

    async fn refresh(&self, key: &str, ttl: Duration) -> Result<()> {
        match self.inner.refresh(key, ttl).await {
            Err(err) if err.is_connection() => {
                self.recover("refresh", key, &err).await?;
                self.inner.refresh(key, ttl).await
            }
            other => other,
        }
    }

    async fn reconnect(&self) -> Result<()> {
        self.inner.reconnect().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    #[tokio::test]
    async fn test_retry_recovers_single_failure() {
        let store = RetryingStore::new(MemoryStore::new());
        store.inner().write("a", "1", true).await.unwrap();

        store.inner().fail_next_ops(1);
        assert_eq!(store.read("a").await.unwrap().as_deref(), Some("1"));
        assert_eq!(store.inner().reconnect_count(), 1);
    }

    #[tokio::test]
    async fn test_second_failure_propagates() {
        let store = RetryingStore::new(MemoryStore::new());

        store.inner().fail_next_ops(2);
        assert!(matches!(
            store.read("a").await,
            Err(StoreError::Connection(_))
        ));
        assert_eq!(store.inner().reconnect_count(), 1);
    }

    #[tokio::test]
    async fn test_absence_is_not_retried() {
        let store = RetryingStore::new(MemoryStore::new());
        assert_eq!(store.read("missing").await.unwrap(), None);
        assert_eq!(store.inner().reconnect_count(), 0);
    }

    #[tokio::test]
    async fn test_write_retry() {
        let store = RetryingStore::new(MemoryStore::new());
        store.inner().fail_next_ops(1);
        store.write("a", "1", true).await.unwrap();
        assert_eq!(store.read("a").await.unwrap().as_deref(), Some("1"));
    }
}
