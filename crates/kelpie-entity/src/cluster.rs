//! Cluster records.

use crate::def::{EntityDef, FieldDef, FieldKind};
use crate::persist::{Entity, Enumerable};
use crate::value::FieldValue;
use std::collections::BTreeMap;

/// Parent directory of all clusters.
pub const CLUSTER_ROOT: &str = "clusters";

/// Terminal value of `sync_status`, set by the import workflow.
pub const SYNC_DONE: &str = "done";

/// A storage cluster keyed by its integration id.
///
/// The creating flow persists the network configuration; the external
/// detection/import machinery advances `sync_status` to [`SYNC_DONE`]
/// once the cluster is fully imported.
#[derive(Debug, Clone, Default)]
pub struct Cluster {
    pub integration_id: String,
    pub public_network: Option<String>,
    pub cluster_network: Option<String>,
    pub sync_status: Option<String>,
    pub last_sync: Option<String>,
    hash: Option<String>,
    updated_at: Option<String>,
}

static CLUSTER_DEF: EntityDef = EntityDef::new(
    "Cluster",
    &[
        FieldDef::new("integration_id", FieldKind::Scalar),
        FieldDef::new("public_network", FieldKind::Scalar),
        FieldDef::new("cluster_network", FieldKind::Scalar),
        FieldDef::new("sync_status", FieldKind::Scalar),
        FieldDef::new("last_sync", FieldKind::Scalar),
    ],
);

impl Cluster {
    pub fn new(integration_id: impl Into<String>) -> Self {
        Self {
            integration_id: integration_id.into(),
            ..Default::default()
        }
    }

    pub fn with_public_network(mut self, network: impl Into<String>) -> Self {
        self.public_network = Some(network.into());
        self
    }

    pub fn with_cluster_network(mut self, network: impl Into<String>) -> Self {
        self.cluster_network = Some(network.into());
        self
    }

    /// Whether the import workflow has finished syncing this cluster.
    pub fn is_synced(&self) -> bool {
        self.sync_status.as_deref() == Some(SYNC_DONE)
    }
}

impl Entity for Cluster {
    fn def() -> &'static EntityDef {
        &CLUSTER_DEF
    }

    fn key_path(&self) -> String {
        format!("{}/{}", CLUSTER_ROOT, self.integration_id)
    }

    fn fields(&self) -> BTreeMap<&'static str, FieldValue> {
        let mut fields = BTreeMap::new();
        fields.insert(
            "integration_id",
            FieldValue::Scalar(self.integration_id.clone()),
        );
        if let Some(network) = &self.public_network {
            fields.insert("public_network", FieldValue::Scalar(network.clone()));
        }
        if let Some(network) = &self.cluster_network {
            fields.insert("cluster_network", FieldValue::Scalar(network.clone()));
        }
        if let Some(status) = &self.sync_status {
            fields.insert("sync_status", FieldValue::Scalar(status.clone()));
        }
        if let Some(at) = &self.last_sync {
            fields.insert("last_sync", FieldValue::Scalar(at.clone()));
        }
        fields
    }

    fn set_field(&mut self, name: &str, value: FieldValue) {
        let FieldValue::Scalar(s) = value else {
            return;
        };
        match name {
            "integration_id" => self.integration_id = s,
            "public_network" => self.public_network = Some(s),
            "cluster_network" => self.cluster_network = Some(s),
            "sync_status" => self.sync_status = Some(s),
            "last_sync" => self.last_sync = Some(s),
            _ => {}
        }
    }

    fn fresh(&self) -> Self {
        Cluster::new(self.integration_id.clone())
    }

    fn stored_hash(&self) -> Option<&str> {
        self.hash.as_deref()
    }

    fn set_stored_hash(&mut self, hash: Option<String>) {
        self.hash = hash;
    }

    fn updated_at(&self) -> Option<&str> {
        self.updated_at.as_deref()
    }

    fn set_updated_at(&mut self, at: Option<String>) {
        self.updated_at = at;
    }
}

impl Enumerable for Cluster {
    fn parent_path() -> &'static str {
        CLUSTER_ROOT
    }

    fn from_segment(segment: &str) -> Self {
        Cluster::new(segment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::StoreContext;
    use crate::persist::Persist;
    use kelpie_store::{MemoryStore, RetryingStore, StoreClient};
    use std::sync::Arc;

    fn context() -> StoreContext {
        StoreContext::new(Arc::new(RetryingStore::new(MemoryStore::new())), "test")
    }

    #[tokio::test]
    async fn test_cluster_save_load() {
        let ctx = context();
        let mut cluster = Cluster::new("int-1")
            .with_public_network("10.0.0.0/24")
            .with_cluster_network("192.168.0.0/24");
        cluster.save(&ctx).await.unwrap();

        let loaded = Cluster::new("int-1").load(&ctx).await.unwrap();
        assert_eq!(loaded.public_network.as_deref(), Some("10.0.0.0/24"));
        assert_eq!(loaded.cluster_network.as_deref(), Some("192.168.0.0/24"));
        assert!(!loaded.is_synced());
    }

    #[tokio::test]
    async fn test_sync_status_advanced_externally() {
        let ctx = context();
        let mut cluster = Cluster::new("int-1");
        cluster.save(&ctx).await.unwrap();

        ctx.store
            .write("clusters/int-1/sync_status", SYNC_DONE, true)
            .await
            .unwrap();
        let loaded = Cluster::new("int-1").load(&ctx).await.unwrap();
        assert!(loaded.is_synced());
    }
}
