//! Per-node records: the node's own context and the storage software
//! detected on it.

use crate::def::{EntityDef, FieldDef, FieldKind};
use crate::persist::Entity;
use crate::value::FieldValue;
use std::collections::BTreeMap;

/// Parent directory of all per-node records.
pub const NODE_ROOT: &str = "nodes";

/// Identity and tags of a managed node.
#[derive(Debug, Clone, Default)]
pub struct NodeContext {
    pub node_id: String,
    pub fqdn: Option<String>,
    pub tags: Option<Vec<String>>,
    hash: Option<String>,
    updated_at: Option<String>,
}

static NODE_CONTEXT_DEF: EntityDef = EntityDef::new(
    "NodeContext",
    &[
        FieldDef::new("node_id", FieldKind::Scalar),
        FieldDef::new("fqdn", FieldKind::Scalar),
        FieldDef::new("tags", FieldKind::List),
    ],
);

impl NodeContext {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            ..Default::default()
        }
    }

    /// Add a tag, keeping the set unique and sorted.
    pub fn add_tag(&mut self, tag: impl Into<String>) {
        let mut tags = self.tags.take().unwrap_or_default();
        let tag = tag.into();
        if !tags.contains(&tag) {
            tags.push(tag);
        }
        tags.sort();
        self.tags = Some(tags);
    }
}

impl Entity for NodeContext {
    fn def() -> &'static EntityDef {
        &NODE_CONTEXT_DEF
    }

    fn key_path(&self) -> String {
        format!("{}/{}/NodeContext", NODE_ROOT, self.node_id)
    }

    fn fields(&self) -> BTreeMap<&'static str, FieldValue> {
        let mut fields = BTreeMap::new();
        fields.insert("node_id", FieldValue::Scalar(self.node_id.clone()));
        if let Some(fqdn) = &self.fqdn {
            fields.insert("fqdn", FieldValue::Scalar(fqdn.clone()));
        }
        if let Some(tags) = &self.tags {
            fields.insert("tags", FieldValue::List(tags.clone()));
        }
        fields
    }

    fn set_field(&mut self, name: &str, value: FieldValue) {
        match (name, value) {
            ("node_id", FieldValue::Scalar(s)) => self.node_id = s,
            ("fqdn", FieldValue::Scalar(s)) => self.fqdn = Some(s),
            ("tags", FieldValue::List(items)) => self.tags = Some(items),
            _ => {}
        }
    }

    fn fresh(&self) -> Self {
        NodeContext::new(self.node_id.clone())
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

/// Storage software discovered on a node by the external detection
/// agent. Read-only for flows: the agent owns these leaves.
#[derive(Debug, Clone, Default)]
pub struct DetectedCluster {
    pub node_id: String,
    pub detected_cluster_id: Option<String>,
    pub sds_pkg_name: Option<String>,
    pub sds_pkg_version: Option<String>,
    hash: Option<String>,
    updated_at: Option<String>,
}

static DETECTED_CLUSTER_DEF: EntityDef = EntityDef::new(
    "DetectedCluster",
    &[
        FieldDef::new("detected_cluster_id", FieldKind::Scalar),
        FieldDef::new("sds_pkg_name", FieldKind::Scalar),
        FieldDef::new("sds_pkg_version", FieldKind::Scalar),
    ],
);

impl DetectedCluster {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            ..Default::default()
        }
    }

    /// Key whose appearance signals that detection completed on a node.
    pub fn detected_id_key(node_id: &str) -> String {
        format!("{}/{}/DetectedCluster/detected_cluster_id", NODE_ROOT, node_id)
    }
}

impl Entity for DetectedCluster {
    fn def() -> &'static EntityDef {
        &DETECTED_CLUSTER_DEF
    }

    fn key_path(&self) -> String {
        format!("{}/{}/DetectedCluster", NODE_ROOT, self.node_id)
    }

    fn fields(&self) -> BTreeMap<&'static str, FieldValue> {
        let mut fields = BTreeMap::new();
        if let Some(id) = &self.detected_cluster_id {
            fields.insert("detected_cluster_id", FieldValue::Scalar(id.clone()));
        }
        if let Some(name) = &self.sds_pkg_name {
            fields.insert("sds_pkg_name", FieldValue::Scalar(name.clone()));
        }
        if let Some(version) = &self.sds_pkg_version {
            fields.insert("sds_pkg_version", FieldValue::Scalar(version.clone()));
        }
        fields
    }

    fn set_field(&mut self, name: &str, value: FieldValue) {
        let FieldValue::Scalar(s) = value else {
            return;
        };
        match name {
            "detected_cluster_id" => self.detected_cluster_id = Some(s),
            "sds_pkg_name" => self.sds_pkg_name = Some(s),
            "sds_pkg_version" => self.sds_pkg_version = Some(s),
            _ => {}
        }
    }

    fn fresh(&self) -> Self {
        DetectedCluster::new(self.node_id.clone())
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
    async fn test_add_tag_is_unique_and_sorted() {
        let mut node = NodeContext::new("n1");
        node.tags = Some(vec!["zeta".to_string()]);
        node.add_tag("provisioner/int-1");
        node.add_tag("provisioner/int-1");

        assert_eq!(
            node.tags,
            Some(vec!["provisioner/int-1".to_string(), "zeta".to_string()])
        );
    }

    #[tokio::test]
    async fn test_node_context_round_trip() {
        let ctx = context();
        let mut node = NodeContext::new("n1");
        node.fqdn = Some("n1.lab".to_string());
        node.add_tag("gluster/server");
        node.save(&ctx).await.unwrap();

        let loaded = NodeContext::new("n1").load(&ctx).await.unwrap();
        assert_eq!(loaded.fqdn.as_deref(), Some("n1.lab"));
        assert_eq!(loaded.tags, Some(vec!["gluster/server".to_string()]));
    }

    #[tokio::test]
    async fn test_detected_cluster_written_by_agent() {
        let ctx = context();
        // The detection agent writes plain leaves, no entity machinery.
        ctx.store
            .write(&DetectedCluster::detected_id_key("n1"), "dc-9", true)
            .await
            .unwrap();
        ctx.store
            .write("nodes/n1/DetectedCluster/sds_pkg_name", "gluster", true)
            .await
            .unwrap();

        let loaded = DetectedCluster::new("n1").load(&ctx).await.unwrap();
        assert_eq!(loaded.detected_cluster_id.as_deref(), Some("dc-9"));
        assert_eq!(loaded.sds_pkg_name.as_deref(), Some("gluster"));
        assert_eq!(loaded.sds_pkg_version, None);
    }
}
