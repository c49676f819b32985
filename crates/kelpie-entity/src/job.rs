//! Queued jobs.
//!
//! A job is a persisted unit of asynchronous work under
//! `queue/<job_id>`. Dispatchers create it with status `new`; a remote
//! executor transitions it out of band; the flow that spawned it only
//! ever observes it by polling.

use crate::def::{EntityDef, FieldDef, FieldKind};
use crate::persist::{Entity, Enumerable};
use crate::value::FieldValue;
use kelpie_common::JobStatus;
use std::collections::BTreeMap;

/// Parent directory of all jobs.
pub const JOB_ROOT: &str = "queue";

/// A persisted job record.
#[derive(Debug, Clone, Default)]
pub struct Job {
    pub job_id: String,
    pub status: Option<JobStatus>,
    /// Opaque payload map; carries at minimum the flow identifier to
    /// run and its parameters.
    pub payload: Option<serde_json::Value>,
    /// Id of the job that spawned this one, if any.
    pub parent: Option<String>,
    /// Errors recorded by the executor, if any.
    pub errors: Option<serde_json::Value>,
    hash: Option<String>,
    updated_at: Option<String>,
}

static JOB_DEF: EntityDef = EntityDef::new(
    "Job",
    &[
        FieldDef::new("job_id", FieldKind::Scalar),
        FieldDef::new("status", FieldKind::Scalar),
        FieldDef::new("payload", FieldKind::Json),
        FieldDef::new("parent", FieldKind::Scalar),
        FieldDef::new("errors", FieldKind::Json),
    ],
);

impl Job {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Key of the job's status leaf, the one poll loops read.
    pub fn status_key(job_id: &str) -> String {
        format!("{}/{}/status", JOB_ROOT, job_id)
    }
}

impl Entity for Job {
    fn def() -> &'static EntityDef {
        &JOB_DEF
    }

    fn key_path(&self) -> String {
        format!("{}/{}", JOB_ROOT, self.job_id)
    }

    fn fields(&self) -> BTreeMap<&'static str, FieldValue> {
        let mut fields = BTreeMap::new();
        fields.insert("job_id", FieldValue::Scalar(self.job_id.clone()));
        if let Some(status) = self.status {
            fields.insert("status", FieldValue::Scalar(status.as_str().to_string()));
        }
        if let Some(payload) = &self.payload {
            fields.insert("payload", FieldValue::Json(payload.clone()));
        }
        if let Some(parent) = &self.parent {
            fields.insert("parent", FieldValue::Scalar(parent.clone()));
        }
        if let Some(errors) = &self.errors {
            fields.insert("errors", FieldValue::Json(errors.clone()));
        }
        fields
    }

    fn set_field(&mut self, name: &str, value: FieldValue) {
        match (name, value) {
            ("job_id", FieldValue::Scalar(s)) => self.job_id = s,
            // Unknown statuses written by a newer executor are left unset.
            ("status", FieldValue::Scalar(s)) => self.status = s.parse().ok(),
            ("payload", FieldValue::Json(v)) => self.payload = Some(v),
            ("parent", FieldValue::Scalar(s)) => self.parent = Some(s),
            ("errors", FieldValue::Json(v)) => self.errors = Some(v),
            _ => {}
        }
    }

    fn fresh(&self) -> Self {
        Job::new(self.job_id.clone())
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

impl Enumerable for Job {
    fn parent_path() -> &'static str {
        JOB_ROOT
    }

    fn from_segment(segment: &str) -> Self {
        Job::new(segment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::StoreContext;
    use crate::persist::Persist;
    use kelpie_store::{MemoryStore, RetryingStore, StoreClient};
    use serde_json::json;
    use std::sync::Arc;

    fn context() -> StoreContext {
        StoreContext::new(Arc::new(RetryingStore::new(MemoryStore::new())), "test")
    }

    #[tokio::test]
    async fn test_job_save_load() {
        let ctx = context();
        let mut job = Job::new("j-1")
            .with_status(JobStatus::New)
            .with_payload(json!({"run": "CreateCluster", "type": "node"}))
            .with_parent("j-0");
        job.save(&ctx).await.unwrap();

        let loaded = Job::new("j-1").load(&ctx).await.unwrap();
        assert_eq!(loaded.status, Some(JobStatus::New));
        assert_eq!(loaded.parent.as_deref(), Some("j-0"));
        assert_eq!(
            loaded.payload.unwrap()["run"],
            json!("CreateCluster")
        );
    }

    #[tokio::test]
    async fn test_status_leaf_is_directly_pollable() {
        let ctx = context();
        let mut job = Job::new("j-1").with_status(JobStatus::New);
        job.save(&ctx).await.unwrap();

        // The executor flips the leaf out of band; the entity picks it
        // up on the next load.
        ctx.store
            .write(&Job::status_key("j-1"), "finished", true)
            .await
            .unwrap();
        let loaded = Job::new("j-1").load(&ctx).await.unwrap();
        assert_eq!(loaded.status, Some(JobStatus::Finished));
    }

    #[tokio::test]
    async fn test_unknown_status_left_unset() {
        let ctx = context();
        let mut job = Job::new("j-1").with_status(JobStatus::New);
        job.save(&ctx).await.unwrap();
        ctx.store
            .write(&Job::status_key("j-1"), "paused", true)
            .await
            .unwrap();

        let loaded = Job::new("j-1").load(&ctx).await.unwrap();
        assert_eq!(loaded.status, None);
    }
}
