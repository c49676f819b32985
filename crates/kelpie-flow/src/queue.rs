//! Job dispatch.
//!
//! Dispatching persists a new Job entity with a fresh id and status
//! `new`; a remote executor picks it up and transitions it out of band.
//! Dispatch never blocks on execution, callers poll.

use crate::error::Result;
use kelpie_common::JobStatus;
use kelpie_entity::{Job, Persist, StoreContext};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

/// Payload of a dispatched job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPayload {
    /// Routing tags, e.g. `ssh-setup/<node>` or `detected_cluster/<id>`.
    pub tags: Vec<String>,
    /// Identifier of the flow the executor should run.
    pub run: String,
    pub status: String,
    pub parameters: Value,
    pub parent: Option<String>,
    #[serde(rename = "type")]
    pub job_type: String,
}

impl JobPayload {
    /// A `node`-type payload for the given flow identifier.
    pub fn for_flow(run: impl Into<String>, parameters: Value) -> Self {
        Self {
            tags: Vec::new(),
            run: run.into(),
            status: JobStatus::New.as_str().to_string(),
            parameters,
            parent: None,
            job_type: "node".to_string(),
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }
}

/// Dispatcher for asynchronous work items.
#[derive(Debug, Clone)]
pub struct JobQueue {
    ctx: StoreContext,
}

impl JobQueue {
    pub fn new(ctx: StoreContext) -> Self {
        Self { ctx }
    }

    /// Persist a new job and return its freshly generated id.
    pub async fn dispatch(&self, payload: JobPayload) -> Result<String> {
        let job_id = Uuid::new_v4().to_string();
        let parent = payload.parent.clone();

        let mut job = Job::new(&job_id)
            .with_status(JobStatus::New)
            .with_payload(serde_json::to_value(&payload)?);
        if let Some(parent) = parent {
            job = job.with_parent(parent);
        }
        job.save(&self.ctx).await?;

        info!(job = %job_id, run = %payload.run, "job dispatched");
        Ok(job_id)
    }

    /// Current status of a job, read straight off its status leaf.
    ///
    /// `Ok(None)` covers both an absent job and a status value this
    /// version does not know; the latter is logged, since a poll loop
    /// treating it as "pending" would otherwise spin without a trace.
    pub async fn status(&self, job_id: &str) -> Result<Option<JobStatus>> {
        let Some(raw) = self.ctx.store.read(&Job::status_key(job_id)).await? else {
            return Ok(None);
        };
        match raw.parse() {
            Ok(status) => Ok(Some(status)),
            Err(_) => {
                warn!(job = %job_id, status = %raw, "unrecognized job status");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kelpie_store::{MemoryStore, RetryingStore, StoreClient};
    use serde_json::json;
    use std::sync::Arc;

    fn queue() -> JobQueue {
        let store = Arc::new(RetryingStore::new(MemoryStore::new()));
        JobQueue::new(StoreContext::new(store, "test"))
    }

    #[tokio::test]
    async fn test_dispatch_creates_new_job() {
        let queue = queue();
        let payload = JobPayload::for_flow("ImportCluster", json!({"Node[]": ["n1"]}))
            .with_tag("detected_cluster/dc-1")
            .with_parent("j-0");

        let job_id = queue.dispatch(payload).await.unwrap();
        assert_eq!(queue.status(&job_id).await.unwrap(), Some(JobStatus::New));

        let job = Job::new(&job_id).load(&queue.ctx).await.unwrap();
        assert_eq!(job.parent.as_deref(), Some("j-0"));
        let payload = job.payload.unwrap();
        assert_eq!(payload["run"], json!("ImportCluster"));
        assert_eq!(payload["type"], json!("node"));
        assert_eq!(payload["tags"], json!(["detected_cluster/dc-1"]));
    }

    #[tokio::test]
    async fn test_dispatch_generates_unique_ids() {
        let queue = queue();
        let a = queue
            .dispatch(JobPayload::for_flow("SetupSsh", json!({})))
            .await
            .unwrap();
        let b = queue
            .dispatch(JobPayload::for_flow("SetupSsh", json!({})))
            .await
            .unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_status_of_absent_job() {
        let queue = queue();
        assert_eq!(queue.status("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unrecognized_status_folds_to_none() {
        let queue = queue();
        let job_id = queue
            .dispatch(JobPayload::for_flow("SetupSsh", json!({})))
            .await
            .unwrap();
        queue
            .ctx
            .store
            .write(&Job::status_key(&job_id), "cancelled", true)
            .await
            .unwrap();

        assert_eq!(queue.status(&job_id).await.unwrap(), None);
    }
}
