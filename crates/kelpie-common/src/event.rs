//! Operator-visible event notifications.
//!
//! Flows and entity persistence emit structured notices for every stage
//! transition and failure. The transport is an external collaborator;
//! this module only defines the contract plus a default sink that
//! forwards everything to `tracing` and a recording sink for tests.

use std::sync::Mutex;
use tracing::{debug, error, info};

/// Priority of a notice, mapped onto log levels by the default sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Debug,
    Info,
    Error,
}

/// A structured, human-readable notification.
#[derive(Debug, Clone)]
pub struct Notice {
    pub priority: Priority,
    pub publisher: String,
    pub message: String,
    /// Correlation id of the job this notice belongs to, if any.
    pub job_id: Option<String>,
    /// Correlation id of the flow execution, if any.
    pub flow_id: Option<String>,
    /// Integration id of the cluster being operated on, if any.
    pub cluster_id: Option<String>,
}

impl Notice {
    pub fn new(
        priority: Priority,
        publisher: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            priority,
            publisher: publisher.into(),
            message: message.into(),
            job_id: None,
            flow_id: None,
            cluster_id: None,
        }
    }

    pub fn with_job(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }

    pub fn with_flow(mut self, flow_id: impl Into<String>) -> Self {
        self.flow_id = Some(flow_id.into());
        self
    }

    pub fn with_cluster(mut self, cluster_id: impl Into<String>) -> Self {
        self.cluster_id = Some(cluster_id.into());
        self
    }
}

/// Sink for operator-visible notices.
///
/// `publish_fault` is the variant carrying the original error so the
/// sink can surface diagnostics alongside the message.
pub trait EventSink: Send + Sync {
    fn publish(&self, notice: Notice);

    fn publish_fault(&self, notice: Notice, fault: &(dyn std::error::Error + 'static));
}

/// Default sink: forwards notices to `tracing`.
#[derive(Debug, Default)]
pub struct TracingSink;

impl TracingSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for TracingSink {
    fn publish(&self, notice: Notice) {
        match notice.priority {
            Priority::Debug => debug!(
                publisher = %notice.publisher,
                job = ?notice.job_id,
                flow = ?notice.flow_id,
                cluster = ?notice.cluster_id,
                "{}",
                notice.message
            ),
            Priority::Info => info!(
                publisher = %notice.publisher,
                job = ?notice.job_id,
                flow = ?notice.flow_id,
                cluster = ?notice.cluster_id,
                "{}",
                notice.message
            ),
            Priority::Error => error!(
                publisher = %notice.publisher,
                job = ?notice.job_id,
                flow = ?notice.flow_id,
                cluster = ?notice.cluster_id,
                "{}",
                notice.message
            ),
        }
    }

    fn publish_fault(&self, notice: Notice, fault: &(dyn std::error::Error + 'static)) {
        error!(
            publisher = %notice.publisher,
            job = ?notice.job_id,
            flow = ?notice.flow_id,
            cluster = ?notice.cluster_id,
            fault = %fault,
            "{}",
            notice.message
        );
    }
}

/// Sink that records every notice in memory, for tests.
#[derive(Debug, Default)]
pub struct RecordingSink {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything published so far.
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }

    /// Messages of all error-priority notices.
    pub fn errors(&self) -> Vec<String> {
        self.notices
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.priority == Priority::Error)
            .map(|n| n.message.clone())
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn publish(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }

    fn publish_fault(&self, mut notice: Notice, fault: &(dyn std::error::Error + 'static)) {
        notice.message = format!("{}: {}", notice.message, fault);
        self.notices.lock().unwrap().push(notice);
    }
}
