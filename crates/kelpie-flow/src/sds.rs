//! Storage-software installer abstraction.
//!
//! The actual install/configure procedures are external collaborators;
//! flows only need two operations from them: dispatch the per-node SSH
//! setup jobs (the routing differs per software, and Gluster performs
//! its pre-install provisioning steps here) and run the blocking
//! install. A registry routes by the validated software kind.

use crate::error::{FlowError, Result};
use crate::params::{keys, FlowParams};
use crate::queue::{JobPayload, JobQueue};
use async_trait::async_trait;
use kelpie_common::SdsKind;
use kelpie_entity::StoreContext;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

/// Installer for one storage-software family.
#[async_trait]
pub trait SdsInstaller: Send + Sync {
    /// The software family this installer provisions.
    fn kind(&self) -> SdsKind;

    /// Dispatch one SSH-setup job per target node and return their ids.
    ///
    /// Any software-specific pre-install steps run here, before the
    /// jobs are dispatched.
    async fn dispatch_ssh_setup(
        &self,
        ctx: &StoreContext,
        queue: &JobQueue,
        params: &FlowParams,
    ) -> Result<Vec<String>>;

    /// Run the blocking install/configure procedure for the cluster.
    ///
    /// Software-specific install parameters are the installer's own
    /// concern: a Ceph installer extends its copy of the parameters
    /// with [`keys::CREATE_MON_SECRET`] before invoking the
    /// provisioning scripts.
    async fn install(&self, ctx: &StoreContext, params: &FlowParams) -> Result<()>;
}

/// Registry of installers, routed by software kind.
#[derive(Clone, Default)]
pub struct InstallerRegistry {
    installers: HashMap<SdsKind, Arc<dyn SdsInstaller>>,
}

impl InstallerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, installer: Arc<dyn SdsInstaller>) {
        self.installers.insert(installer.kind(), installer);
    }

    pub fn get(&self, kind: SdsKind) -> Option<Arc<dyn SdsInstaller>> {
        self.installers.get(&kind).cloned()
    }
}

/// Flow identifier of the per-node SSH setup job.
pub const SETUP_SSH: &str = "SetupSsh";

/// Installer stub that dispatches SSH jobs and installs nothing.
///
/// Stands in for the real provisioning scripts in tests, the same way
/// a no-op action stands in for real provisioning actions.
pub struct StubInstaller {
    kind: SdsKind,
}

impl StubInstaller {
    pub fn new(kind: SdsKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl SdsInstaller for StubInstaller {
    fn kind(&self) -> SdsKind {
        self.kind
    }

    async fn dispatch_ssh_setup(
        &self,
        _ctx: &StoreContext,
        queue: &JobQueue,
        params: &FlowParams,
    ) -> Result<Vec<String>> {
        let nodes = params.require_str_list(keys::NODES)?;
        let parent = params.require_str(keys::JOB_ID)?.to_string();

        let mut job_ids = Vec::with_capacity(nodes.len());
        for node in nodes {
            let payload = JobPayload::for_flow(SETUP_SSH, json!({ "node_id": node }))
                .with_tag(format!("ssh-setup/{}", node))
                .with_parent(parent.clone());
            job_ids.push(queue.dispatch(payload).await?);
        }
        Ok(job_ids)
    }

    async fn install(&self, _ctx: &StoreContext, _params: &FlowParams) -> Result<()> {
        Ok(())
    }
}

/// Installer whose install step always fails (for testing fault paths).
pub struct FailingInstaller {
    kind: SdsKind,
    message: String,
}

impl FailingInstaller {
    pub fn new(kind: SdsKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[async_trait]
impl SdsInstaller for FailingInstaller {
    fn kind(&self) -> SdsKind {
        self.kind
    }

    async fn dispatch_ssh_setup(
        &self,
        ctx: &StoreContext,
        queue: &JobQueue,
        params: &FlowParams,
    ) -> Result<Vec<String>> {
        StubInstaller::new(self.kind)
            .dispatch_ssh_setup(ctx, queue, params)
            .await
    }

    async fn install(&self, _ctx: &StoreContext, _params: &FlowParams) -> Result<()> {
        Err(FlowError::InstallFailed(self.message.clone()))
    }
}
