//! Cluster creation flow.
//!
//! Drives the multi-stage, partially-asynchronous procedure that turns
//! a set of bare nodes into a managed storage cluster: SSH setup jobs,
//! the blocking software install, waiting for the per-node detection
//! agents, then handing off to the import workflow and watching it
//! finish. Input errors fail before any lock is taken, and node locks
//! are released on every exit path.

use crate::error::{FlowError, Result};
use crate::params::{keys, FlowParams};
use crate::queue::{JobPayload, JobQueue};
use crate::sds::InstallerRegistry;
use crate::wait::{Deadline, WaitOptions};
use kelpie_common::{JobStatus, Notice, Priority, SdsKind};
use kelpie_entity::{Cluster, DetectedCluster, Job, NodeContext, Persist, StoreContext};
use kelpie_store::NodeLockManager;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

/// Flow identifier carried in job payloads for cluster creation.
pub const CREATE_CLUSTER: &str = "CreateCluster";

/// Flow identifier of the nested import job this flow dispatches.
pub const IMPORT_CLUSTER: &str = "ImportCluster";

/// Stages of the cluster creation flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Validating,
    Locking,
    SshSetupWait,
    Installing,
    DetectWait,
    Importing,
    ImportWait,
    Done,
    Failed,
}

impl FlowState {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowState::Validating => "validating",
            FlowState::Locking => "locking",
            FlowState::SshSetupWait => "ssh_setup_wait",
            FlowState::Installing => "installing",
            FlowState::DetectWait => "detect_wait",
            FlowState::Importing => "importing",
            FlowState::ImportWait => "import_wait",
            FlowState::Done => "done",
            FlowState::Failed => "failed",
        }
    }
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wait-loop configuration for the flow's three polling stages.
#[derive(Debug, Clone, Copy)]
pub struct FlowConfig {
    /// SSH setup job polling.
    pub job_wait: WaitOptions,
    /// Detection polling. Bounded by default: a node whose agent never
    /// reports would otherwise hold the flow forever.
    pub detect_wait: WaitOptions,
    /// Import job / sync status polling.
    pub import_wait: WaitOptions,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            job_wait: WaitOptions::default(),
            detect_wait: WaitOptions::default().with_deadline(Duration::from_secs(600)),
            import_wait: WaitOptions::default(),
        }
    }
}

/// Inputs of one flow execution, validated before any side effect.
#[derive(Debug, Clone)]
struct ValidatedInput {
    integration_id: String,
    sds: SdsKind,
    nodes: Vec<String>,
    job_id: String,
    flow_id: String,
    public_network: Option<String>,
    cluster_network: Option<String>,
}

/// The cluster creation flow engine.
pub struct CreateClusterFlow {
    ctx: StoreContext,
    queue: JobQueue,
    locks: NodeLockManager,
    installers: InstallerRegistry,
    config: FlowConfig,
    /// Identity of the node this engine runs on, used for the
    /// provisioner tag. Tagging is skipped when unset.
    local_node: Option<String>,
}

impl CreateClusterFlow {
    pub fn new(ctx: StoreContext, installers: InstallerRegistry) -> Self {
        let queue = JobQueue::new(ctx.clone());
        let locks = NodeLockManager::new(ctx.store.clone());
        Self {
            ctx,
            queue,
            locks,
            installers,
            config: FlowConfig::default(),
            local_node: None,
        }
    }

    pub fn with_config(mut self, config: FlowConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_local_node(mut self, node_id: impl Into<String>) -> Self {
        self.local_node = Some(node_id.into());
        self
    }

    /// Execute the flow.
    ///
    /// Validation failures return before any lock or job exists. After
    /// locking, the stages run in [`Self::run_locked`]; whatever they
    /// return, the node locks are released and a failure is published
    /// once, carrying the original fault, before being passed back so
    /// the owning job is marked failed.
    pub async fn run(&self, params: &FlowParams) -> Result<()> {
        let input = match self.validate(params) {
            Ok(input) => input,
            Err(err) => {
                let mut notice = Notice::new(
                    Priority::Error,
                    &self.ctx.publisher,
                    "cluster create flow rejected".to_string(),
                );
                if let Some(job_id) = params.get_str(keys::JOB_ID) {
                    notice = notice.with_job(job_id);
                }
                if let Some(flow_id) = params.get_str(keys::FLOW_ID) {
                    notice = notice.with_flow(flow_id);
                }
                self.ctx.events.publish_fault(notice, &err);
                return Err(err);
            }
        };

        self.transition(
            &input,
            FlowState::Locking,
            format!("Locking nodes {:?}", input.nodes),
        );
        if let Err(err) = self.locks.acquire(&input.nodes, &input.flow_id).await {
            let err = FlowError::from(err);
            self.ctx
                .events
                .publish_fault(self.notice(Priority::Error, &input, "failed to lock nodes"), &err);
            return Err(err);
        }

        let result = self.run_locked(params, &input).await;

        // Unconditional release on every exit path. Idempotent, so the
        // early hand-back before import dispatch is covered too.
        self.locks.release(&input.nodes).await;

        if let Err(ref err) = result {
            self.transition(&input, FlowState::Failed, "cluster create flow failed".to_string());
            self.ctx.events.publish_fault(
                self.notice(
                    Priority::Error,
                    &input,
                    format!("failed to create cluster {}", input.integration_id),
                ),
                err,
            );
        }
        result
    }

    /// Check every required parameter before any side effect.
    fn validate(&self, params: &FlowParams) -> Result<ValidatedInput> {
        let integration_id = params.require_str(keys::INTEGRATION_ID)?.to_string();

        let sds_name = params.require_str(keys::SDS_NAME)?;
        let sds: SdsKind = sds_name
            .parse()
            .map_err(|_| FlowError::UnsupportedSds(sds_name.to_string()))?;

        let cluster_name = params.require_str(keys::CLUSTER_NAME)?;
        if cluster_name.chars().any(char::is_whitespace) {
            return Err(FlowError::InvalidClusterName(cluster_name.to_string()));
        }

        Ok(ValidatedInput {
            integration_id,
            sds,
            nodes: params.require_str_list(keys::NODES)?,
            job_id: params.require_str(keys::JOB_ID)?.to_string(),
            flow_id: params.require_str(keys::FLOW_ID)?.to_string(),
            public_network: params.get_str(keys::PUBLIC_NETWORK).map(str::to_string),
            cluster_network: params.get_str(keys::CLUSTER_NETWORK).map(str::to_string),
        })
    }

    async fn run_locked(&self, params: &FlowParams, input: &ValidatedInput) -> Result<()> {
        let installer = self
            .installers
            .get(input.sds)
            .ok_or_else(|| FlowError::UnsupportedSds(input.sds.to_string()))?;

        self.transition(
            input,
            FlowState::SshSetupWait,
            format!(
                "Setting up SSH on nodes {:?} for cluster {}",
                input.nodes, input.integration_id
            ),
        );
        let ssh_jobs = installer
            .dispatch_ssh_setup(&self.ctx, &self.queue, params)
            .await?;
        self.wait_for_ssh_setup(input, &ssh_jobs).await?;
        self.publish(
            input,
            Priority::Info,
            format!(
                "SSH setup completed for all nodes in cluster {}",
                input.integration_id
            ),
        );
        if input.sds == SdsKind::Gluster {
            self.tag_local_provisioner(input).await?;
        }

        self.transition(
            input,
            FlowState::Installing,
            format!(
                "Creating {} storage cluster {}",
                input.sds, input.integration_id
            ),
        );
        installer.install(&self.ctx, params).await?;

        self.transition(
            input,
            FlowState::DetectWait,
            format!(
                "Install and config completed, waiting for node agents to detect cluster {} on {:?}",
                input.integration_id, input.nodes
            ),
        );
        self.wait_for_detection(input).await?;

        self.transition(
            input,
            FlowState::Importing,
            format!("Importing newly created cluster {}", input.integration_id),
        );
        // Import runs on a separate code path that coordinates for
        // itself; hand the nodes back before dispatching it.
        self.locks.release(&input.nodes).await;

        let mut cluster = Cluster::new(&input.integration_id);
        cluster.public_network = input.public_network.clone();
        cluster.cluster_network = input.cluster_network.clone();
        cluster.save(&self.ctx).await?;

        let import_job_id = self.dispatch_import(input).await?;
        self.transition(
            input,
            FlowState::ImportWait,
            format!(
                "Please wait while cluster {} is imported, import job id: {}",
                input.integration_id, import_job_id
            ),
        );
        self.wait_for_import(input, &import_job_id).await?;

        self.transition(
            input,
            FlowState::Done,
            format!("Cluster {} is ready for use", input.integration_id),
        );
        Ok(())
    }

    /// Poll the SSH setup jobs until all finish, failing fast on the
    /// first failed job even while siblings are still running.
    async fn wait_for_ssh_setup(&self, input: &ValidatedInput, job_ids: &[String]) -> Result<()> {
        let opts = self.config.job_wait;
        let deadline = Deadline::new(opts.deadline);
        loop {
            tokio::time::sleep(opts.interval).await;

            let mut statuses = Vec::with_capacity(job_ids.len());
            for job_id in job_ids {
                statuses.push((job_id, self.queue.status(job_id).await?));
            }

            let failed: Vec<String> = statuses
                .iter()
                .filter(|(_, status)| *status == Some(JobStatus::Failed))
                .map(|(job_id, _)| (*job_id).clone())
                .collect();
            if !failed.is_empty() {
                return Err(FlowError::SshSetupFailed {
                    jobs: failed,
                    integration_id: input.integration_id.clone(),
                });
            }
            if statuses
                .iter()
                .all(|(_, status)| *status == Some(JobStatus::Finished))
            {
                return Ok(());
            }
            if deadline.expired() {
                return Err(FlowError::Timeout(
                    deadline.limit(),
                    "SSH setup jobs".to_string(),
                ));
            }
        }
    }

    /// Tag the local node as provisioner for the new cluster.
    async fn tag_local_provisioner(&self, input: &ValidatedInput) -> Result<()> {
        let Some(local) = &self.local_node else {
            debug!("no local node configured, skipping provisioner tag");
            return Ok(());
        };
        let mut node = NodeContext::new(local).load(&self.ctx).await?;
        node.add_tag(format!("provisioner/{}", input.integration_id));
        node.save(&self.ctx).await?;
        Ok(())
    }

    /// Poll until every target node reports a detected cluster id.
    /// Absence of the key means "not yet", never an error.
    async fn wait_for_detection(&self, input: &ValidatedInput) -> Result<()> {
        let opts = self.config.detect_wait;
        let deadline = Deadline::new(opts.deadline);
        loop {
            tokio::time::sleep(opts.interval).await;

            let mut all_present = true;
            for node in &input.nodes {
                let key = DetectedCluster::detected_id_key(node);
                if self.ctx.store.read(&key).await?.is_none() {
                    all_present = false;
                    break;
                }
            }
            if all_present {
                return Ok(());
            }
            if deadline.expired() {
                return Err(FlowError::Timeout(
                    deadline.limit(),
                    "cluster detection".to_string(),
                ));
            }
        }
    }

    /// Build and dispatch the nested import job from the first node's
    /// detection results.
    async fn dispatch_import(&self, input: &ValidatedInput) -> Result<String> {
        let first_node = &input.nodes[0];
        let detected = DetectedCluster::new(first_node).load(&self.ctx).await?;
        let detected_id = detected
            .detected_cluster_id
            .clone()
            .ok_or_else(|| FlowError::DetectionIncomplete(first_node.clone()))?;

        let mut import_params = FlowParams::new()
            .set(keys::NODES, serde_json::Value::from(input.nodes.clone()))
            .set(keys::INTEGRATION_ID, input.integration_id.clone())
            .set(keys::IMPORT_AFTER_CREATE, true);
        if let Some(pkg_name) = detected.sds_pkg_name.clone() {
            if pkg_name.contains("gluster") {
                import_params.insert(keys::GDEPLOY_PROVISIONED, true);
            }
            import_params.insert(keys::SDS_PKG_NAME, pkg_name);
        }
        if let Some(pkg_version) = detected.sds_pkg_version.clone() {
            import_params.insert(keys::SDS_PKG_VERSION, pkg_version);
        }

        let payload = JobPayload::for_flow(IMPORT_CLUSTER, import_params.to_value())
            .with_tag(format!("detected_cluster/{}", detected_id))
            .with_parent(input.job_id.clone());
        self.queue.dispatch(payload).await
    }

    /// Poll the import job and the cluster's sync status until one of
    /// them terminates the wait. Both are re-loaded from the store
    /// every iteration; the import workflow mutates them externally.
    async fn wait_for_import(&self, input: &ValidatedInput, import_job_id: &str) -> Result<()> {
        let opts = self.config.import_wait;
        let deadline = Deadline::new(opts.deadline);
        let job = Job::new(import_job_id);
        let cluster = Cluster::new(&input.integration_id);
        loop {
            tokio::time::sleep(opts.interval).await;

            let job = job.load(&self.ctx).await?;
            if job.status == Some(JobStatus::Failed) {
                self.publish(
                    input,
                    Priority::Error,
                    format!(
                        "Importing newly created cluster failed, failed job id: {}",
                        import_job_id
                    ),
                );
                return Err(FlowError::ImportFailed {
                    job_id: import_job_id.to_string(),
                });
            }

            let cluster = cluster.load(&self.ctx).await?;
            if cluster.is_synced() {
                return Ok(());
            }
            if deadline.expired() {
                return Err(FlowError::Timeout(
                    deadline.limit(),
                    "cluster import".to_string(),
                ));
            }
        }
    }

    fn notice(
        &self,
        priority: Priority,
        input: &ValidatedInput,
        message: impl Into<String>,
    ) -> Notice {
        Notice::new(priority, &self.ctx.publisher, message)
            .with_job(&input.job_id)
            .with_flow(&input.flow_id)
            .with_cluster(&input.integration_id)
    }

    fn publish(&self, input: &ValidatedInput, priority: Priority, message: impl Into<String>) {
        self.ctx.events.publish(self.notice(priority, input, message));
    }

    fn transition(&self, input: &ValidatedInput, state: FlowState, message: String) {
        info!(state = %state, flow = %input.flow_id, "flow transition");
        self.publish(input, Priority::Info, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sds::StubInstaller;
    use kelpie_store::{MemoryStore, RetryingStore};
    use serde_json::json;
    use std::sync::Arc;

    fn test_flow() -> CreateClusterFlow {
        let store = Arc::new(RetryingStore::new(MemoryStore::new()));
        let ctx = StoreContext::new(store, "create-cluster");
        let mut registry = InstallerRegistry::new();
        registry.register(Arc::new(StubInstaller::new(SdsKind::Gluster)));
        CreateClusterFlow::new(ctx, registry)
    }

    fn valid_params() -> FlowParams {
        FlowParams::new()
            .set(keys::INTEGRATION_ID, "int-1")
            .set(keys::SDS_NAME, "gluster")
            .set(keys::CLUSTER_NAME, "prod-cluster")
            .set(keys::NODES, json!(["n1", "n2"]))
            .set(keys::JOB_ID, "job-0")
            .set(keys::FLOW_ID, "flow-0")
    }

    #[test]
    fn test_validate_ok() {
        let input = test_flow().validate(&valid_params()).unwrap();
        assert_eq!(input.integration_id, "int-1");
        assert_eq!(input.sds, SdsKind::Gluster);
        assert_eq!(input.nodes, vec!["n1".to_string(), "n2".to_string()]);
    }

    #[test]
    fn test_validate_missing_parameter() {
        let params = FlowParams::new()
            .set(keys::SDS_NAME, "gluster")
            .set(keys::CLUSTER_NAME, "prod-cluster");
        assert!(matches!(
            test_flow().validate(&params),
            Err(FlowError::MissingParameter(key)) if key == keys::INTEGRATION_ID
        ));
    }

    #[test]
    fn test_validate_unsupported_sds() {
        let params = valid_params().set(keys::SDS_NAME, "nfs");
        assert!(matches!(
            test_flow().validate(&params),
            Err(FlowError::UnsupportedSds(name)) if name == "nfs"
        ));
    }

    #[test]
    fn test_validate_whitespace_in_cluster_name() {
        let params = valid_params().set(keys::CLUSTER_NAME, "prod cluster");
        assert!(matches!(
            test_flow().validate(&params),
            Err(FlowError::InvalidClusterName(_))
        ));
    }

    #[test]
    fn test_flow_state_display() {
        assert_eq!(FlowState::SshSetupWait.to_string(), "ssh_setup_wait");
        assert_eq!(FlowState::Done.to_string(), "done");
    }

    #[test]
    fn test_default_detect_wait_is_bounded() {
        let config = FlowConfig::default();
        assert!(config.detect_wait.deadline.is_some());
    }
}
