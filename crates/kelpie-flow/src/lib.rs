//! Flow engine for kelpie cluster lifecycle operations.
//!
//! A flow is a hand-coded orchestration procedure that sequences node
//! locking, sub-job dispatch, polling-until-condition and entity
//! mutation to accomplish one cluster lifecycle operation. Flows never
//! receive typed objects: their input is a flat map of dotted parameter
//! keys ([`FlowParams`]), validated at entry.
//!
//! All waiting is polling-based; remote executors and detection agents
//! communicate back exclusively through the central store. Every poll
//! loop takes explicit [`WaitOptions`] (interval plus an optional
//! deadline).
//!
//! The single most important invariant: node locks taken by a flow are
//! released on every exit path, success or failure.

pub mod create_cluster;
pub mod error;
pub mod params;
pub mod queue;
pub mod sds;
pub mod wait;

pub use create_cluster::{CreateClusterFlow, FlowConfig, FlowState, CREATE_CLUSTER, IMPORT_CLUSTER};
pub use error::{FlowError, Result};
pub use params::{keys, FlowParams};
pub use queue::{JobPayload, JobQueue};
pub use sds::{FailingInstaller, InstallerRegistry, SdsInstaller, StubInstaller};
pub use wait::WaitOptions;
