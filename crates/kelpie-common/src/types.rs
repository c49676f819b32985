//! Job lifecycle states and supported storage-software kinds.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Lifecycle state of a queued job.
///
/// A job is created as `New` by a dispatcher and transitioned to
/// `Running` and then `Finished` or `Failed` by the remote executor
/// that picks it up. Flows only ever observe these states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    New,
    Running,
    Finished,
    Failed,
}

impl JobStatus {
    /// Wire encoding used for the `/queue/<id>/status` leaf.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::New => "new",
            JobStatus::Running => "running",
            JobStatus::Finished => "finished",
            JobStatus::Failed => "failed",
        }
    }

    /// Whether the job has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Finished | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a stored status string is not a known state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown job status: {0}")]
pub struct ParseJobStatusError(pub String);

impl FromStr for JobStatus {
    type Err = ParseJobStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(JobStatus::New),
            "running" => Ok(JobStatus::Running),
            "finished" => Ok(JobStatus::Finished),
            "failed" => Ok(JobStatus::Failed),
            other => Err(ParseJobStatusError(other.to_string())),
        }
    }
}

/// Storage-software family a flow can provision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdsKind {
    Ceph,
    Gluster,
}

impl SdsKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SdsKind::Ceph => "ceph",
            SdsKind::Gluster => "gluster",
        }
    }

    /// The set of names accepted by flow validation.
    pub fn supported() -> &'static [&'static str] {
        &["ceph", "gluster"]
    }
}

impl fmt::Display for SdsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned for a storage-software name outside the supported set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported SDS: {0}")]
pub struct ParseSdsKindError(pub String);

impl FromStr for SdsKind {
    type Err = ParseSdsKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ceph" => Ok(SdsKind::Ceph),
            "gluster" => Ok(SdsKind::Gluster),
            other => Err(ParseSdsKindError(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_round_trip() {
        for status in [
            JobStatus::New,
            JobStatus::Running,
            JobStatus::Finished,
            JobStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_job_status_unknown() {
        let err = "done".parse::<JobStatus>().unwrap_err();
        assert_eq!(err.to_string(), "unknown job status: done");
    }

    #[test]
    fn test_job_status_terminal() {
        assert!(!JobStatus::New.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Finished.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn test_sds_kind_parse() {
        assert_eq!("ceph".parse::<SdsKind>().unwrap(), SdsKind::Ceph);
        assert_eq!("gluster".parse::<SdsKind>().unwrap(), SdsKind::Gluster);
        assert!("nfs".parse::<SdsKind>().is_err());
    }

    #[test]
    fn test_sds_supported_set() {
        for name in SdsKind::supported() {
            assert!(name.parse::<SdsKind>().is_ok());
        }
    }
}
