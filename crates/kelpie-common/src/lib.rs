//! Shared types for the kelpie orchestration substrate.
//!
//! This crate carries the small vocabulary every other kelpie crate
//! speaks: job lifecycle states, the supported storage-software kinds,
//! and the operator-visible event sink contract.

pub mod event;
pub mod types;

pub use event::{EventSink, Notice, Priority, RecordingSink, TracingSink};
pub use types::{JobStatus, ParseJobStatusError, ParseSdsKindError, SdsKind};
