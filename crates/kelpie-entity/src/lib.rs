//! Persisted-entity layer for kelpie.
//!
//! Entities are typed records whose attributes are individually
//! persisted as leaves under a slash-delimited path in the central
//! store. Each entity type declares a static field-descriptor table
//! ([`EntityDef`]); the generic persistence machinery ([`Persist`])
//! renders attributes into keys, detects changes with a content hash so
//! an unchanged entity is never rewritten, backfills unset attributes
//! on partial updates, and loads leniently (one malformed field does
//! not abort a load).
//!
//! The store is the single source of truth; any in-memory instance is a
//! disposable projection of it.

pub mod cluster;
pub mod context;
pub mod def;
pub mod job;
pub mod node;
pub mod persist;
pub mod value;

pub use cluster::Cluster;
pub use context::StoreContext;
pub use def::{EntityDef, FieldDef, FieldKind};
pub use job::Job;
pub use node::{DetectedCluster, NodeContext};
pub use persist::{Entity, Enumerable, LoadAll, Persist, RenderedField, SaveOptions};
pub use value::{EncodeError, FieldValue};
