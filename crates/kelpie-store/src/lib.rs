//! Central store access for kelpie.
//!
//! Everything kelpie persists or coordinates on lives in one shared,
//! strongly-consistent hierarchical key-value store. This crate defines
//! the client trait ([`StoreClient`]), the reconnect-once retry policy
//! every higher layer goes through ([`RetryingStore`]), an in-memory
//! backend for tests and standalone use ([`MemoryStore`]), and the
//! per-node mutual-exclusion primitive ([`NodeLockManager`]).
//!
//! Key absence is a normal signal, not an error: reads return
//! `Ok(None)` and directory listings return an empty vector.

pub mod client;
pub mod lock;
pub mod memory;
pub mod retry;

pub use client::{KeyValue, Result, StoreClient, StoreError};
pub use lock::{LockError, NodeLockManager};
pub use memory::MemoryStore;
pub use retry::RetryingStore;
