//! Explicit context handle for persistence operations.
//!
//! Replaces ambient globals: every component that touches the store
//! receives a `StoreContext` carrying the store handle, the publisher
//! id used on notices, and the event sink.

use kelpie_common::{EventSink, TracingSink};
use kelpie_store::StoreClient;
use std::fmt;
use std::sync::Arc;

/// Handle bundle passed to every persistence and flow operation.
#[derive(Clone)]
pub struct StoreContext {
    pub store: Arc<dyn StoreClient>,
    /// Publisher id stamped on every notice this context emits.
    pub publisher: String,
    pub events: Arc<dyn EventSink>,
}

impl StoreContext {
    pub fn new(store: Arc<dyn StoreClient>, publisher: impl Into<String>) -> Self {
        Self {
            store,
            publisher: publisher.into(),
            events: Arc::new(TracingSink::new()),
        }
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }
}

impl fmt::Debug for StoreContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreContext")
            .field("publisher", &self.publisher)
            .finish_non_exhaustive()
    }
}
