//! Shared state for the HTTP server.

use std::sync::Arc;

use parley_core::meta::MetadataStore;
use parley_core::SessionRegistry;

/// Shared state available to all HTTP handlers.
#[derive(Clone)]
pub struct SharedState {
    /// The session registry this server attaches connections to.
    pub registry: Arc<SessionRegistry>,
    /// Metadata store populated as requests complete.
    pub metadata: Arc<dyn MetadataStore>,
}

impl SharedState {
    pub fn new(registry: Arc<SessionRegistry>, metadata: Arc<dyn MetadataStore>) -> Self {
        Self { registry, metadata }
    }
}
