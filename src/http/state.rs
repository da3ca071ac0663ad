use crate::capture::SourceRegistry;
use crate::session::SessionCoordinator;
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// The process-wide recording coordinator
    pub coordinator: Arc<SessionCoordinator>,

    /// Filtered capture source listing
    pub registry: Arc<SourceRegistry>,
}

impl AppState {
    pub fn new(coordinator: Arc<SessionCoordinator>, registry: Arc<SourceRegistry>) -> Self {
        Self {
            coordinator,
            registry,
        }
    }
}
