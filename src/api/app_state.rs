use crate::observability::AppMetrics;
use crate::services::orchestrator::Orchestrator;
use std::sync::Arc;

/// Application state shared by the HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Conversation entry point
    pub orchestrator: Arc<Orchestrator>,
    /// Process-wide counters
    pub metrics: Arc<AppMetrics>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("orchestrator", &"Arc<Orchestrator>")
            .field("metrics", &"Arc<AppMetrics>")
            .finish()
    }
}

impl AppState {
    /// Create new application state
    pub fn new(orchestrator: Orchestrator, metrics: Arc<AppMetrics>) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            metrics,
        }
    }
}
