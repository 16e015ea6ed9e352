use nexus::orchestrator::Orchestrator;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Orchestrator,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }
}
