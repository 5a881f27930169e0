use std::sync::Arc;

use skycast_core::Orchestrator;
use tokio_util::sync::CancellationToken;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    /// Parent of every per-request cancellation token; cancelled on shutdown.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            shutdown: CancellationToken::new(),
        }
    }
}
