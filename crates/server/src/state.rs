use std::sync::Arc;

use mediamill_core::{Config, EngineCapability, JobQueue, SanitizedConfig};

/// Shared application state.
pub struct AppState {
    config: Config,
    capability: EngineCapability,
    queue: Arc<JobQueue>,
}

impl AppState {
    pub fn new(config: Config, capability: EngineCapability, queue: Arc<JobQueue>) -> Self {
        Self {
            config,
            capability,
            queue,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn capability(&self) -> EngineCapability {
        self.capability
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    pub fn max_upload_bytes(&self) -> usize {
        (self.config.server.max_upload_mb as usize).saturating_mul(1024 * 1024)
    }
}
