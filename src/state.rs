use std::sync::Arc;
use std::time::Instant;

use crate::config::ServerConfig;
use crate::controller::PipelineController;
use crate::process::{ProcessLauncher, ShellLauncher};

/// Main server state shared across all handlers
pub struct ServerState {
    pub config: ServerConfig,
    pub controller: PipelineController,
    pub start_time: Instant,
}

impl ServerState {
    /// State backed by real processes started through the configured shell
    pub fn new(config: ServerConfig) -> Self {
        let launcher = Arc::new(ShellLauncher::new(config.shell.clone()));
        Self::with_launcher(config, launcher)
    }

    pub fn with_launcher(config: ServerConfig, launcher: Arc<dyn ProcessLauncher>) -> Self {
        let controller = PipelineController::new(launcher, config.controller_options());
        Self {
            config,
            controller,
            start_time: Instant::now(),
        }
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
