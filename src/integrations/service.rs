//! Restarting services that read restored data

use super::run_command;
use crate::error::EngineResult;

pub trait ServiceController {
    fn restart(&self, service: &str) -> EngineResult<()>;
}

/// Appends the service name to a command such as `systemctl restart`
#[derive(Debug, Clone)]
pub struct CommandServiceController {
    command: Vec<String>,
}

impl CommandServiceController {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

impl ServiceController for CommandServiceController {
    fn restart(&self, service: &str) -> EngineResult<()> {
        tracing::info!(service, "Restarting service");
        run_command(&self.command, &[service], None).map(|_| ())
    }
}
