use thiserror::Error;

/// Errors surfaced by the pipeline controller to its callers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    #[error("Invalid stream configuration: {0}")]
    Config(String),

    #[error("Failed to start pipeline: {0}")]
    Startup(String),

    #[error("No pipeline is running")]
    NotRunning,

    #[error("Failed to signal pipeline: {0}")]
    Signal(String),
}

impl ControlError {
    pub fn config(message: impl Into<String>) -> Self {
        ControlError::Config(message.into())
    }
}

pub type ControlResult<T> = std::result::Result<T, ControlError>;
