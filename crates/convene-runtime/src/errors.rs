//! Runtime error types.
//!
//! Nothing here reaches a participant. Errors are raised inside background
//! effects and logged at the task boundary with [`RuntimeError::category`].

use convene_client::ClientError;
use convene_core::TaskId;
use convene_llm::GeneratorError;

/// Errors raised while running a coordination effect.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// Platform request failed.
    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    /// Reply generation failed.
    #[error("Generator error: {0}")]
    Generator(#[from] GeneratorError),

    /// No destination session could be provisioned for a task.
    #[error("Provisioning failed for task {task_id}: {source}")]
    Provision {
        /// Task being handed off.
        task_id: TaskId,
        /// Underlying failure.
        #[source]
        source: ClientError,
    },
}

impl RuntimeError {
    /// Whether repeating the effect could succeed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Client(e) | Self::Provision { source: e, .. } => e.is_retryable(),
            Self::Generator(e) => e.is_retryable(),
        }
    }

    /// Error category string for logging.
    pub fn category(&self) -> &str {
        match self {
            Self::Client(_) => "client",
            Self::Generator(_) => "generator",
            Self::Provision { .. } => "provision",
        }
    }
}
