//! Error types for the orchestrator

use thiserror::Error;

/// Result type for orchestrator operations
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// Orchestrator error types, one variant per propagation category
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Malformed request, bad args vector, unknown config key or wrong type.
    /// Returned as a 400-class response; never reaches a worker.
    #[error("Validation error: {0}")]
    Validation(String),

    /// No GPU available; the scheduler returned an empty assignment
    #[error("No GPU resources available: {0}")]
    NoResource(String),

    /// Worker health probe failed within the startup budget
    #[error("Worker startup failed on device {device}: {reason}")]
    WorkerStartup { device: u32, reason: String },

    /// RPC timeout or malformed response; transient, retried on polling ticks
    #[error("Worker RPC transport error: {0}")]
    RpcTransport(String),

    /// The worker process exited; outstanding and future calls fail
    #[error("Worker on device {0} exited")]
    WorkerExited(u32),

    /// The worker reported an inference-side failure
    #[error("Inference error: {0}")]
    Inference(String),

    /// Task not found in the in-memory store
    #[error("Task {0} not found")]
    TaskNotFound(String),

    /// Configuration file or document error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for OrchestratorError {
    fn from(err: std::io::Error) -> Self {
        OrchestratorError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for OrchestratorError {
    fn from(err: serde_json::Error) -> Self {
        OrchestratorError::Validation(format!("JSON error: {}", err))
    }
}

/// Check if an error is transient and worth retrying on the next polling tick
pub fn is_retryable(err: &OrchestratorError) -> bool {
    matches!(err, OrchestratorError::RpcTransport(_))
}
