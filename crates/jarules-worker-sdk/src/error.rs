//! Error types for the worker SDK.

use thiserror::Error;

/// Errors that can occur while driving a worker process.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The worker process could not be started.
    #[error("Failed to spawn worker '{script}': {source}")]
    Spawn {
        script: String,
        #[source]
        source: std::io::Error,
    },

    /// I/O error while talking to the worker.
    #[error("Worker I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Protocol error during communication.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Errors from delivering an interrupt to a worker.
#[derive(Debug, Error)]
pub enum SignalError {
    /// The process was gone before the signal could be delivered.
    #[error("Worker process has already terminated")]
    AlreadyTerminated,

    /// The platform has no cooperative interrupt.
    #[error("Interrupting worker processes is not supported on this platform")]
    Unsupported,

    /// The OS refused the signal.
    #[error("Failed to signal worker process: {0}")]
    Failed(#[source] std::io::Error),
}
