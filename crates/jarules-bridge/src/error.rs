//! Bridge error types.

use jarules_core::{FailureKind, SessionId};
use jarules_worker_sdk::WorkerError;
use thiserror::Error;

/// Errors from bridge operations.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// A prompt was sent with no model selected.
    #[error("No active model selected. Please select a model first.")]
    NoActiveModel { session_id: SessionId },

    /// A session already holds the streaming slot.
    #[error("A generation is already in progress (session {0})")]
    SessionBusy(SessionId),

    /// Nothing to cancel.
    #[error("No active generation process to stop")]
    NoActiveSession,

    /// The session's worker exited before it could be interrupted.
    #[error("Generation process has already terminated (session {0})")]
    AlreadyTerminated(SessionId),

    /// The interrupt could not be delivered.
    #[error("Failed to send stop signal to generation process: {message}")]
    SignalFailed {
        session_id: SessionId,
        message: String,
    },

    /// The streaming worker could not be started.
    #[error(transparent)]
    Worker(#[from] WorkerError),
}

impl BridgeError {
    /// Failure family reported to the UI.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::NoActiveModel { .. }
            | Self::SessionBusy(_)
            | Self::NoActiveSession
            | Self::AlreadyTerminated(_) => FailureKind::State,
            Self::SignalFailed { .. } | Self::Worker(_) => FailureKind::Transport,
        }
    }

    /// Short machine-readable code for the UI.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoActiveModel { .. } => "no_active_model",
            Self::SessionBusy(_) => "session_busy",
            Self::NoActiveSession => "no_active_session",
            Self::AlreadyTerminated(_) => "already_terminated",
            Self::SignalFailed { .. } => "signal_failed",
            Self::Worker(_) => "worker_spawn_failed",
        }
    }

    /// Session the error refers to, if any.
    pub fn session_id(&self) -> Option<&SessionId> {
        match self {
            Self::NoActiveModel { session_id }
            | Self::SignalFailed { session_id, .. }
            | Self::SessionBusy(session_id)
            | Self::AlreadyTerminated(session_id) => Some(session_id),
            Self::NoActiveSession | Self::Worker(_) => None,
        }
    }
}
