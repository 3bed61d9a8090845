//! Core domain errors and the failure taxonomy.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Core domain errors for the bridge.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Invalid state transition.
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    /// Payload did not have the expected shape.
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
}

/// Classification of everything that can go wrong between the UI and a worker.
///
/// All four kinds collapse into the same two UI shapes (empty list or
/// `{success:false, ...}`); the kind is kept for logging and for callers that
/// want to react differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Process could not run, died, or produced no parseable output.
    Transport,
    /// Worker ran and reported a domain error inside its JSON.
    Application,
    /// Worker emitted a message of unexpected type or shape.
    Protocol,
    /// Operation attempted in the wrong bridge state.
    State,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transport => "transport",
            Self::Application => "application",
            Self::Protocol => "protocol",
            Self::State => "state",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
