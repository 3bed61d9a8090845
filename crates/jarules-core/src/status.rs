//! Session lifecycle states.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// State of a streaming session.
///
/// `Idle -> Starting -> Streaming -> {Completed | Failed | Cancelled} -> Idle`.
/// The terminal states are transient: once the final `Done` event is out the
/// slot is released and the bridge is `Idle` again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No worker is held.
    #[default]
    Idle,
    /// Worker spawned, no `stream_start` seen yet.
    Starting,
    /// `stream_start` seen, chunks flowing.
    Streaming,
    /// Worker reported `done`, or exited cleanly.
    Completed,
    /// Worker reported an error or died.
    Failed,
    /// Worker acknowledged an interrupt.
    Cancelled,
}

impl SessionState {
    /// Returns true if the session has produced its final `Done`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Returns true while a worker process is attached.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Starting | Self::Streaming)
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Idle, Starting)
                | (Starting, Streaming)
                | (Starting, Completed)
                | (Starting, Failed)
                | (Starting, Cancelled)
                | (Streaming, Completed)
                | (Streaming, Failed)
                | (Streaming, Cancelled)
                | (Completed, Idle)
                | (Failed, Idle)
                | (Cancelled, Idle)
        )
    }

    /// Move to `next`, rejecting transitions the lifecycle does not allow.
    pub fn transition(self, next: SessionState) -> Result<SessionState, CoreError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(CoreError::InvalidStateTransition {
                from: self.as_str().to_string(),
                to: next.as_str().to_string(),
            })
        }
    }

    /// Lowercase name used in UI payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Streaming => "streaming",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!SessionState::Idle.is_terminal());
        assert!(!SessionState::Streaming.is_terminal());
        assert!(SessionState::Completed.is_terminal());
        assert!(SessionState::Failed.is_terminal());
        assert!(SessionState::Cancelled.is_terminal());
    }

    #[test]
    fn test_transitions() {
        assert_eq!(
            SessionState::Idle.transition(SessionState::Starting).unwrap(),
            SessionState::Starting
        );
        assert!(SessionState::Starting
            .transition(SessionState::Streaming)
            .is_ok());
        assert!(SessionState::Streaming
            .transition(SessionState::Cancelled)
            .is_ok());
        assert!(SessionState::Completed.transition(SessionState::Idle).is_ok());

        let err = SessionState::Completed
            .transition(SessionState::Streaming)
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidStateTransition { .. }));
        assert!(SessionState::Idle.transition(SessionState::Streaming).is_err());
    }

    #[test]
    fn test_live_states() {
        assert!(SessionState::Starting.is_live());
        assert!(SessionState::Streaming.is_live());
        assert!(!SessionState::Idle.is_live());
        assert!(!SessionState::Completed.is_live());
    }
}
