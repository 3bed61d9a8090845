//! Streaming events delivered to the UI.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FailureKind;
use crate::ids::SessionId;

/// Event emitted on the UI event channel while a prompt streams.
///
/// Serializes as `{"event": "<channel>", "payload": {...}}`, which is the
/// exact line the host writes for a UI shell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case")]
pub enum BridgeEvent {
    /// Worker acknowledged the prompt.
    StreamStarted {
        session_id: SessionId,
        #[serde(default)]
        model_id: Option<String>,
        /// The worker's `stream_start` message as received.
        #[serde(default)]
        metadata: Value,
    },

    /// A piece of the response.
    StreamChunk {
        session_id: SessionId,
        /// Text token, when the worker sent one.
        #[serde(default)]
        token: Option<String>,
        /// The worker's `chunk` message as received.
        #[serde(default)]
        data: Value,
    },

    /// The session failed or was interrupted. Always followed by a `StreamDone`.
    StreamError {
        session_id: SessionId,
        message: String,
        #[serde(default)]
        details: Option<Value>,
        #[serde(default)]
        cancelled: bool,
        kind: FailureKind,
    },

    /// Final event of a session. Exactly one per session.
    StreamDone {
        session_id: SessionId,
        #[serde(flatten)]
        summary: DoneSummary,
    },
}

/// Outcome carried by `StreamDone`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DoneSummary {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub cancelled: bool,
    /// Set when the bridge synthesized the summary instead of the worker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl DoneSummary {
    /// Worker finished and reported its full response.
    pub fn completed(full_response: Option<String>) -> Self {
        Self {
            success: true,
            full_response,
            ..Default::default()
        }
    }

    /// Session ended in error.
    pub fn failed(error: impl Into<String>, cancelled: bool) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            cancelled,
            ..Default::default()
        }
    }

    /// Attach a bridge note.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

impl BridgeEvent {
    /// Create a StreamStarted event.
    pub fn started(session_id: SessionId, model_id: Option<String>, metadata: Value) -> Self {
        Self::StreamStarted {
            session_id,
            model_id,
            metadata,
        }
    }

    /// Create a StreamChunk event, lifting the `token` field out of the raw message.
    pub fn chunk(session_id: SessionId, data: Value) -> Self {
        let token = data
            .get("token")
            .and_then(|t| t.as_str())
            .map(str::to_string);
        Self::StreamChunk {
            session_id,
            token,
            data,
        }
    }

    /// Create a StreamError event.
    pub fn error(
        session_id: SessionId,
        kind: FailureKind,
        message: impl Into<String>,
        details: Option<Value>,
        cancelled: bool,
    ) -> Self {
        Self::StreamError {
            session_id,
            message: message.into(),
            details,
            cancelled,
            kind,
        }
    }

    /// Create a StreamDone event.
    pub fn done(session_id: SessionId, summary: DoneSummary) -> Self {
        Self::StreamDone {
            session_id,
            summary,
        }
    }

    /// UI channel name for this event.
    pub fn channel(&self) -> &'static str {
        match self {
            Self::StreamStarted { .. } => "stream-started",
            Self::StreamChunk { .. } => "stream-chunk",
            Self::StreamError { .. } => "stream-error",
            Self::StreamDone { .. } => "stream-done",
        }
    }

    /// Session this event belongs to.
    pub fn session_id(&self) -> &SessionId {
        match self {
            Self::StreamStarted { session_id, .. }
            | Self::StreamChunk { session_id, .. }
            | Self::StreamError { session_id, .. }
            | Self::StreamDone { session_id, .. } => session_id,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::StreamDone { .. })
    }
}
