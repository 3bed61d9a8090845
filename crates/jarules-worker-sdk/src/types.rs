//! Message types exchanged with streaming workers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One line of a streaming worker's stdout.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
    /// Worker accepted the prompt.
    StreamStart {
        #[serde(flatten)]
        metadata: Map<String, Value>,
    },

    /// Partial response.
    Chunk {
        #[serde(default)]
        token: Option<String>,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },

    /// Response complete.
    Done {
        #[serde(default)]
        full_response: Option<String>,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },

    /// Worker-side failure, including acknowledged interrupts.
    Error {
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        details: Option<Value>,
        #[serde(default)]
        cancelled: bool,
    },

    /// Unknown message type (fallback).
    #[serde(untagged)]
    Unknown(Value),
}

impl WorkerMessage {
    /// Decode one stdout line.
    ///
    /// Workers that fail argument validation print a type-less
    /// `{"error": true, "message": ..}` object before streaming starts;
    /// that shape is read as an `Error` message.
    pub fn parse_line(line: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(line)?;
        Self::from_value(value)
    }

    /// Decode an already-parsed JSON value.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        if value.get("type").is_none() && value.get("error") == Some(&Value::Bool(true)) {
            return Ok(Self::Error {
                message: value
                    .get("message")
                    .and_then(|m| m.as_str())
                    .map(str::to_string),
                details: value.get("details").cloned(),
                cancelled: false,
            });
        }
        serde_json::from_value(value)
    }

    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StreamStart { .. } => "stream_start",
            Self::Chunk { .. } => "chunk",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
            Self::Unknown(_) => "unknown",
        }
    }

    /// Whether this message ends the stream from the worker's point of view.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }
}
