//! Diagnostic check results.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;

/// Outcome of one diagnostic check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticStatus {
    Ok,
    Warning,
    Error,
}

impl DiagnosticStatus {
    /// Parse a worker status string. Workers say `"success"` for a passing check.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "ok" | "success" | "passed" => Self::Ok,
            "warning" | "warn" => Self::Warning,
            _ => Self::Error,
        }
    }
}

/// One row of the diagnostics report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticResult {
    pub id: String,
    pub name: String,
    pub status: DiagnosticStatus,
    pub message: String,
    #[serde(default)]
    pub details: Value,
    /// ISO 8601, UTC, `Z` suffix.
    pub timestamp: String,
}

/// Current time in the timestamp format workers use.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl DiagnosticResult {
    /// Synthesize an error row for a check that could not report for itself.
    pub fn error(
        id: impl Into<String>,
        name: impl Into<String>,
        message: impl Into<String>,
        details: Value,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: DiagnosticStatus::Error,
            message: message.into(),
            details,
            timestamp: now_timestamp(),
        }
    }

    /// Build a result from a worker-reported object, filling holes.
    ///
    /// Missing or empty `id`/`timestamp` are synthesized from `fallback_id`
    /// and the current time; a missing `name` takes `fallback_name`. Anything
    /// that is not a JSON object is rejected.
    pub fn from_worker_value(
        value: &Value,
        fallback_id: &str,
        fallback_name: &str,
    ) -> Result<Self, CoreError> {
        let obj = value.as_object().ok_or_else(|| {
            CoreError::MalformedPayload(format!("diagnostic entry is not an object: {}", value))
        })?;

        let text = |key: &str| {
            obj.get(key)
                .and_then(|v| v.as_str())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let status = obj
            .get("status")
            .and_then(|s| s.as_str())
            .map(DiagnosticStatus::parse)
            .unwrap_or(DiagnosticStatus::Error);

        Ok(Self {
            id: text("id").unwrap_or_else(|| fallback_id.to_string()),
            name: text("name").unwrap_or_else(|| fallback_name.to_string()),
            status,
            message: text("message").unwrap_or_default(),
            details: obj.get("details").cloned().unwrap_or(Value::Null),
            timestamp: text("timestamp").unwrap_or_else(now_timestamp),
        })
    }
}
