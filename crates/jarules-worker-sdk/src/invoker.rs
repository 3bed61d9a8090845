//! One-shot worker invocation.
//!
//! A one-shot worker runs to completion and prints a single JSON payload on
//! stdout. `invoke` always resolves: spawn failures, crashes and empty output
//! come back as `InvocationResult::Failure`, never as an `Err`.

use std::process::Output;

use async_trait::async_trait;
use jarules_core::FailureKind;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::command::WorkerCommand;

/// Result of a one-shot invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum InvocationResult {
    /// Worker produced a payload that is not an error report.
    Success(Value),
    /// Worker could not run, produced nothing usable, or reported an error.
    Failure(InvocationFailure),
}

/// Normalized failure of a worker invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvocationFailure {
    pub kind: FailureKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl InvocationFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details,
        }
    }

    pub fn transport(message: impl Into<String>, details: Option<String>) -> Self {
        Self::new(FailureKind::Transport, message, details)
    }

    pub fn application(message: impl Into<String>, details: Option<String>) -> Self {
        Self::new(FailureKind::Application, message, details)
    }
}

impl std::fmt::Display for InvocationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.details {
            Some(details) => write!(f, "{} ({})", self.message, details),
            None => f.write_str(&self.message),
        }
    }
}

impl InvocationResult {
    /// Classify a worker payload.
    ///
    /// Workers report domain errors in-band, in one of three shapes:
    /// `{"error": true, "message", "details"}`, `{"error": "<message>"}` or
    /// `{"success": false, ...}`. Those become `Application` failures; any
    /// other value is a success.
    pub fn from_payload(payload: Value) -> Self {
        let Some(obj) = payload.as_object() else {
            return Self::Success(payload);
        };

        let text = |key: &str| obj.get(key).and_then(|v| v.as_str()).map(str::to_string);
        let details = || obj.get("details").map(value_to_details);

        match obj.get("error") {
            Some(Value::Bool(true)) => {
                return Self::Failure(InvocationFailure::application(
                    text("message").unwrap_or_else(|| "Worker reported an error".to_string()),
                    details(),
                ));
            }
            Some(Value::String(message)) if !message.is_empty() => {
                return Self::Failure(InvocationFailure::application(message.clone(), details()));
            }
            _ => {}
        }

        if obj.get("success") == Some(&Value::Bool(false)) {
            return Self::Failure(InvocationFailure::application(
                text("message")
                    .or_else(|| text("error"))
                    .unwrap_or_else(|| "Worker reported failure".to_string()),
                details(),
            ));
        }

        Self::Success(payload)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Convert into a `Result`, for callers that want `?`.
    pub fn into_result(self) -> Result<Value, InvocationFailure> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Failure(failure) => Err(failure),
        }
    }
}

fn value_to_details(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Anything that can run a named worker task.
///
/// The bridge depends on this trait rather than on `WorkerInvoker` so tests
/// can substitute scripted workers.
#[async_trait]
pub trait WorkerInvoke: Send + Sync {
    /// Run `script` with positional `args` and return its normalized result.
    async fn invoke(&self, script: &str, args: &[String]) -> InvocationResult;
}

/// Runs one-shot worker scripts as child processes.
#[derive(Debug, Clone, Default)]
pub struct WorkerInvoker {
    command: WorkerCommand,
}

impl WorkerInvoker {
    pub fn new(command: WorkerCommand) -> Self {
        Self { command }
    }

    pub fn command(&self) -> &WorkerCommand {
        &self.command
    }
}

#[async_trait]
impl WorkerInvoke for WorkerInvoker {
    async fn invoke(&self, script: &str, args: &[String]) -> InvocationResult {
        info!(
            script = %script,
            interpreter = %self.command.interpreter(),
            arg_count = args.len(),
            "Invoking worker"
        );

        let output = match self.command.build(script, args).output().await {
            Ok(output) => output,
            Err(e) => {
                error!(script = %script, error = %e, "Failed to spawn worker");
                return InvocationResult::Failure(InvocationFailure::transport(
                    format!("Failed to start worker '{}'", script),
                    Some(e.to_string()),
                ));
            }
        };

        decode_output(script, &output)
    }
}

/// Turn a finished worker's output into an `InvocationResult`.
fn decode_output(script: &str, output: &Output) -> InvocationResult {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();

    for line in stderr.lines().filter(|l| !l.trim().is_empty()) {
        warn!(script = %script, stderr = %line.trim(), "Worker stderr");
    }

    let exit_code = output.status.code();
    info!(
        script = %script,
        exit_code = ?exit_code,
        success = output.status.success(),
        stdout_bytes = output.stdout.len(),
        "Worker exited"
    );

    if let Some(payload) = first_json_payload(&stdout) {
        return InvocationResult::from_payload(payload);
    }

    // Import failures are reported as a JSON error object on stderr.
    if !output.status.success() {
        if let Some(payload) = first_json_payload(stderr) {
            if let failure @ InvocationResult::Failure(_) = InvocationResult::from_payload(payload) {
                warn!(script = %script, exit_code = ?exit_code, "Worker reported an error on stderr");
                return failure;
            }
        }
    }

    let details = if !stderr.is_empty() {
        Some(stderr.to_string())
    } else if !stdout.trim().is_empty() {
        Some(preview(stdout.trim()))
    } else {
        None
    };

    let message = if !output.status.success() {
        match exit_code {
            Some(code) => format!("Worker '{}' exited with code {}", script, code),
            None => format!("Worker '{}' was terminated by a signal", script),
        }
    } else if stdout.trim().is_empty() {
        format!("Worker '{}' produced no output", script)
    } else {
        format!("Worker '{}' produced no parseable JSON output", script)
    };

    warn!(script = %script, message = %message, "Worker invocation failed");
    InvocationResult::Failure(InvocationFailure::transport(message, details))
}

/// Pick the canonical payload out of a worker's stdout.
///
/// Stdout holding exactly one JSON document (pretty-printed or not) is that
/// document. Otherwise the first line that parses as JSON wins and later
/// lines are dropped.
pub fn first_json_payload(stdout: &str) -> Option<Value> {
    let whole = stdout.trim();
    if whole.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str::<Value>(whole) {
        return Some(value);
    }

    let mut parsed_lines = 0usize;
    let mut first = None;

    for line in stdout.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(trimmed) {
            Ok(value) => {
                parsed_lines += 1;
                if first.is_none() {
                    first = Some(value);
                }
            }
            Err(_) => {
                debug!(preview = %preview(trimmed), "Ignoring non-JSON stdout line");
            }
        }
    }

    if parsed_lines > 1 {
        debug!(
            discarded = parsed_lines - 1,
            "Worker printed extra JSON lines after the payload"
        );
    }

    first
}

fn preview(text: &str) -> String {
    text.chars().take(200).collect()
}
