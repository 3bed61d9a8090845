//! Request router.
//!
//! Maps UI operations onto the bridge and shapes every outcome into JSON the
//! UI can render. List operations always answer with an array; action
//! operations answer with the worker payload or a
//! `{success: false, error, message, details, kind}` object. Nothing here
//! returns an error.

use std::sync::Arc;

use jarules_core::FailureKind;
use jarules_worker_sdk::{InvocationFailure, InvocationResult};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::config::WorkerTask;
use crate::context::BridgeContext;
use crate::error::BridgeError;

/// A UI request, as `{"op": "<operation>", "args": {...}}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", content = "args", rename_all = "kebab-case")]
pub enum Request {
    ListModels,
    GetActiveModel,
    SetActiveModel {
        #[serde(alias = "modelId")]
        id: String,
    },
    SendPromptStreaming {
        prompt: String,
    },
    StopGeneration,
    GetConfig,
    HistoryLoad,
    HistoryAdd {
        message: Value,
    },
    HistoryClear,
    RunAllDiagnostics,
    #[serde(rename_all = "camelCase")]
    GetFileContent {
        run_id: String,
        agent_id: String,
        file_path: String,
        repo_path: String,
    },
    #[serde(rename_all = "camelCase")]
    CreateZipArchive {
        run_id: String,
        agent_id: String,
        repo_path: String,
    },
    GetSessionState,
}

impl Request {
    /// Build a request from an operation name and its arguments.
    ///
    /// `args` may be absent, `null` or `{}` for operations without arguments.
    pub fn parse(op: &str, args: Option<Value>) -> Result<Self, serde_json::Error> {
        let mut envelope = Map::new();
        envelope.insert("op".to_string(), Value::String(op.to_string()));
        match args {
            None | Some(Value::Null) => {}
            Some(Value::Object(obj)) if obj.is_empty() => {}
            Some(args) => {
                envelope.insert("args".to_string(), args);
            }
        }
        serde_json::from_value(Value::Object(envelope))
    }

    /// Operation name on the wire.
    pub fn op(&self) -> &'static str {
        match self {
            Self::ListModels => "list-models",
            Self::GetActiveModel => "get-active-model",
            Self::SetActiveModel { .. } => "set-active-model",
            Self::SendPromptStreaming { .. } => "send-prompt-streaming",
            Self::StopGeneration => "stop-generation",
            Self::GetConfig => "get-config",
            Self::HistoryLoad => "history-load",
            Self::HistoryAdd { .. } => "history-add",
            Self::HistoryClear => "history-clear",
            Self::RunAllDiagnostics => "run-all-diagnostics",
            Self::GetFileContent { .. } => "get-file-content",
            Self::CreateZipArchive { .. } => "create-zip-archive",
            Self::GetSessionState => "get-session-state",
        }
    }

    /// False for fire-and-forget operations.
    pub fn expects_response(&self) -> bool {
        !matches!(self, Self::HistoryAdd { .. })
    }
}

/// Dispatches requests against a shared `BridgeContext`.
#[derive(Clone)]
pub struct Router {
    ctx: Arc<BridgeContext>,
}

impl Router {
    pub fn new(ctx: Arc<BridgeContext>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &Arc<BridgeContext> {
        &self.ctx
    }

    /// Handle one request. Fire-and-forget requests answer `Value::Null`.
    pub async fn dispatch(&self, request: Request) -> Value {
        debug!(op = request.op(), "Dispatching request");

        match request {
            Request::ListModels => to_array(&self.ctx.models.list_models().await),

            Request::GetActiveModel => match self.ctx.models.active_model().await {
                Ok(active) => json!({ "active_provider_id": active }),
                Err(failure) => failure_value(&failure),
            },

            Request::SetActiveModel { id } => match self.ctx.models.set_active_model(&id).await {
                Ok(payload) => success_payload(payload),
                Err(failure) => failure_value(&failure),
            },

            Request::SendPromptStreaming { prompt } => {
                let model_id = self.ctx.models.resolve_active().await;
                match self.ctx.sessions.start(&prompt, model_id).await {
                    Ok(session_id) => json!({ "success": true, "session_id": session_id }),
                    Err(e) => bridge_error_value(&e),
                }
            }

            Request::StopGeneration => match self.ctx.sessions.cancel().await {
                Ok(session_id) => json!({
                    "success": true,
                    "message": "Stop signal sent to generation process.",
                    "session_id": session_id,
                }),
                Err(e) => bridge_error_value(&e),
            },

            Request::GetConfig => self.read_config().await,

            Request::HistoryLoad => Value::Array(self.ctx.history.load().await),

            Request::HistoryAdd { message } => {
                self.ctx.history.add(message);
                Value::Null
            }

            Request::HistoryClear => action_value(self.ctx.history.clear().await),

            Request::RunAllDiagnostics => to_array(&self.ctx.diagnostics.run_all().await),

            Request::GetFileContent {
                run_id,
                agent_id,
                file_path,
                repo_path,
            } => action_value(
                self.ctx
                    .invoke(
                        WorkerTask::GetFileContent,
                        &[run_id, agent_id, file_path, repo_path],
                    )
                    .await,
            ),

            Request::CreateZipArchive {
                run_id,
                agent_id,
                repo_path,
            } => action_value(
                self.ctx
                    .invoke(WorkerTask::CreateZipArchive, &[run_id, agent_id, repo_path])
                    .await,
            ),

            Request::GetSessionState => {
                serde_json::to_value(self.ctx.sessions.snapshot().await)
                    .unwrap_or_else(|_| json!({ "state": "idle" }))
            }
        }
    }

    async fn read_config(&self) -> Value {
        let path = &self.ctx.config().config_file;
        match tokio::fs::read_to_string(path).await {
            Ok(text) => {
                info!(path = %path.display(), "Read configuration file");
                Value::String(text)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read configuration file");
                json!({
                    "success": false,
                    "error": true,
                    "message": "Failed to read configuration file",
                    "details": e.to_string(),
                })
            }
        }
    }
}

/// Failure answer for a request the router could not understand.
pub fn rejection(message: impl Into<String>, details: Option<String>) -> Value {
    failure_value(&InvocationFailure::new(
        FailureKind::Protocol,
        message,
        details,
    ))
}

fn to_array<T: serde::Serialize>(items: &[T]) -> Value {
    match serde_json::to_value(items) {
        Ok(value @ Value::Array(_)) => value,
        Ok(_) => Value::Array(Vec::new()),
        Err(e) => {
            warn!(error = %e, "Failed to encode list result");
            Value::Array(Vec::new())
        }
    }
}

fn action_value(result: InvocationResult) -> Value {
    match result {
        InvocationResult::Success(payload) => payload,
        InvocationResult::Failure(failure) => failure_value(&failure),
    }
}

/// Make sure a successful action answer says so.
fn success_payload(payload: Value) -> Value {
    match payload {
        Value::Object(mut obj) => {
            obj.entry("success").or_insert(Value::Bool(true));
            Value::Object(obj)
        }
        other => json!({ "success": true, "result": other }),
    }
}

fn failure_value(failure: &InvocationFailure) -> Value {
    json!({
        "success": false,
        "error": failure.message,
        "message": failure.message,
        "details": failure.details,
        "kind": failure.kind,
    })
}

fn bridge_error_value(err: &BridgeError) -> Value {
    let message = err.to_string();
    let mut value = json!({
        "success": false,
        "error": message,
        "message": message,
        "code": err.code(),
        "kind": err.kind(),
    });
    if let Some(session_id) = err.session_id() {
        value["session_id"] = json!(session_id);
    }
    value
}
