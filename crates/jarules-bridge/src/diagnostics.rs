//! Diagnostics runner.

use std::sync::Arc;

use jarules_core::DiagnosticResult;
use jarules_worker_sdk::{InvocationResult, WorkerInvoke};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config::DiagnosticTask;

/// Runs the configured diagnostic checks in order.
pub struct DiagnosticsRunner {
    invoker: Arc<dyn WorkerInvoke>,
    tasks: Vec<DiagnosticTask>,
}

impl DiagnosticsRunner {
    pub fn new(invoker: Arc<dyn WorkerInvoke>, tasks: Vec<DiagnosticTask>) -> Self {
        Self { invoker, tasks }
    }

    pub fn tasks(&self) -> &[DiagnosticTask] {
        &self.tasks
    }

    /// Run every task, one after the other, and flatten the results.
    ///
    /// A failing task contributes one error row and does not stop the batch.
    /// Tasks may report a single object or an array of them.
    pub async fn run_all(&self) -> Vec<DiagnosticResult> {
        let mut results = Vec::new();

        for task in &self.tasks {
            match self.invoker.invoke(&task.script, &[]).await {
                InvocationResult::Success(Value::Array(entries)) => {
                    for (index, entry) in entries.iter().enumerate() {
                        let fallback_id = format!("{}_{}", task.id, index);
                        results.push(entry_result(task, entry, &fallback_id));
                    }
                }
                InvocationResult::Success(entry) => {
                    results.push(entry_result(task, &entry, &task.id));
                }
                InvocationResult::Failure(failure) => {
                    warn!(task = %task.id, error = %failure, "Diagnostic task failed");
                    results.push(DiagnosticResult::error(
                        task.id.clone(),
                        task.name.clone(),
                        failure.message.clone(),
                        json!({
                            "kind": failure.kind,
                            "details": failure.details,
                            "script": task.script,
                        }),
                    ));
                }
            }
        }

        info!(
            tasks = self.tasks.len(),
            results = results.len(),
            "Diagnostics complete"
        );
        results
    }
}

fn entry_result(task: &DiagnosticTask, entry: &Value, fallback_id: &str) -> DiagnosticResult {
    DiagnosticResult::from_worker_value(entry, fallback_id, &task.name).unwrap_or_else(|e| {
        warn!(task = %task.id, error = %e, "Malformed diagnostic entry");
        DiagnosticResult::error(
            fallback_id,
            task.name.clone(),
            "Diagnostic returned a malformed result",
            entry.clone(),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeInvoker;
    use jarules_core::DiagnosticStatus;
    use jarules_worker_sdk::InvocationFailure;

    fn three_tasks() -> Vec<DiagnosticTask> {
        vec![
            DiagnosticTask::new("python_env", "Python Environment", "env.py"),
            DiagnosticTask::new("config_files", "Configuration Files", "config.py"),
            DiagnosticTask::new("llm_connectivity", "LLM Connectivity", "llm.py"),
        ]
    }

    #[tokio::test]
    async fn test_flattens_arrays_and_isolates_failures() {
        let fake = Arc::new(FakeInvoker::new());
        fake.respond(
            "env.py",
            InvocationResult::Success(json!({
                "id": "python_env",
                "name": "Python Environment",
                "status": "success",
                "message": "Python 3.11.4 found",
                "details": {"version": "3.11.4"},
                "timestamp": "2024-05-01T10:00:00.000Z"
            })),
        );
        fake.respond(
            "config.py",
            InvocationResult::Success(json!([
                {"id": "config_llm", "name": "llm_config.yaml", "status": "success", "message": "Found"},
                {"name": "agent_config.yaml", "status": "warning", "message": "Missing optional file"}
            ])),
        );
        fake.respond(
            "llm.py",
            InvocationResult::Failure(InvocationFailure::transport(
                "Worker 'llm.py' exited with code 1",
                Some("Traceback (most recent call last): ...".to_string()),
            )),
        );

        let runner = DiagnosticsRunner::new(fake.clone(), three_tasks());
        let results = runner.run_all().await;

        assert_eq!(results.len(), 4);
        assert_eq!(results[0].id, "python_env");
        assert_eq!(results[0].status, DiagnosticStatus::Ok);
        assert_eq!(results[0].timestamp, "2024-05-01T10:00:00.000Z");
        assert_eq!(results[1].id, "config_llm");
        assert_eq!(results[2].id, "config_files_1");
        assert_eq!(results[2].status, DiagnosticStatus::Warning);
        assert!(!results[2].timestamp.is_empty());
        assert_eq!(results[3].id, "llm_connectivity");
        assert_eq!(results[3].status, DiagnosticStatus::Error);
        assert_eq!(results[3].details["kind"], "transport");

        assert_eq!(fake.call_order(), vec!["env.py", "config.py", "llm.py"]);
    }

    #[tokio::test]
    async fn test_malformed_entry_is_synthesized() {
        let fake = Arc::new(FakeInvoker::new());
        fake.respond("env.py", InvocationResult::Success(json!("python ok")));
        fake.respond("config.py", InvocationResult::Success(json!([42])));
        fake.respond(
            "llm.py",
            InvocationResult::from_payload(json!({"error": "API key not configured"})),
        );

        let results = DiagnosticsRunner::new(fake, three_tasks()).run_all().await;

        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.status == DiagnosticStatus::Error));
        assert_eq!(results[0].id, "python_env");
        assert_eq!(results[0].details, json!("python ok"));
        assert_eq!(results[1].id, "config_files_0");
        assert_eq!(results[2].message, "API key not configured");
    }
}
