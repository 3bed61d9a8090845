//! Chat history client.
//!
//! The history store lives behind three workers; this module only relays.

use std::sync::Arc;

use jarules_core::FailureKind;
use jarules_worker_sdk::{InvocationFailure, InvocationResult, WorkerInvoke};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::{BridgeConfig, WorkerTask};

#[derive(Clone)]
pub struct HistoryClient {
    invoker: Arc<dyn WorkerInvoke>,
    load_script: String,
    save_script: String,
    clear_script: String,
}

impl HistoryClient {
    pub fn new(invoker: Arc<dyn WorkerInvoke>, config: &BridgeConfig) -> Self {
        Self {
            invoker,
            load_script: config.script(WorkerTask::HistoryLoad).to_string(),
            save_script: config.script(WorkerTask::HistorySave).to_string(),
            clear_script: config.script(WorkerTask::HistoryClear).to_string(),
        }
    }

    /// Stored messages, oldest first. Empty on any failure.
    pub async fn load(&self) -> Vec<Value> {
        match self.invoker.invoke(&self.load_script, &[]).await {
            InvocationResult::Success(Value::Array(messages)) => {
                debug!(count = messages.len(), "Loaded chat history");
                messages
            }
            InvocationResult::Success(other) => {
                warn!(payload = %other, "History worker did not return an array");
                Vec::new()
            }
            InvocationResult::Failure(failure) => {
                warn!(error = %failure, "Failed to load chat history");
                Vec::new()
            }
        }
    }

    /// Persist one message and wait for the worker's answer.
    pub async fn save(&self, message: &Value) -> InvocationResult {
        let encoded = match serde_json::to_string(message) {
            Ok(encoded) => encoded,
            Err(e) => {
                return InvocationResult::Failure(InvocationFailure::new(
                    FailureKind::Protocol,
                    "Could not encode history message",
                    Some(e.to_string()),
                ));
            }
        };
        self.invoker.invoke(&self.save_script, &[encoded]).await
    }

    /// Persist one message in the background. Failures are only logged.
    pub fn add(&self, message: Value) -> JoinHandle<()> {
        let client = self.clone();
        tokio::spawn(async move {
            if let InvocationResult::Failure(failure) = client.save(&message).await {
                warn!(error = %failure, "Failed to save chat message");
            }
        })
    }

    pub async fn clear(&self) -> InvocationResult {
        self.invoker.invoke(&self.clear_script, &[]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeInvoker;
    use serde_json::json;
    use std::sync::Mutex;

    /// Fake store that keeps saved messages as the JSON text it received.
    fn store_backed(fake: &FakeInvoker) -> Arc<Mutex<Vec<String>>> {
        let store = Arc::new(Mutex::new(Vec::new()));

        let saved = store.clone();
        fake.respond_with("save_chat_message_wrapper.py", move |args| {
            saved.lock().unwrap().push(args[0].clone());
            InvocationResult::Success(json!({"success": true}))
        });

        let loaded = store.clone();
        fake.respond_with("get_chat_history_wrapper.py", move |_| {
            let messages: Vec<Value> = loaded
                .lock()
                .unwrap()
                .iter()
                .map(|raw| serde_json::from_str(raw).unwrap())
                .collect();
            InvocationResult::Success(Value::Array(messages))
        });

        store
    }

    #[tokio::test]
    async fn test_added_message_round_trips() {
        let fake = Arc::new(FakeInvoker::new());
        store_backed(&fake);
        let history = HistoryClient::new(fake.clone(), &BridgeConfig::default());

        let message = json!({
            "sender": "user",
            "text": "Hello \"world\"\nsecond line",
            "timestamp": "2024-05-01T10:00:00.000Z",
            "meta": {"tokens": 3, "tags": ["a", "b"]}
        });
        history.add(message.clone()).await.unwrap();

        let loaded = history.load().await;
        assert_eq!(loaded, vec![message]);
    }

    #[tokio::test]
    async fn test_load_failure_is_empty() {
        let fake = Arc::new(FakeInvoker::new());
        let history = HistoryClient::new(fake.clone(), &BridgeConfig::default());
        assert!(history.load().await.is_empty());

        fake.respond(
            "get_chat_history_wrapper.py",
            InvocationResult::Success(json!({"unexpected": "object"})),
        );
        assert!(history.load().await.is_empty());
    }

    #[tokio::test]
    async fn test_clear_relays_worker_result() {
        let fake = Arc::new(FakeInvoker::new());
        fake.respond(
            "clear_chat_history_wrapper.py",
            InvocationResult::Success(json!({"success": true, "message": "Chat history cleared."})),
        );
        let history = HistoryClient::new(fake.clone(), &BridgeConfig::default());
        assert!(history.clear().await.is_success());
    }
}
