//! Model/state cache.
//!
//! Holds the active model id and the last fetched model list. The list is
//! served from cache while it is populated and healthy; an empty or poisoned
//! cache is refetched on read.

use std::sync::Arc;

use jarules_core::{FailureKind, ModelInfo};
use jarules_worker_sdk::{InvocationFailure, InvocationResult, WorkerInvoke};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::{BridgeConfig, WorkerTask};

#[derive(Debug, Default)]
struct ModelList {
    models: Vec<ModelInfo>,
    /// Set when the last refresh failed.
    poisoned: bool,
}

/// Cached model registry backed by the model workers.
pub struct ModelCache {
    invoker: Arc<dyn WorkerInvoke>,
    list_script: String,
    get_script: String,
    set_script: String,
    available: RwLock<ModelList>,
    active: RwLock<Option<String>>,
}

impl ModelCache {
    pub fn new(invoker: Arc<dyn WorkerInvoke>, config: &BridgeConfig) -> Self {
        Self {
            invoker,
            list_script: config.script(WorkerTask::ListModels).to_string(),
            get_script: config.script(WorkerTask::GetActiveModel).to_string(),
            set_script: config.script(WorkerTask::SetActiveModel).to_string(),
            available: RwLock::new(ModelList::default()),
            active: RwLock::new(None),
        }
    }

    /// Populate both the model list and the active model id.
    pub async fn initialize(&self) {
        match self.refresh_models().await {
            Ok(models) => info!(count = models.len(), "Loaded available models"),
            Err(e) => warn!(error = %e, "Initial model list fetch failed"),
        }
        match self.active_model().await {
            Ok(active) => info!(active_model = ?active, "Loaded active model"),
            Err(e) => warn!(error = %e, "Initial active model fetch failed"),
        }
    }

    /// Available models. Never fails: a broken worker yields an empty list.
    pub async fn list_models(&self) -> Vec<ModelInfo> {
        {
            let cached = self.available.read().await;
            if !cached.poisoned && !cached.models.is_empty() {
                debug!(count = cached.models.len(), "Serving model list from cache");
                return cached.models.clone();
            }
        }
        self.refresh_models().await.unwrap_or_default()
    }

    /// Refetch the model list from the worker.
    pub async fn refresh_models(&self) -> Result<Vec<ModelInfo>, InvocationFailure> {
        let result = self
            .invoker
            .invoke(&self.list_script, &[])
            .await
            .into_result()
            .and_then(parse_model_list);

        let mut cached = self.available.write().await;
        match result {
            Ok(models) => {
                cached.models = models.clone();
                cached.poisoned = false;
                Ok(models)
            }
            Err(failure) => {
                warn!(kind = %failure.kind, error = %failure, "Failed to fetch model list");
                cached.models.clear();
                cached.poisoned = true;
                Err(failure)
            }
        }
    }

    /// Query the worker for the active model and update the cache.
    pub async fn active_model(&self) -> Result<Option<String>, InvocationFailure> {
        let payload = self
            .invoker
            .invoke(&self.get_script, &[])
            .await
            .into_result()?;

        let active = match payload.get("active_provider_id") {
            Some(Value::String(id)) if !id.is_empty() => Some(id.clone()),
            Some(Value::Null) | None => None,
            Some(other) => {
                return Err(InvocationFailure::new(
                    FailureKind::Protocol,
                    "Active model worker returned an unexpected id",
                    Some(other.to_string()),
                ));
            }
        };

        *self.active.write().await = active.clone();
        Ok(active)
    }

    /// Active model id as last confirmed, without asking the worker.
    pub async fn cached_active(&self) -> Option<String> {
        self.active.read().await.clone()
    }

    /// Active model id for a new session.
    ///
    /// Uses the cached id, asking the worker only while the cache is empty
    /// (e.g. a prompt that arrives before startup initialization finishes).
    pub async fn resolve_active(&self) -> Option<String> {
        if let Some(id) = self.cached_active().await {
            return Some(id);
        }
        match self.active_model().await {
            Ok(active) => active,
            Err(e) => {
                warn!(error = %e, "Failed to resolve active model");
                None
            }
        }
    }

    /// Ask the worker to switch models.
    ///
    /// The cached id changes only if the worker answers `{"success": true}`;
    /// otherwise a failure is returned and the cache is untouched.
    pub async fn set_active_model(&self, id: &str) -> Result<Value, InvocationFailure> {
        match self.invoker.invoke(&self.set_script, &[id.to_string()]).await {
            InvocationResult::Success(payload)
                if payload.get("success") == Some(&Value::Bool(true)) =>
            {
                info!(model_id = %id, "Active model changed");
                *self.active.write().await = Some(id.to_string());
                Ok(payload)
            }
            InvocationResult::Success(payload) => {
                warn!(model_id = %id, payload = %payload, "Set active model was not confirmed");
                Err(InvocationFailure::new(
                    FailureKind::Protocol,
                    "Set active model worker did not confirm the change",
                    Some(payload.to_string()),
                ))
            }
            InvocationResult::Failure(failure) => {
                warn!(model_id = %id, error = %failure, "Failed to set active model");
                Err(failure)
            }
        }
    }
}

/// Accepts `{"models": [...]}` or a bare array. Entries without an id are skipped.
fn parse_model_list(payload: Value) -> Result<Vec<ModelInfo>, InvocationFailure> {
    let entries = match payload {
        Value::Array(entries) => entries,
        Value::Object(mut obj) => match obj.remove("models") {
            Some(Value::Array(entries)) => entries,
            _ => {
                return Err(InvocationFailure::new(
                    FailureKind::Protocol,
                    "Model list worker returned no models array",
                    None,
                ));
            }
        },
        other => {
            return Err(InvocationFailure::new(
                FailureKind::Protocol,
                "Model list worker returned an unexpected payload",
                Some(other.to_string()),
            ));
        }
    };

    Ok(entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<ModelInfo>(entry) {
            Ok(model) => Some(model),
            Err(e) => {
                warn!(error = %e, "Skipping malformed model entry");
                None
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeInvoker;
    use serde_json::json;

    fn cache(fake: &Arc<FakeInvoker>) -> ModelCache {
        ModelCache::new(fake.clone(), &BridgeConfig::default())
    }

    #[tokio::test]
    async fn test_list_models_is_cached() {
        let fake = Arc::new(FakeInvoker::new());
        fake.respond(
            "get_available_models_wrapper.py",
            InvocationResult::Success(json!({"models": [
                {"id": "gemini_flash_default", "provider": "gemini", "model_name": "gemini-1.5-flash"},
                {"id": "ollama_default_local", "name": "Local Llama"}
            ]})),
        );
        let cache = cache(&fake);

        let models = cache.list_models().await;
        assert_eq!(models.len(), 2);
        assert_eq!(models[1].label(), "Local Llama");
        assert_eq!(models[0].extra["model_name"], "gemini-1.5-flash");

        cache.list_models().await;
        assert_eq!(fake.calls("get_available_models_wrapper.py"), 1);
    }

    #[tokio::test]
    async fn test_list_models_keeps_every_entry_key() {
        let fake = Arc::new(FakeInvoker::new());
        fake.respond(
            "get_available_models_wrapper.py",
            InvocationResult::Success(json!({"models": [
                {"id": "a", "name": "Local"},
                {"id": "b", "name": "B", "display_name": "Bee"}
            ]})),
        );

        let listed = serde_json::to_value(cache(&fake).list_models().await).unwrap();
        assert_eq!(
            listed,
            json!([
                {"id": "a", "name": "Local"},
                {"id": "b", "name": "B", "display_name": "Bee"}
            ])
        );
    }

    #[tokio::test]
    async fn test_list_models_failure_is_empty_and_retried() {
        let fake = Arc::new(FakeInvoker::new());
        fake.respond(
            "get_available_models_wrapper.py",
            InvocationResult::Failure(InvocationFailure::transport("Worker exited with code 1", None)),
        );
        let cache = cache(&fake);

        assert!(cache.list_models().await.is_empty());

        fake.respond(
            "get_available_models_wrapper.py",
            InvocationResult::Success(json!({"models": [{"id": "a"}]})),
        );
        assert_eq!(cache.list_models().await.len(), 1);
        assert_eq!(fake.calls("get_available_models_wrapper.py"), 2);
    }

    #[tokio::test]
    async fn test_application_error_payload_yields_empty_list() {
        let fake = Arc::new(FakeInvoker::new());
        fake.respond(
            "get_available_models_wrapper.py",
            InvocationResult::from_payload(json!({
                "error": true,
                "message": "Configuration file not found",
                "details": "config/llm_config.yaml"
            })),
        );
        assert!(cache(&fake).list_models().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_set_leaves_active_unchanged() {
        let fake = Arc::new(FakeInvoker::new());
        fake.respond(
            "get_active_model_wrapper.py",
            InvocationResult::Success(json!({"active_provider_id": "gemini_flash_default"})),
        );
        fake.respond(
            "set_active_model_wrapper.py",
            InvocationResult::from_payload(json!({"success": false, "error": "Unknown provider id"})),
        );
        let cache = cache(&fake);

        assert_eq!(
            cache.active_model().await.unwrap().as_deref(),
            Some("gemini_flash_default")
        );

        let failure = cache.set_active_model("nope").await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::Application);
        assert_eq!(failure.message, "Unknown provider id");
        assert_eq!(cache.cached_active().await.as_deref(), Some("gemini_flash_default"));
        assert_eq!(fake.last_args("set_active_model_wrapper.py"), vec!["nope".to_string()]);
    }

    #[tokio::test]
    async fn test_successful_set_updates_cache() {
        let fake = Arc::new(FakeInvoker::new());
        fake.respond(
            "set_active_model_wrapper.py",
            InvocationResult::Success(json!({"success": true, "message": "Active model set"})),
        );
        let cache = cache(&fake);

        let payload = cache.set_active_model("ollama_default_local").await.unwrap();
        assert_eq!(payload["success"], true);
        assert_eq!(cache.cached_active().await.as_deref(), Some("ollama_default_local"));
    }

    #[tokio::test]
    async fn test_unconfirmed_set_leaves_active_unchanged() {
        let fake = Arc::new(FakeInvoker::new());
        fake.respond(
            "set_active_model_wrapper.py",
            InvocationResult::Success(json!({"message": "ok"})),
        );
        let cache = cache(&fake);

        let failure = cache.set_active_model("ollama_default_local").await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::Protocol);
        assert_eq!(cache.cached_active().await, None);
    }

    #[tokio::test]
    async fn test_resolve_active_queries_only_when_uncached() {
        let fake = Arc::new(FakeInvoker::new());
        fake.respond(
            "get_active_model_wrapper.py",
            InvocationResult::Success(json!({"active_provider_id": "gemini_flash_default"})),
        );
        let cache = cache(&fake);

        assert_eq!(cache.resolve_active().await.as_deref(), Some("gemini_flash_default"));
        assert_eq!(cache.resolve_active().await.as_deref(), Some("gemini_flash_default"));
        assert_eq!(fake.calls("get_active_model_wrapper.py"), 1);
    }

    #[tokio::test]
    async fn test_null_active_model() {
        let fake = Arc::new(FakeInvoker::new());
        fake.respond(
            "get_active_model_wrapper.py",
            InvocationResult::Success(json!({"active_provider_id": null})),
        );
        assert_eq!(cache(&fake).active_model().await.unwrap(), None);
    }
}
