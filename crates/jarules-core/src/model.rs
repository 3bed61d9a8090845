//! Model descriptors returned by the model-listing worker.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One entry of the available models list.
///
/// Only `id` is required. Every other key the worker reports about the
/// provider configuration stays in `extra` and goes back to the UI as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Provider configuration id (e.g. "gemini_flash_default").
    pub id: String,

    /// Remaining provider-specific fields, including any name keys.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Keys checked, in order, for a human-readable name.
const NAME_KEYS: [&str; 3] = ["displayName", "display_name", "name"];

impl ModelInfo {
    /// Create a new ModelInfo with minimal required fields.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            extra: Map::new(),
        }
    }

    /// Builder method to set the `name` key.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.extra.insert("name".to_string(), Value::String(name.into()));
        self
    }

    /// Provider name (e.g. "gemini", "ollama"), if reported.
    pub fn provider(&self) -> Option<&str> {
        self.extra.get("provider").and_then(Value::as_str)
    }

    /// Name to show in a picker: the first non-empty name key, falling back to the id.
    pub fn label(&self) -> &str {
        NAME_KEYS
            .iter()
            .filter_map(|key| self.extra.get(*key).and_then(Value::as_str))
            .find(|name| !name.is_empty())
            .unwrap_or(&self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_provider_config() {
        let model: ModelInfo = serde_json::from_value(json!({
            "id": "ollama_default_local",
            "name": "Local Ollama",
            "provider": "ollama",
            "model_name": "llama3",
            "enabled": true
        }))
        .unwrap();

        assert_eq!(model.id, "ollama_default_local");
        assert_eq!(model.label(), "Local Ollama");
        assert_eq!(model.provider(), Some("ollama"));
        assert_eq!(model.extra.get("model_name"), Some(&json!("llama3")));
    }

    #[test]
    fn test_label_falls_back_to_id() {
        let model = ModelInfo::new("gemini_flash_default");
        assert_eq!(model.label(), "gemini_flash_default");
        assert_eq!(
            ModelInfo::new("x").with_name("X").label(),
            "X"
        );
    }

    #[test]
    fn test_name_keys_pass_through() {
        let entry = json!({
            "id": "b",
            "name": "B",
            "display_name": "Bee",
            "provider": "openrouter"
        });
        let model: ModelInfo = serde_json::from_value(entry.clone()).unwrap();

        assert_eq!(model.label(), "Bee");
        assert_eq!(serde_json::to_value(&model).unwrap(), entry);
    }
}
