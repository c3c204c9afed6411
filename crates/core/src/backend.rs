//! Backend registration and model-listing types (spec §3, §4.1), grounded on
//! `examples/original_source/ollama_x/model/server.py`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered Ollama-protocol backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Backend {
    pub id: String,
    pub name: String,
    pub base_url: String,
    /// Models this backend is known to serve, Ollama-flavor (`name:version`).
    pub models: Vec<String>,
    /// Snapshot of `/api/ps` from the last `check_running_models` tick
    /// (spec §4.1); reset to empty on probe failure (fail-closed).
    pub running_models: Vec<RunningModel>,
    pub last_update: Option<DateTime<Utc>>,
    /// Set by the health scheduler on every successful probe.
    pub last_alive: Option<DateTime<Utc>>,
    pub is_enabled: bool,
}

impl Backend {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            base_url: base_url.into(),
            models: Vec::new(),
            running_models: Vec::new(),
            last_update: None,
            last_alive: None,
            is_enabled: true,
        }
    }

    /// A backend counts as alive only within the staleness window since its
    /// last successful probe (spec §4.1: 20s).
    pub fn is_active(&self, now: DateTime<Utc>, staleness_window: chrono::Duration) -> bool {
        self.is_enabled
            && self
                .last_alive
                .is_some_and(|last| now - last <= staleness_window)
    }

    /// Spec §4.2 step 2: a backend serves `M` if some entry of `models` *or*
    /// `running_models` matches, with the implicit `:latest` fallback.
    pub fn serves(&self, ollama_model_name: &str) -> bool {
        self.models
            .iter()
            .any(|m| crate::model_name::ModelName::matches(ollama_model_name, m))
            || self
                .running_models
                .iter()
                .any(|m| crate::model_name::ModelName::matches(ollama_model_name, &m.model))
    }

    /// Spec §4.2 step 5: when `M` omits a version, substitute the first
    /// model whose name starts with `M` so version-less requests still
    /// resolve against a backend's exact inventory.
    pub fn resolve_exact_model(&self, requested: &str) -> Option<&str> {
        if self.models.iter().any(|m| m == requested) {
            return Some(requested);
        }
        self.models
            .iter()
            .find(|m| m.starts_with(requested))
            .map(String::as_str)
    }
}

/// One entry of `GET /api/tags`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSummary {
    pub name: String,
    pub model: String,
    pub modified_at: DateTime<Utc>,
    pub size: u64,
    pub digest: String,
}

/// Response body of `POST /api/show`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDetails {
    pub name: String,
    pub modelfile: String,
    pub parameters: String,
    pub template: String,
    pub details: serde_json::Value,
}

/// One entry of `GET /api/ps` (spec §3: `{model, expires_at, size_vram,
/// details}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunningModel {
    pub model: String,
    pub expires_at: DateTime<Utc>,
    pub size_vram: u64,
    #[serde(default)]
    pub details: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_is_inactive_without_a_probe() {
        let backend = Backend::new("b1", "http://localhost:11434");
        assert!(!backend.is_active(Utc::now(), chrono::Duration::seconds(20)));
    }

    #[test]
    fn backend_goes_stale_outside_the_window() {
        let mut backend = Backend::new("b1", "http://localhost:11434");
        backend.last_alive = Some(Utc::now() - chrono::Duration::seconds(30));
        assert!(!backend.is_active(Utc::now(), chrono::Duration::seconds(20)));
    }

    #[test]
    fn backend_serves_checks_model_list() {
        let mut backend = Backend::new("b1", "http://localhost:11434");
        backend.models = vec!["llama3:latest".to_string()];
        assert!(backend.serves("llama3"));
        assert!(!backend.serves("mistral"));
    }

    #[test]
    fn backend_serves_checks_running_models_too() {
        let mut backend = Backend::new("b1", "http://localhost:11434");
        backend.running_models.push(RunningModel {
            model: "mistral:latest".to_string(),
            expires_at: Utc::now() + chrono::Duration::minutes(5),
            size_vram: 1024,
            details: serde_json::Value::Null,
        });
        assert!(backend.serves("mistral"));
    }

    #[test]
    fn resolve_exact_model_falls_back_to_prefix_match() {
        let mut backend = Backend::new("b1", "http://localhost:11434");
        backend.models = vec!["llama3:8b-instruct".to_string()];
        assert_eq!(backend.resolve_exact_model("llama3"), Some("llama3:8b-instruct"));
        assert_eq!(
            backend.resolve_exact_model("llama3:8b-instruct"),
            Some("llama3:8b-instruct")
        );
    }
}
