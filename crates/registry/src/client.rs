//! Minimal Ollama-protocol client used by the health scheduler to probe a
//! backend's `/api/tags`, `/api/ps`, and `/api/show`, grounded on
//! `examples/original_source/ollama_x/api/proxy.py`'s direct use of `httpx`
//! against these same three paths.

use std::time::Duration;

use serde::Deserialize;

/// Control-operation timeout (spec §5: 5s connect/read for `/api/tags`,
/// `/api/show`).
const CONTROL_TIMEOUT: Duration = Duration::from_secs(5);

/// `pull_model` streams get a much longer timeout (spec §5: 5 minutes).
const PULL_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Deserialize)]
pub struct TagsResponse {
    #[serde(default)]
    pub models: Vec<TagEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TagEntry {
    pub name: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub digest: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub details: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct PsResponse {
    #[serde(default)]
    pub models: Vec<PsEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PsEntry {
    pub model: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub size_vram: u64,
    #[serde(default)]
    pub details: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShowResponse {
    #[serde(default)]
    pub modelfile: String,
    #[serde(default)]
    pub parameters: String,
    #[serde(default)]
    pub template: String,
    #[serde(default)]
    pub details: serde_json::Value,
    /// Carries `general.architecture` / `<arch>.context_length` (spec §3).
    #[serde(default, rename = "model_info")]
    pub info: serde_json::Value,
}

pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
}

impl OllamaClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    pub async fn tags(&self) -> reqwest::Result<TagsResponse> {
        self.http
            .get(format!("{}/api/tags", self.base_url))
            .timeout(CONTROL_TIMEOUT)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }

    pub async fn ps(&self) -> reqwest::Result<PsResponse> {
        self.http
            .get(format!("{}/api/ps", self.base_url))
            .timeout(CONTROL_TIMEOUT)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }

    pub async fn show(&self, model: &str) -> reqwest::Result<ShowResponse> {
        self.http
            .post(format!("{}/api/show", self.base_url))
            .timeout(CONTROL_TIMEOUT)
            .json(&serde_json::json!({ "model": model, "verbose": true }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }

    /// Used by `GET /server/{id}/model.list` (spec §6): same wire call as
    /// [`Self::tags`], exposed under its own name at the call site so the
    /// admin model-listing handler doesn't read as reusing the health
    /// scheduler's probe.
    pub async fn list_models(&self) -> reqwest::Result<TagsResponse> {
        self.tags().await
    }

    /// `POST /api/pull`, left unbuffered for the caller to stream onward
    /// (spec §6 `POST /server/{id}/model.pull`, spec §5: 5 minute timeout).
    pub async fn pull_model(&self, model: &str) -> reqwest::Result<reqwest::Response> {
        self.http
            .post(format!("{}/api/pull", self.base_url))
            .timeout(PULL_TIMEOUT)
            .json(&serde_json::json!({ "model": model, "stream": true }))
            .send()
            .await?
            .error_for_status()
    }

    /// `DELETE /api/delete` (spec §6 `DELETE /server/{id}/model.delete`).
    pub async fn delete_model(&self, model: &str) -> reqwest::Result<()> {
        self.http
            .request(reqwest::Method::DELETE, format!("{}/api/delete", self.base_url))
            .timeout(CONTROL_TIMEOUT)
            .json(&serde_json::json!({ "model": model }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
