//! The backend registry: durable backend set plus the liveness/model
//! inventory the dispatcher reads (spec §4.1).

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use ollamax_core::{Backend, Error, OllamaModelInfo, Result};
use ollamax_store::{filter, Repository};

use crate::client::OllamaClient;

pub struct BackendRegistry {
    pub(crate) backends: Arc<dyn Repository<Backend>>,
    pub(crate) models: Arc<dyn Repository<OllamaModelInfo>>,
    pub(crate) http: reqwest::Client,
    pub(crate) staleness: Duration,
}

impl BackendRegistry {
    pub fn new(
        backends: Arc<dyn Repository<Backend>>,
        models: Arc<dyn Repository<OllamaModelInfo>>,
        staleness: Duration,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(StdDuration::from_secs(30))
            .build()
            .expect("reqwest client builds with static config");
        Self {
            backends,
            models,
            http,
            staleness,
        }
    }

    pub fn client_for(&self, backend: &Backend) -> OllamaClient {
        OllamaClient::new(self.http.clone(), backend.base_url.clone())
    }

    /// Register a backend. Callers (the admin HTTP handler, or
    /// `HealthScheduler::start_all` at boot) are responsible for also
    /// starting its recurring health job.
    pub async fn register(&self, name: impl Into<String>, base_url: impl Into<String>) -> Result<Backend> {
        self.backends.insert(Backend::new(name, base_url)).await
    }

    pub async fn deregister(&self, backend_id: &str) -> Result<()> {
        self.backends.delete(backend_id).await
    }

    pub async fn get(&self, backend_id: &str) -> Result<Backend> {
        let backend_id = backend_id.to_string();
        self.backends
            .find_one(filter(move |b: &Backend| b.id == backend_id))
            .await
    }

    pub async fn all(&self) -> Result<Vec<Backend>> {
        self.backends.iterate(filter(|_: &Backend| true)).await
    }

    /// Backends with `last_alive >= now - staleness` (spec §3, §4.2 step 1).
    pub async fn active(&self) -> Result<Vec<Backend>> {
        let now = chrono::Utc::now();
        let staleness = self.staleness;
        Ok(self
            .all()
            .await?
            .into_iter()
            .filter(|b| b.is_active(now, staleness))
            .collect())
    }

    /// Union of every active backend's `models`, deduped by name (spec §4.3
    /// `/api/tags` aggregation).
    pub async fn union_tags(&self) -> Result<Vec<String>> {
        let mut seen = std::collections::BTreeSet::new();
        for backend in self.active().await? {
            for model in backend.models {
                seen.insert(model);
            }
        }
        Ok(seen.into_iter().collect())
    }

    /// Union of every active backend's `running_models` (spec §4.3 `/api/ps`
    /// aggregation).
    pub async fn union_running_models(&self) -> Result<Vec<ollamax_core::RunningModel>> {
        let mut all = Vec::new();
        for backend in self.active().await? {
            all.extend(backend.running_models);
        }
        Ok(all)
    }

    /// `/api/show` resolves against cached metadata, not a live backend call
    /// (spec §4.3).
    pub async fn cached_model(&self, name: &str) -> Result<OllamaModelInfo> {
        let name = name.to_string();
        self.models
            .iterate(filter(move |m: &OllamaModelInfo| m.name == name))
            .await?
            .into_iter()
            .max_by_key(|m| m.fetched_at)
            .ok_or(Error::NotFound("model"))
    }
}
