//! Top-level dispatcher: owns the process-wide per-backend queue registry
//! and wires backend selection to queue admission (spec §4.2, §9's
//! "`QueueHandler.QUEUES` is a process-wide registry of per-backend queues,
//! keyed by URL. Creation is idempotent on first use.").

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use ollamax_core::{Backend, Result};
use ollamax_registry::BackendRegistry;

use crate::queue::QueueHandler;
use crate::selection::select_least_loaded;

/// Generic over the proxy's response type `T` so this crate never needs to
/// know about HTTP bodies or streaming -- `crates/proxy` supplies `work`.
pub struct Dispatcher<T> {
    registry: Arc<BackendRegistry>,
    queues: DashMap<String, Arc<QueueHandler<T>>>,
    limit: usize,
}

impl<T: Send + 'static> Dispatcher<T> {
    pub fn new(registry: Arc<BackendRegistry>, limit: usize) -> Self {
        Self {
            registry,
            queues: DashMap::new(),
            limit,
        }
    }

    /// Lazily instantiate the `QueueHandler` for a backend URL. `DashMap`'s
    /// `entry` locks the owning shard for the duration of the closure, so
    /// two concurrent cold-starts for the same new URL still construct
    /// exactly one handler.
    fn queue_for(&self, base_url: &str) -> Arc<QueueHandler<T>> {
        self.queues
            .entry(base_url.to_string())
            .or_insert_with(|| Arc::new(QueueHandler::new(self.limit)))
            .clone()
    }

    pub fn queue_depth(&self, base_url: &str) -> usize {
        self.queues.get(base_url).map(|q| q.depth()).unwrap_or(0)
    }

    /// Select the least-loaded active backend serving `requested_model`,
    /// enqueue `work` on its `QueueHandler`, and await the result.
    ///
    /// `work` receives the selected backend and the exact model name to
    /// substitute into the outbound body (spec §4.2 step 5: prefix-matched
    /// against the backend's own inventory when the client omitted a
    /// version).
    pub async fn dispatch<F, Fut>(&self, requested_model: Option<&str>, work: F) -> Result<T>
    where
        F: FnOnce(Backend, Option<String>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let active = self.registry.active().await?;
        let backend = select_least_loaded(&active, requested_model, |b| self.queue_for(&b.base_url).depth())?
            .clone();

        let resolved_model = requested_model.map(|m| {
            backend
                .resolve_exact_model(m)
                .map(str::to_string)
                .unwrap_or_else(|| m.to_string())
        });

        metrics::gauge!("ollamax_dispatcher_queue_depth", "backend" => backend.base_url.clone())
            .set(self.queue_for(&backend.base_url).depth() as f64);
        metrics::counter!("ollamax_dispatcher_routed_total", "backend" => backend.base_url.clone())
            .increment(1);

        let handler = self.queue_for(&backend.base_url);
        handler.enqueue(move || work(backend, resolved_model)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ollamax_core::OllamaModelInfo;
    use ollamax_store::{InMemoryRepository, Repository};

    async fn registry_with_backend(model: &str) -> Arc<BackendRegistry> {
        let backends = Arc::new(InMemoryRepository::<Backend>::new("backend"));
        let mut backend = Backend::new("b1", "http://b1:11434");
        backend.last_alive = Some(chrono::Utc::now());
        backend.models = vec![format!("{model}:latest")];
        backends.insert(backend).await.unwrap();

        Arc::new(BackendRegistry::new(
            backends,
            Arc::new(InMemoryRepository::<OllamaModelInfo>::new("model")),
            chrono::Duration::seconds(20),
        ))
    }

    #[tokio::test]
    async fn dispatch_resolves_backend_and_exact_model() {
        let registry = registry_with_backend("llama3").await;
        let dispatcher = Dispatcher::<String>::new(registry, 20);

        let result = dispatcher
            .dispatch(Some("llama3"), |backend, resolved_model| async move {
                Ok(format!("{}/{}", backend.name, resolved_model.unwrap()))
            })
            .await
            .unwrap();

        assert_eq!(result, "b1/llama3:latest");
    }

    #[tokio::test]
    async fn dispatch_fails_with_no_server_available() {
        let registry = registry_with_backend("llama3").await;
        let dispatcher = Dispatcher::<()>::new(registry, 20);

        let err = dispatcher
            .dispatch(Some("mistral"), |_, _| async { Ok(()) })
            .await
            .unwrap_err();
        assert!(matches!(err, ollamax_core::Error::NoServerAvailable));
    }
}
