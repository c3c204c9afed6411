//! Job orchestration for spec §4.1: one recurring `check_api` job per
//! backend plus the global `check_running_models` job.
//!
//! Grounded on `examples/original_source/ollama_x/scheduler.py`'s
//! `generate_job_id`/`add_server_job`/`delete_server_job` shape (one job
//! keyed `check_api_<id>` per backend), backed here by a plain
//! `tokio::time::interval` per backend rather than a Mongo-backed job store
//! -- spec §4.1 explicitly allows "a simpler in-memory scheduler" as long as
//! the *set* of jobs is derivable from the backend set at boot, which
//! `start_all` does every time the process starts.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use dashmap::DashMap;
use ollamax_core::Result;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::health;
use crate::registry::BackendRegistry;

/// `max_instances = 3` (spec §4.1): a slow backend can have at most three
/// overlapping `check_api` probes in flight; further ticks are dropped, not
/// queued, so they never pile up.
const MAX_INSTANCES: usize = 3;

pub struct HealthScheduler {
    registry: Arc<BackendRegistry>,
    interval: StdDuration,
    jobs: DashMap<String, JoinHandle<()>>,
    global_job: Mutex<Option<JoinHandle<()>>>,
}

impl HealthScheduler {
    pub fn new(registry: Arc<BackendRegistry>, interval: StdDuration) -> Self {
        Self {
            registry,
            interval,
            jobs: DashMap::new(),
            global_job: Mutex::new(None),
        }
    }

    pub fn job_id(backend_id: &str) -> String {
        format!("check_api_{backend_id}")
    }

    /// Start the recurring `check_api` job for one backend. Idempotent:
    /// calling it twice for the same backend is a no-op the second time
    /// (registration is create-once, the way the teacher's per-URL
    /// `QueueHandler.QUEUES` registry is idempotent on first use).
    pub fn start_backend_job(&self, backend_id: String) {
        let job_id = Self::job_id(&backend_id);
        if self.jobs.contains_key(&job_id) {
            return;
        }

        let registry = self.registry.clone();
        let interval_duration = self.interval;
        let handle = tokio::spawn(async move {
            let semaphore = Arc::new(Semaphore::new(MAX_INSTANCES));
            let mut ticker = tokio::time::interval(interval_duration);
            // coalesce = false (spec §4.1): missed fires run individually
            // rather than collapsing into one, hence `Burst` not `Delay`.
            ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);

            loop {
                ticker.tick().await;
                let Ok(permit) = semaphore.clone().try_acquire_owned() else {
                    tracing::debug!(backend_id, "check_api: 3 probes already in flight, skipping tick");
                    continue;
                };
                let registry = registry.clone();
                let backend_id = backend_id.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    health::check_api(registry, &backend_id).await;
                });
            }
        });

        self.jobs.insert(job_id, handle);
    }

    /// Cancel a backend's health job. Does not cancel in-flight inference
    /// requests dispatched to it (spec §5): those are owned by the
    /// dispatcher, not the scheduler.
    pub fn stop_backend_job(&self, backend_id: &str) {
        if let Some((_, handle)) = self.jobs.remove(&Self::job_id(backend_id)) {
            handle.abort();
        }
    }

    fn start_global_job(&self) {
        let registry = self.registry.clone();
        let interval_duration = self.interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval_duration);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);
            loop {
                ticker.tick().await;
                health::check_running_models(&registry).await;
            }
        });
        *self.global_job.lock() = Some(handle);
    }

    /// Re-derive the job set from the backend set at boot (spec §4.1: "the
    /// persistence requirement is that the set of active recurring jobs be
    /// derivable from the backend set at boot").
    pub async fn start_all(&self) -> Result<()> {
        for backend in self.registry.all().await? {
            self.start_backend_job(backend.id);
        }
        self.start_global_job();
        Ok(())
    }

    pub fn shutdown(&self) {
        for entry in self.jobs.iter() {
            entry.value().abort();
        }
        self.jobs.clear();
        if let Some(handle) = self.global_job.lock().take() {
            handle.abort();
        }
    }
}

impl Drop for HealthScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ollamax_core::{Backend, OllamaModelInfo};
    use ollamax_store::InMemoryRepository;

    fn test_registry() -> Arc<BackendRegistry> {
        Arc::new(BackendRegistry::new(
            Arc::new(InMemoryRepository::<Backend>::new("backend")),
            Arc::new(InMemoryRepository::<OllamaModelInfo>::new("model")),
            chrono::Duration::seconds(20),
        ))
    }

    #[tokio::test]
    async fn starting_a_job_twice_is_idempotent() {
        let scheduler = HealthScheduler::new(test_registry(), StdDuration::from_secs(10));
        scheduler.start_backend_job("b1".to_string());
        let first_count = scheduler.jobs.len();
        scheduler.start_backend_job("b1".to_string());
        assert_eq!(scheduler.jobs.len(), first_count);
        scheduler.shutdown();
    }

    #[tokio::test]
    async fn stopping_an_unknown_job_is_a_no_op() {
        let scheduler = HealthScheduler::new(test_registry(), StdDuration::from_secs(10));
        scheduler.stop_backend_job("missing");
    }
}
