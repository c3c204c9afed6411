//! The three scheduled jobs of spec §4.1: `check_api`, `check_running_models`,
//! `save_models_info`. Each takes a shared, `Arc`-owned
//! [`BackendRegistry`] so [`crate::scheduler::HealthScheduler`] can fire them
//! on independent timers, and `check_api` can hand `save_models_info` off to
//! its own detached task without borrowing anything tick-scoped.

use std::sync::Arc;

use ollamax_core::{Error, OllamaModelInfo};
use ollamax_store::{Entity, Repository};

use crate::client::TagEntry;
use crate::registry::BackendRegistry;

/// `GET {base}/api/tags` every `server_check_interval` seconds. On success,
/// replaces `models` and bumps `last_alive`/`last_update`; on any other
/// outcome, leaves them untouched so the 20s staleness rule demotes the
/// backend automatically (spec §4.1).
pub async fn check_api(registry: Arc<BackendRegistry>, backend_id: &str) {
    let backend = match registry.get(backend_id).await {
        Ok(backend) => backend,
        Err(_) => {
            tracing::warn!(backend_id, "check_api: backend vanished before probe");
            return;
        }
    };

    let client = registry.client_for(&backend);
    match client.tags().await {
        Ok(tags) => {
            let now = chrono::Utc::now();
            let model_names: Vec<String> = tags.models.iter().map(|m| m.model.clone()).collect();
            let backend_id = backend_id.to_string();
            let update = registry
                .backends
                .update(
                    &backend_id,
                    Box::new(move |b| {
                        b.models = model_names;
                        b.last_alive = Some(now);
                        b.last_update = Some(now);
                    }),
                )
                .await;
            if let Err(err) = update {
                tracing::warn!(backend_id = %backend.id, error = %err, "check_api: failed to persist probe result");
                return;
            }

            // save_models_info is opportunistic and runs on its own task so
            // a slow /api/show call never delays the next check_api tick.
            let registry = registry.clone();
            let backend_id = backend.id.clone();
            tokio::spawn(async move {
                save_models_info(&registry, &backend_id, &tags.models).await;
            });
        }
        Err(err) => {
            tracing::warn!(backend_id = %backend.id, error = %err, "check_api probe failed");
        }
    }
}

/// For each `(name, digest)` pair not already cached, fetch `/api/show` and
/// upsert. If a cached row exists under the same name with a different
/// digest, it is deleted before the new one is inserted (spec §4.1).
pub async fn save_models_info(registry: &BackendRegistry, backend_id: &str, discovered: &[TagEntry]) {
    let backend = match registry.get(backend_id).await {
        Ok(backend) => backend,
        Err(_) => return,
    };
    let client = registry.client_for(&backend);

    for tag in discovered {
        let already_cached = registry
            .models
            .iterate(ollamax_store::filter({
                let name = tag.name.clone();
                let digest = tag.digest.clone();
                move |m: &OllamaModelInfo| m.name == name && m.digest == digest
            }))
            .await
            .map(|matches| !matches.is_empty())
            .unwrap_or(false);

        if already_cached {
            continue;
        }

        let stale = registry
            .models
            .iterate(ollamax_store::filter({
                let name = tag.name.clone();
                move |m: &OllamaModelInfo| m.name == name
            }))
            .await
            .unwrap_or_default();
        for row in stale {
            let _ = registry.models.delete(&row.id()).await;
        }

        match client.show(&tag.name).await {
            Ok(show) => {
                let mut info = OllamaModelInfo::new(backend.id.clone(), tag.name.clone());
                info.digest = tag.digest.clone();
                info.size = tag.size;
                info.modelfile = show.modelfile;
                info.parameters = show.parameters;
                info.template = show.template;
                info.details = show.info;
                let _ = registry.models.insert(info).await;
            }
            Err(err) => {
                tracing::warn!(model = %tag.name, error = %err, "save_models_info: /api/show failed");
            }
        }
    }
}

/// `GET {base}/api/ps` on every active backend, replacing `running_models`.
/// On error, fails closed: `running_models := []`, never tearing down the
/// backend itself (spec §4.1).
pub async fn check_running_models(registry: &BackendRegistry) {
    let active = match registry.active().await {
        Ok(backends) => backends,
        Err(err) => {
            tracing::warn!(error = %err, "check_running_models: could not list active backends");
            return;
        }
    };

    for backend in active {
        let client = registry.client_for(&backend);
        let running_models = match client.ps().await {
            Ok(ps) => ps
                .models
                .into_iter()
                .map(|m| ollamax_core::RunningModel {
                    model: m.model,
                    expires_at: m.expires_at,
                    size_vram: m.size_vram,
                    details: m.details,
                })
                .collect(),
            Err(err) => {
                tracing::warn!(backend_id = %backend.id, error = %err, "check_running_models probe failed, failing closed");
                Vec::new()
            }
        };

        let backend_id = backend.id.clone();
        let result = registry
            .backends
            .update(
                &backend_id,
                Box::new(move |b| b.running_models = running_models),
            )
            .await;
        if let Err(Error::NotFound(_)) = result {
            // Backend was deleted mid-tick; nothing to update.
        }
    }
}
