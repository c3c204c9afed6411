//! Prometheus metrics exposition. No repo in the retrieval pack wires
//! `metrics-exporter-prometheus` directly, so this module is standard
//! crate-idiomatic boilerplate rather than something adapted from a
//! specific teacher file (see DESIGN.md). It still follows the teacher's
//! habit of exposing an `init_*` function from `main.rs` and a thin
//! handler that just renders the exporter's snapshot.

use axum::http::StatusCode;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Installs the global recorder and returns the handle `main.rs` stores in
/// [`crate::state::AppState`] (indirectly, via the router's closure state)
/// for the `/metrics` handler to render from.
pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("prometheus recorder installs exactly once per process")
}

/// `GET /metrics` -- Prometheus text exposition format.
pub async fn metrics_handler(axum::extract::State(state): axum::extract::State<crate::state::AppState>) -> (StatusCode, String) {
    (StatusCode::OK, state.metrics_handle.render())
}
