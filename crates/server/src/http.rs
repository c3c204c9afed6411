//! Router assembly: merges every route module's absolute-path `Router` into
//! one, then layers tracing and the metrics/error-mapping concerns, grounded
//! on the teacher's `create_router` (`crates/server/src/http.rs`) -- the
//! middleware stack is trimmed to what this gateway actually uses (no CORS,
//! no compression, no websocket upgrade), since spec §6's surface is a
//! server-to-server API, not a browser client.

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::account;
use crate::admin;
use crate::continue_dev;
use crate::inference;
use crate::metrics::metrics_handler;
use crate::refact;
use crate::state::AppState;

/// Assemble the full gateway router (spec §6's HTTP surface) and bind it to
/// `state`.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(account::router())
        .merge(admin::router())
        .merge(inference::router())
        .merge(continue_dev::router())
        .merge(refact::router())
        .route("/metrics", axum::routing::get(metrics_handler))
        .route("/healthz", axum::routing::get(healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;
    use ollamax_config::Settings;

    #[test]
    fn router_builds_without_panicking() {
        let state = AppState::in_memory(
            Settings::default(),
            metrics_exporter_prometheus::PrometheusBuilder::new()
                .build()
                .expect("prometheus builder builds without a global install")
                .1,
        );
        let _ = create_router(state);
    }
}
