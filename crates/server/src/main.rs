//! Gateway process entry point: load configuration, wire repositories
//! (in-memory or MongoDB depending on `MONGO_URI`), start the backend health
//! scheduler, and serve the router -- grounded on the teacher's bootstrap
//! sequence (config load -> tracing init -> metrics init -> state
//! construction -> router -> graceful-shutdown serve loop), with the
//! voice-pipeline-specific steps (domain config, ScyllaDB persistence,
//! OpenTelemetry) dropped since this gateway has none of them.

use std::net::SocketAddr;
use std::sync::Arc;

use ollamax_config::{load_settings, Settings};
use ollamax_core::{Backend, OllamaModelInfo, Project, Session, User};
use ollamax_server::{create_router, init_metrics, AppState};
use ollamax_store::entities::{
    backend_indexes, ollama_model_indexes, project_indexes, session_indexes, user_indexes,
};
use ollamax_store::{MongoRepository, Repository};

const MONGO_DATABASE: &str = "ollamax";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env = std::env::var("OLLAMAX_ENV").ok();
    let settings = match load_settings(env.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("failed to load configuration ({e}), falling back to defaults");
            Settings::default()
        }
    };

    init_tracing(&settings.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting ollamax gateway");

    let metrics_handle = init_metrics();

    let state = if let Some(uri) = settings.mongo_uri.clone() {
        tracing::info!("connecting to document store");
        build_mongo_state(settings, &uri, metrics_handle).await?
    } else {
        tracing::info!("no MONGO_URI set, using in-memory repositories");
        AppState::in_memory(settings, metrics_handle)
    };

    for (name, result) in [
        ("user", state.users.create_indexes().await),
        ("backend", state.backends.create_indexes().await),
        ("model", state.models.create_indexes().await),
        ("session", state.sessions.create_indexes().await),
        ("project", state.projects.create_indexes().await),
    ] {
        result.map_err(|e| format!("failed to create {name} indexes: {e}"))?;
    }

    state
        .scheduler
        .start_all()
        .await
        .map_err(|e| format!("failed to start backend health jobs: {e}"))?;

    let (host, port) = {
        let settings = state.settings.read();
        (settings.server.host.clone(), settings.server.port)
    };
    let addr: SocketAddr = format!("{host}:{port}").parse()?;

    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("server shutdown complete");
    Ok(())
}

/// Builds every `MongoRepository` from a single client connection (spec §4.7,
/// §6 "document store"), mirroring the database name the original process
/// used (`ollama_x`'s Motor models all declared `__database__ = "ollama_x"`).
async fn build_mongo_state(
    settings: Settings,
    uri: &str,
    metrics_handle: metrics_exporter_prometheus::PrometheusHandle,
) -> Result<AppState, Box<dyn std::error::Error>> {
    let client = mongodb::Client::with_uri_str(uri).await?;
    let db = client.database(MONGO_DATABASE);

    let users: Arc<dyn Repository<User>> = Arc::new(MongoRepository::new(
        db.collection("users"),
        "user",
        user_indexes(),
    ));
    let backends: Arc<dyn Repository<Backend>> = Arc::new(MongoRepository::new(
        db.collection("backends"),
        "backend",
        backend_indexes(),
    ));
    let models: Arc<dyn Repository<OllamaModelInfo>> = Arc::new(MongoRepository::new(
        db.collection("models"),
        "model",
        ollama_model_indexes(),
    ));
    let sessions: Arc<dyn Repository<Session>> = Arc::new(MongoRepository::new(
        db.collection("sessions"),
        "session",
        session_indexes(),
    ));
    let projects: Arc<dyn Repository<Project>> = Arc::new(MongoRepository::new(
        db.collection("projects"),
        "project",
        project_indexes(),
    ));

    Ok(AppState::with_repositories(
        settings,
        users,
        backends,
        models,
        sessions,
        projects,
        metrics_handle,
    ))
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("ollamax={log_level},tower_http=info")));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
