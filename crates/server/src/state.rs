//! Shared application state, grounded on the teacher's `AppState`
//! (`crates/server/src/state.rs`): one `Arc`-wrapped struct threaded through
//! every handler via axum's `State` extractor, constructed once in
//! `main.rs` and cloned cheaply per request.

use std::sync::Arc;

use ollamax_core::{Backend, OllamaModelInfo, Project, Session, User};
use ollamax_dispatcher::Dispatcher;
use ollamax_identity::{BearerAuth, JwtIssuer, ProjectAuth};
use ollamax_proxy::{LoggingSink, ObservationSink, StreamingProxy};
use ollamax_registry::{BackendRegistry, HealthScheduler};
use ollamax_store::{InMemoryRepository, Repository};
use metrics_exporter_prometheus::PrometheusHandle;
use parking_lot::RwLock;

/// Everything a request handler needs, grounded on the teacher's
/// `AppState` shape but scoped to the gateway's own domain (repositories,
/// registry, dispatcher, proxy, auth schemes) instead of the voice
/// pipeline's session manager / tool registry / translators.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<RwLock<ollamax_config::Settings>>,
    pub users: Arc<dyn Repository<User>>,
    pub backends: Arc<dyn Repository<Backend>>,
    pub models: Arc<dyn Repository<OllamaModelInfo>>,
    pub sessions: Arc<dyn Repository<Session>>,
    pub projects: Arc<dyn Repository<Project>>,
    pub registry: Arc<BackendRegistry>,
    pub dispatcher: Arc<Dispatcher<()>>,
    pub scheduler: Arc<HealthScheduler>,
    pub bearer_auth: Arc<BearerAuth>,
    pub jwt: Arc<JwtIssuer>,
    pub project_auth: Arc<ProjectAuth>,
    pub streaming_proxy: Arc<StreamingProxy>,
    pub observation_sink: Arc<dyn ObservationSink>,
    pub metrics_handle: PrometheusHandle,
}

impl AppState {
    /// Wire up every repository, the registry, dispatcher, and auth schemes
    /// from `settings`, backed entirely by in-memory repositories -- used
    /// directly by tests and by development deployments that never set
    /// `MONGO_URI`. A Mongo-backed deployment builds its repositories
    /// separately and calls [`AppState::with_repositories`] instead.
    pub fn in_memory(settings: ollamax_config::Settings, metrics_handle: PrometheusHandle) -> Self {
        let users: Arc<dyn Repository<User>> = Arc::new(InMemoryRepository::new("user"));
        let backends: Arc<dyn Repository<Backend>> = Arc::new(InMemoryRepository::new("backend"));
        let models: Arc<dyn Repository<OllamaModelInfo>> = Arc::new(InMemoryRepository::new("model"));
        let sessions: Arc<dyn Repository<Session>> = Arc::new(InMemoryRepository::new("session"));
        let projects: Arc<dyn Repository<Project>> = Arc::new(InMemoryRepository::new("project"));

        Self::with_repositories(settings, users, backends, models, sessions, projects, metrics_handle)
    }

    /// Construct state from already-built repositories, so `main.rs` can
    /// pass either the in-memory set or a Mongo-backed set without this
    /// constructor needing to know which. `metrics_handle` is threaded in
    /// rather than created here, since [`crate::metrics::init_metrics`]
    /// installs the global recorder exactly once per process.
    pub fn with_repositories(
        settings: ollamax_config::Settings,
        users: Arc<dyn Repository<User>>,
        backends: Arc<dyn Repository<Backend>>,
        models: Arc<dyn Repository<OllamaModelInfo>>,
        sessions: Arc<dyn Repository<Session>>,
        projects: Arc<dyn Repository<Project>>,
        metrics_handle: PrometheusHandle,
    ) -> Self {
        let registry = Arc::new(BackendRegistry::new(
            backends.clone(),
            models.clone(),
            chrono::Duration::seconds(settings.backend_staleness_seconds),
        ));
        let dispatcher = Arc::new(Dispatcher::new(registry.clone(), settings.dispatcher_limit));
        let scheduler = Arc::new(HealthScheduler::new(
            registry.clone(),
            std::time::Duration::from_secs(settings.server_check_interval),
        ));
        let bearer_auth = Arc::new(BearerAuth::new(users.clone(), settings.anonymous_allowed));
        let jwt = Arc::new(JwtIssuer::new(settings.jwt_secret_key.clone(), settings.jwt_token_expire_minutes));
        let project_auth = Arc::new(ProjectAuth::new(users.clone(), projects.clone()));
        let streaming_proxy = Arc::new(StreamingProxy::new(
            reqwest::Client::builder()
                .build()
                .expect("reqwest client builds with static config"),
        ));

        Self {
            settings: Arc::new(RwLock::new(settings)),
            users,
            backends,
            models,
            sessions,
            projects,
            registry,
            dispatcher,
            scheduler,
            bearer_auth,
            jwt,
            project_auth,
            streaming_proxy,
            observation_sink: Arc::new(LoggingSink),
            metrics_handle,
        }
    }

    /// `true` if the inbound peer address is local (spec §4.6 item 3's
    /// local-admin bootstrap precondition).
    pub fn is_local_peer(addr: std::net::SocketAddr) -> bool {
        addr.ip().is_loopback()
    }
}
