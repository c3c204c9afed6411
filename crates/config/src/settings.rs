//! The settings struct itself, grounded on
//! `examples/original_source/ollama_x/config.py`'s `OllamaXConfig` -- every
//! field there keeps its exact environment variable name (spec §7), with
//! snake_case Rust field names `Environment`'s `try_parsing` maps onto them.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,

    /// Document-store DSN (spec §7 `MONGO_URI`). An in-memory store is used
    /// when unset, so development and tests never require a live Mongo.
    pub mongo_uri: Option<String>,

    pub log_level: String,

    /// Health probe interval in seconds (spec §4.1, default 10).
    pub server_check_interval: u64,

    /// Backend staleness window in seconds (spec §3: active iff
    /// `last_alive >= now - 20s`). Not itself an env var in spec §7, but
    /// broken out here instead of hardcoded so tests can shrink it.
    pub backend_staleness_seconds: i64,

    /// Per-backend in-flight concurrency cap (spec §4.2 `LIMIT = 20`).
    pub dispatcher_limit: usize,

    /// Session dedup TTL in seconds (spec §3, default 1 hour).
    pub session_ttl_seconds: i64,

    pub enforce_model: Option<String>,
    pub anonymous_allowed: bool,
    pub anonymous_model: Option<String>,

    pub default_embeddings_model: Option<String>,
    pub default_completions_model: Option<String>,
    pub default_chat_model: Option<String>,

    pub user_registration_enabled: bool,
    pub jwt_secret_key: String,
    pub jwt_token_expire_minutes: i64,

    pub sentry_dsn: Option<String>,
    pub langfuse_secret_key: Option<String>,
    pub langfuse_public_key: Option<String>,
    pub langfuse_host: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            mongo_uri: None,
            log_level: "info".to_string(),
            server_check_interval: 10,
            backend_staleness_seconds: 20,
            dispatcher_limit: 20,
            session_ttl_seconds: 3600,
            enforce_model: None,
            anonymous_allowed: false,
            anonymous_model: None,
            default_embeddings_model: Some("nomic-embed-text:latest".to_string()),
            default_completions_model: Some("deepseek-coder-v2:latest".to_string()),
            default_chat_model: Some("deepseek-coder-v2:latest".to_string()),
            user_registration_enabled: false,
            jwt_secret_key: "jwt-token-please-redefine".to_string(),
            jwt_token_expire_minutes: 30,
            sentry_dsn: None,
            langfuse_secret_key: None,
            langfuse_public_key: None,
            langfuse_host: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_original_config_py() {
        let settings = Settings::default();
        assert_eq!(settings.server_check_interval, 10);
        assert_eq!(settings.jwt_token_expire_minutes, 30);
        assert!(!settings.anonymous_allowed);
        assert!(!settings.user_registration_enabled);
    }
}
