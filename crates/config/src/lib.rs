//! Settings for the ollama-x gateway.
//!
//! Layers `config/default.toml` -> `config/<env>.toml` -> process
//! environment, the way `voice_agent_config::load_settings` layers its
//! sources -- except the environment source here is left *unprefixed* so the
//! flat variable names of spec §7 (`MONGO_URI`, `ENFORCE_MODEL`, ...) are
//! read literally instead of nested under a `VOICE_AGENT__` double
//! underscore convention.

mod settings;

pub use settings::{ServerSettings, Settings};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

/// Load settings from `config/default.{toml,yaml}`, an optional
/// `config/{env}.{toml,yaml}` overlay, then the process environment.
/// `env` is read from `OLLAMAX_ENV` by the caller when not supplied.
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = config::Config::builder()
        .add_source(config::File::with_name("config/default").required(false));

    if let Some(env) = env {
        builder = builder
            .add_source(config::File::with_name(&format!("config/{env}")).required(false));
    }

    let builder = builder.add_source(
        config::Environment::default()
            .try_parsing(true)
            .list_separator(","),
    );

    let settings: Settings = builder.build()?.try_deserialize()?;
    Ok(settings)
}
