//! The code-assistant project entity and its personalized config delivery
//! (spec §3, §4.3), grounded on
//! `examples/original_source/ollama_x/model/continue_dev.py` and
//! `examples/original_source/ollama_x/api/continue_dev.py`'s `prepare_project`.
//!
//! The original draft carries no `invite_id`; spec §3/§6 adds join-by-invite
//! (`GET /continue/join`), so `Project::new` mints one the way
//! `User::generate_key` mints API keys, just hex instead of the key alphabet.

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A member-scoped bundle of model and context-provider configuration
/// distributed to IDE plugins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub admin: String,
    pub name: String,
    pub users: Vec<String>,
    pub invite_id: String,
    pub config: ProjectConfig,
}

impl Project {
    pub fn new(admin: impl Into<String>, name: impl Into<String>, config: ProjectConfig) -> Self {
        let admin = admin.into();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            users: vec![admin.clone()],
            admin,
            name: name.into(),
            invite_id: Self::generate_invite_id(),
            config,
        }
    }

    /// 24 random bytes, hex-encoded (spec §3: "random 24-byte hex").
    pub fn generate_invite_id() -> String {
        let mut bytes = [0u8; 24];
        rand::thread_rng().fill_bytes(&mut bytes);
        hex_encode(&bytes)
    }

    pub fn regenerate_invite_id(&mut self) {
        self.invite_id = Self::generate_invite_id();
    }

    pub fn is_member(&self, user_id: &str) -> bool {
        self.users.iter().any(|u| u == user_id) || self.admin == user_id
    }

    /// Add `user_id` as a member, rejecting a repeat join (spec §8 scenario e).
    pub fn join(&mut self, user_id: &str) -> Result<()> {
        if self.is_member(user_id) {
            return Err(Error::UserAlreadyInProject);
        }
        self.users.push(user_id.to_string());
        Ok(())
    }

    /// Produce a per-caller copy of `config` with the gateway's own base URL
    /// and the caller's bearer injected into every model's request headers,
    /// mirroring `prepare_project`'s mutation of `model.api_base` and
    /// `model.request_options.headers`.
    pub fn personalize(&self, gateway_base_url: &str, user_key: &str) -> ProjectConfig {
        let mut config = self.config.clone();
        for model in &mut config.models {
            model.api_base = gateway_base_url.to_string();
            model
                .request_options
                .headers
                .insert("Authorization".to_string(), format!("Bearer {user_key}"));
            model
                .request_options
                .headers
                .insert("ContinueDevProject".to_string(), self.id.clone());
        }
        if let Some(embeddings) = &mut config.embeddings_provider {
            embeddings.api_base = Some(format!(
                "{gateway_base_url}/continue/{}/embeddings",
                self.name
            ));
            embeddings
                .request_options
                .headers
                .insert("Authorization".to_string(), format!("Bearer {user_key}"));
            embeddings
                .request_options
                .headers
                .insert("ContinueDevProject".to_string(), self.id.clone());
        }
        config
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestOptions {
    #[serde(default = "default_timeout")]
    pub timeout: u32,
    #[serde(default = "default_true", rename = "verifySSL")]
    pub verify_ssl: bool,
    #[serde(default)]
    pub headers: std::collections::BTreeMap<String, String>,
}

fn default_timeout() -> u32 {
    10
}

fn default_true() -> bool {
    true
}

/// A single model entry advertised to IDE plugins. `provider` is always
/// `"ollama"` in this gateway (spec §3: the only `AllModels` variant carried
/// over from the original's `OllamaModel = Model[Literal["ollama"]]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    #[serde(default = "default_model_title")]
    pub title: String,
    pub model: String,
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(rename = "apiKey", skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(rename = "apiBase")]
    pub api_base: String,
    #[serde(rename = "requestOptions", default)]
    pub request_options: RequestOptions,
}

fn default_model_title() -> String {
    "Model".to_string()
}

fn default_provider() -> String {
    "ollama".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TabAutocompleteModel {
    pub title: String,
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model: String,
    #[serde(rename = "apiKey", skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(rename = "apiBase", skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    #[serde(rename = "contextLength", skip_serializing_if = "Option::is_none")]
    pub context_length: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsProvider {
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(rename = "apiBase", skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    #[serde(rename = "apiKey", skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(rename = "requestOptions", default)]
    pub request_options: RequestOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomCommand {
    pub name: String,
    pub description: String,
    pub prompt: String,
}

/// Tagged union over the `name` discriminant, same shape as the original's
/// `ContextProvider[C, X]` family (`open|docs|code|codebase|diff|search|url`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "lowercase")]
pub enum ContextProvider {
    Open {
        #[serde(rename = "onlyPinned", default = "default_true")]
        only_pinned: bool,
    },
    Docs {
        sites: Vec<DocsSite>,
    },
    Code,
    Codebase,
    Diff,
    Search,
    Url,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocsSite {
    pub title: String,
    #[serde(rename = "startUrl")]
    pub start_url: String,
    #[serde(rename = "rootUrl")]
    pub root_url: String,
}

/// Full config distributed to IDE plugins (spec §3). Personalized per
/// requesting user by [`Project::personalize`] before being returned.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub models: Vec<Model>,
    #[serde(rename = "customCommands", default)]
    pub custom_commands: Vec<CustomCommand>,
    #[serde(rename = "tabAutocompleteModel", skip_serializing_if = "Option::is_none")]
    pub tab_autocomplete_model: Option<TabAutocompleteModel>,
    #[serde(rename = "tabAutocompleteOptions", skip_serializing_if = "Option::is_none")]
    pub tab_autocomplete_options: Option<serde_json::Value>,
    #[serde(rename = "contextProviders", default)]
    pub context_providers: Vec<ContextProvider>,
    #[serde(rename = "embeddingsProvider", skip_serializing_if = "Option::is_none")]
    pub embeddings_provider: Option<EmbeddingsProvider>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_is_implicitly_a_member() {
        let project = Project::new("alice", "demo", ProjectConfig::default());
        assert!(project.is_member("alice"));
        assert!(!project.is_member("bob"));
    }

    #[test]
    fn join_is_idempotent_and_rejects_repeats() {
        let mut project = Project::new("alice", "demo", ProjectConfig::default());
        project.join("bob").unwrap();
        assert!(project.is_member("bob"));
        assert!(matches!(project.join("bob"), Err(Error::UserAlreadyInProject)));
    }

    #[test]
    fn personalize_injects_gateway_auth_into_every_model() {
        let mut config = ProjectConfig::default();
        config.models.push(Model {
            title: "m".into(),
            model: "llama3".into(),
            provider: "ollama".into(),
            api_key: None,
            api_base: "http://stale".into(),
            request_options: RequestOptions::default(),
        });
        let project = Project::new("alice", "demo", config);

        let personalized = project.personalize("https://gw.example", "secret-key");
        let model = &personalized.models[0];
        assert_eq!(model.api_base, "https://gw.example");
        assert_eq!(
            model.request_options.headers.get("Authorization").unwrap(),
            "Bearer secret-key"
        );
        assert_eq!(
            model.request_options.headers.get("ContinueDevProject").unwrap(),
            &project.id
        );
    }

    #[test]
    fn invite_ids_are_24_bytes_of_hex() {
        let id = Project::generate_invite_id();
        assert_eq!(id.len(), 48);
        assert!(id.bytes().all(|b| b.is_ascii_hexdigit()));
    }
}
