//! Refact code-assistant capability discovery (spec §6), grounded on
//! `examples/original_source/ollama_x/api/refact.py`'s `refact_caps`/
//! `get_caps`/`get_models_info` and
//! `examples/original_source/ollama_x/model/refact.py`'s `ModelRecord`/
//! `RefactCodeAssistantCaps`. `/refact/coding_assistant/caps.json` and
//! `/refact/caps` return the same payload; the telemetry endpoints of the
//! original (`telemetry_basic`, `telemetry_corrected_snippets`) are
//! unimplemented there too (`NotImplementedError`) and are out of scope here.

use std::collections::BTreeMap;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::auth::CurrentUser;
use crate::error::ApiResult;
use crate::state::AppState;

const OPENAI_CHAT_COMPLETIONS: &str = "/v1/chat/completions";
const OPENAI_CHAT: &str = "/api/chat";
const OPENAI_EMBEDDINGS: &str = "/v1/embeddings";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/refact/caps", get(refact_caps))
        .route("/refact/coding_assistant/caps.json", post(refact_coding_assistant_caps))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ModelRecord {
    n_ctx: u32,
    supports_scratchpads: serde_json::Value,
    default_scratchpad: Option<String>,
    #[serde(default)]
    similar_models: Vec<String>,
    supports_tools: bool,
}

impl ModelRecord {
    fn passthrough(n_ctx: u32) -> Self {
        Self {
            n_ctx,
            supports_scratchpads: serde_json::json!({
                "PASSTHROUGH": {
                    "default_system_message": "You are a coding assistant that outputs short answers, gives links to documentation.",
                }
            }),
            default_scratchpad: Some("PASSTHROUGH".to_string()),
            similar_models: Vec::new(),
            supports_tools: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RefactCodeAssistantCaps {
    cloud_name: String,
    endpoint_template: String,
    endpoint_style: String,
    tokenizer_path_template: Option<String>,
    #[serde(default)]
    tokenizer_rewrite_path: BTreeMap<String, String>,
    code_completion_default_model: String,
    code_completion_n_ctx: u32,
    code_chat_default_model: String,
    telemetry_basic_dest: String,
    telemetry_corrected_snippets_dest: Option<String>,
    #[serde(default)]
    running_models: Vec<String>,
    endpoint_chat_passthrough: Option<String>,
    telemetry_basic_retrieve_my_own: Option<String>,
    code_completion_models: Option<BTreeMap<String, ModelRecord>>,
    code_chat_models: Option<BTreeMap<String, ModelRecord>>,
    models_dict_patch: Option<BTreeMap<String, ModelRecord>>,
    default_embeddings_model: Option<String>,
    endpoint_embeddings_template: Option<String>,
    endpoint_embeddings_style: Option<String>,
    size_embeddings: Option<u32>,
    embedding_n_ctx: Option<u32>,
    caps_version: Option<u32>,
    code_chat_default_system_prompt: Option<String>,
    customization: Option<String>,
}

async fn build_caps(state: &AppState) -> ApiResult<RefactCodeAssistantCaps> {
    let settings = state.settings.read().clone();
    let model_names = state.registry.union_tags().await?;
    let running = state.registry.union_running_models().await?;

    let models: BTreeMap<String, ModelRecord> = model_names
        .iter()
        .map(|name| (name.clone(), ModelRecord::passthrough(2048)))
        .collect();

    Ok(RefactCodeAssistantCaps {
        cloud_name: "OllamaX".to_string(),
        endpoint_template: OPENAI_CHAT_COMPLETIONS.to_string(),
        endpoint_style: "openai".to_string(),
        tokenizer_path_template: Some("/openai/v1/model/$MODEL/tokenizer.json".to_string()),
        tokenizer_rewrite_path: BTreeMap::new(),
        code_completion_default_model: settings.default_completions_model.unwrap_or_default(),
        code_completion_n_ctx: 2048,
        code_chat_default_model: settings.default_chat_model.unwrap_or_default(),
        telemetry_basic_dest: "/refact/telemetry-basic".to_string(),
        telemetry_corrected_snippets_dest: Some("/refact/telemetry-feedback".to_string()),
        running_models: running.into_iter().map(|m| m.model).collect(),
        endpoint_chat_passthrough: Some(OPENAI_CHAT.to_string()),
        telemetry_basic_retrieve_my_own: None,
        code_completion_models: Some(models.clone()),
        code_chat_models: Some(models),
        models_dict_patch: None,
        default_embeddings_model: settings.default_embeddings_model,
        endpoint_embeddings_template: Some(OPENAI_EMBEDDINGS.to_string()),
        endpoint_embeddings_style: Some("openai".to_string()),
        size_embeddings: Some(768),
        embedding_n_ctx: None,
        caps_version: Some(1),
        code_chat_default_system_prompt: None,
        customization: Some(String::new()),
    })
}

async fn refact_caps(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
) -> ApiResult<Json<RefactCodeAssistantCaps>> {
    Ok(Json(build_caps(&state).await?))
}

async fn refact_coding_assistant_caps(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
) -> ApiResult<Json<RefactCodeAssistantCaps>> {
    Ok(Json(build_caps(&state).await?))
}
