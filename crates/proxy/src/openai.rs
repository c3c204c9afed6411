//! OpenAI Chat Completions <-> Ollama chat protocol translation (spec
//! §4.4), grounded on
//! `examples/original_source/ollama_x/model/openai.py`'s
//! `OpenAICompletionMessage.from_ollama_message` and
//! `examples/original_source/ollama_x/api/openai.py`'s `openai_chat`/
//! `stream_chucks`.

use chrono::{DateTime, Utc};
use ollamax_core::{Error, ModelName, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Inbound `POST /v1/chat/completions` body.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub tools: Option<Value>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: Option<String>,
}

impl OpenAiChatRequest {
    /// Translate to the Ollama-flavor chat body the backend expects (spec
    /// §4.4 "Request translation"): `model` is converted to Ollama flavor,
    /// `max_tokens` becomes `options.num_predict`.
    pub fn to_ollama_body(&self) -> Result<Value> {
        let model = ModelName::openai_to_ollama(&self.model)?;
        Ok(serde_json::json!({
            "model": model,
            "messages": self.messages,
            "stream": self.stream,
            "tools": self.tools,
            "options": { "num_predict": self.max_tokens },
        }))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageObject {
    #[serde(rename = "chat.completion")]
    Completion,
    #[serde(rename = "chat.completion.chunk")]
    CompletionChunk,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChoiceMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Choice {
    pub index: u32,
    pub finish_reason: Option<String>,
    pub logprobs: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<ChoiceMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<ChoiceMessage>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Usage {
    pub completion_tokens: u64,
    pub prompt_tokens: u64,
    pub total_tokens: u64,
}

/// The OpenAI Chat Completion / Chat Completion Chunk shape returned to
/// clients (spec §4.4 "Response translation").
#[derive(Debug, Clone, Serialize)]
pub struct OpenAiCompletionMessage {
    pub id: String,
    pub system_fingerprint: String,
    pub created: i64,
    pub model: String,
    pub object: MessageObject,
    pub choices: Vec<Choice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl OpenAiCompletionMessage {
    /// Convert one Ollama NDJSON chunk (chat or generate, single-shot or
    /// streamed) into the matching OpenAI shape. `stream_id` is stable
    /// across all chunks of one response (spec §4.4: "All chunks of one
    /// response share the same `id`").
    pub fn from_ollama_chat_message(raw: &Value, is_chunk: bool, stream_id: &str) -> Result<Self> {
        let model_raw = raw
            .get("model")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Validation("ollama message missing model".to_string()))?;
        let model = ModelName::ollama_to_openai(model_raw)?;

        let created_at = raw
            .get("created_at")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        let message = raw.get("message").cloned().unwrap_or(Value::Null);
        let choice_message = ChoiceMessage {
            role: message.get("role").and_then(Value::as_str).map(str::to_string),
            content: message.get("content").and_then(Value::as_str).map(str::to_string),
        };

        let finish_reason = raw
            .get("done_reason")
            .and_then(Value::as_str)
            .map(str::to_string);

        let choice = Choice {
            index: 0,
            finish_reason,
            logprobs: None,
            message: (!is_chunk).then(|| choice_message.clone()),
            delta: is_chunk.then_some(choice_message),
        };

        let done = raw.get("done").and_then(Value::as_bool).unwrap_or(false);
        let usage = done.then(|| {
            let completion_tokens = raw.get("eval_count").and_then(Value::as_u64).unwrap_or(0);
            let prompt_tokens = raw.get("prompt_eval_count").and_then(Value::as_u64).unwrap_or(0);
            Usage {
                completion_tokens,
                prompt_tokens,
                total_tokens: completion_tokens + prompt_tokens,
            }
        });

        Ok(Self {
            id: stream_id.to_string(),
            system_fingerprint: "not_supported".to_string(),
            created: created_at.timestamp(),
            model,
            object: if is_chunk {
                MessageObject::CompletionChunk
            } else {
                MessageObject::Completion
            },
            choices: vec![choice],
            usage,
        })
    }

    pub fn new_stream_id() -> String {
        format!("chatcmpl-{}", uuid::Uuid::new_v4())
    }
}

/// A backend chunk carrying `{"error": ...}` is forwarded verbatim, not
/// wrapped (spec §4.4 "Error passthrough").
pub fn is_error_chunk(raw: &Value) -> bool {
    raw.get("error").is_some()
}

/// Inbound legacy `POST /v1/completions` body.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiCompletionRequest {
    pub model: String,
    pub prompt: String,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

impl OpenAiCompletionRequest {
    /// Translate to the Ollama-flavor `/api/generate` body the backend
    /// expects, the same shape as [`OpenAiChatRequest::to_ollama_body`] but
    /// for the single-prompt rather than message-list request shape.
    pub fn to_ollama_body(&self) -> Result<Value> {
        let model = ModelName::openai_to_ollama(&self.model)?;
        Ok(serde_json::json!({
            "model": model,
            "prompt": self.prompt,
            "stream": self.stream,
            "options": { "num_predict": self.max_tokens },
        }))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TextChoice {
    pub index: u32,
    pub text: String,
    pub finish_reason: Option<String>,
    pub logprobs: Option<Value>,
}

/// The OpenAI legacy Completion / Completion Chunk shape, translated from
/// one `/api/generate` NDJSON chunk (spec §4.4 extended to `/v1/completions`
/// the same way chat is extended to `/v1/chat/completions`).
#[derive(Debug, Clone, Serialize)]
pub struct OpenAiTextCompletion {
    pub id: String,
    pub created: i64,
    pub model: String,
    pub object: &'static str,
    pub choices: Vec<TextChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl OpenAiTextCompletion {
    pub fn from_ollama_generate_message(raw: &Value, is_chunk: bool, stream_id: &str) -> Result<Self> {
        let model_raw = raw
            .get("model")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Validation("ollama message missing model".to_string()))?;
        let model = ModelName::ollama_to_openai(model_raw)?;

        let created_at = raw
            .get("created_at")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        let text = raw.get("response").and_then(Value::as_str).unwrap_or("").to_string();
        let done = raw.get("done").and_then(Value::as_bool).unwrap_or(false);
        let finish_reason = raw.get("done_reason").and_then(Value::as_str).map(str::to_string);

        let usage = done.then(|| {
            let completion_tokens = raw.get("eval_count").and_then(Value::as_u64).unwrap_or(0);
            let prompt_tokens = raw.get("prompt_eval_count").and_then(Value::as_u64).unwrap_or(0);
            Usage {
                completion_tokens,
                prompt_tokens,
                total_tokens: completion_tokens + prompt_tokens,
            }
        });

        Ok(Self {
            id: stream_id.to_string(),
            created: created_at.timestamp(),
            model,
            object: if is_chunk { "text_completion.chunk" } else { "text_completion" },
            choices: vec![TextChoice {
                index: 0,
                text,
                finish_reason,
                logprobs: None,
            }],
            usage,
        })
    }
}

/// Inbound `POST /v1/embeddings` body. `input` accepts either shape OpenAI
/// allows -- a single string or a batch -- and is always sent to the
/// backend's `/api/embed` as an array (spec §4.4 extended to embeddings; the
/// original's `openai_embeddings` was a stub, spec §6 lists the route
/// unqualified so this gateway implements it for real).
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiEmbeddingsRequest {
    pub model: String,
    pub input: EmbeddingsInput,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum EmbeddingsInput {
    One(String),
    Many(Vec<String>),
}

impl OpenAiEmbeddingsRequest {
    pub fn to_ollama_body(&self) -> Result<Value> {
        let model = ModelName::openai_to_ollama(&self.model)?;
        let input = match &self.input {
            EmbeddingsInput::One(text) => Value::String(text.clone()),
            EmbeddingsInput::Many(texts) => Value::Array(texts.iter().cloned().map(Value::String).collect()),
        };
        Ok(serde_json::json!({ "model": model, "input": input }))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbeddingObject {
    pub index: u32,
    pub embedding: Vec<f32>,
    pub object: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbeddingsUsage {
    pub prompt_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OpenAiEmbeddingsResponse {
    pub object: &'static str,
    pub data: Vec<EmbeddingObject>,
    pub model: String,
    pub usage: EmbeddingsUsage,
}

impl OpenAiEmbeddingsResponse {
    /// Translate a single `/api/embed` response body (`{"embeddings": [[..]]}`)
    /// into the OpenAI embeddings list shape.
    pub fn from_ollama_embed(raw: &Value, requested_model: &str) -> Result<Self> {
        let model = requested_model.to_string();

        let embeddings = raw
            .get("embeddings")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::Internal(anyhow::anyhow!("ollama /api/embed response missing embeddings")))?;

        let data = embeddings
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                let embedding = entry
                    .as_array()
                    .map(|values| values.iter().filter_map(Value::as_f64).map(|v| v as f32).collect())
                    .unwrap_or_default();
                EmbeddingObject {
                    index: index as u32,
                    embedding,
                    object: "embedding",
                }
            })
            .collect();

        let prompt_tokens = raw.get("prompt_eval_count").and_then(Value::as_u64).unwrap_or(0);

        Ok(Self {
            object: "list",
            data,
            model,
            usage: EmbeddingsUsage {
                prompt_tokens,
                total_tokens: prompt_tokens,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translates_single_message_to_openai_shape() {
        let ollama = serde_json::json!({
            "model": "llama3:latest",
            "created_at": "2024-01-01T00:00:00.000000Z",
            "message": {"role": "assistant", "content": "hello"},
            "done": true,
            "done_reason": null,
            "eval_count": 2,
            "prompt_eval_count": 1,
        });

        let openai = OpenAiCompletionMessage::from_ollama_chat_message(&ollama, false, "chatcmpl-1").unwrap();
        assert_eq!(openai.object, MessageObject::Completion);
        assert_eq!(openai.model, "llama3");
        assert_eq!(openai.created, 1704067200);
        assert_eq!(openai.choices[0].message.as_ref().unwrap().content.as_deref(), Some("hello"));
        let usage = openai.usage.unwrap();
        assert_eq!(usage.completion_tokens, 2);
        assert_eq!(usage.prompt_tokens, 1);
        assert_eq!(usage.total_tokens, 3);
    }

    #[test]
    fn chunk_uses_delta_not_message() {
        let ollama = serde_json::json!({
            "model": "llama3:latest",
            "message": {"role": "assistant", "content": "partial"},
            "done": false,
        });

        let chunk = OpenAiCompletionMessage::from_ollama_chat_message(&ollama, true, "chatcmpl-1").unwrap();
        assert_eq!(chunk.object, MessageObject::CompletionChunk);
        assert!(chunk.choices[0].message.is_none());
        assert_eq!(chunk.choices[0].delta.as_ref().unwrap().content.as_deref(), Some("partial"));
        assert!(chunk.usage.is_none());
    }

    #[test]
    fn request_translation_rewrites_model_and_max_tokens() {
        let request = OpenAiChatRequest {
            model: "llama3/latest".to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: Some("hi".to_string()),
            }],
            stream: false,
            tools: None,
            max_tokens: Some(128),
        };

        let body = request.to_ollama_body().unwrap();
        assert_eq!(body["model"], "llama3:latest");
        assert_eq!(body["options"]["num_predict"], 128);
    }

    #[test]
    fn error_chunks_are_recognized_for_passthrough() {
        assert!(is_error_chunk(&serde_json::json!({"error": "boom"})));
        assert!(!is_error_chunk(&serde_json::json!({"message": {}})));
    }

    #[test]
    fn completion_request_translation_uses_prompt_not_messages() {
        let request = OpenAiCompletionRequest {
            model: "llama3/latest".to_string(),
            prompt: "once upon a time".to_string(),
            stream: true,
            max_tokens: Some(64),
        };
        let body = request.to_ollama_body().unwrap();
        assert_eq!(body["model"], "llama3:latest");
        assert_eq!(body["prompt"], "once upon a time");
        assert_eq!(body["options"]["num_predict"], 64);
    }

    #[test]
    fn text_completion_reads_response_field_not_message() {
        let ollama = serde_json::json!({
            "model": "llama3:latest",
            "response": "once",
            "done": false,
        });
        let chunk = OpenAiTextCompletion::from_ollama_generate_message(&ollama, true, "cmpl-1").unwrap();
        assert_eq!(chunk.object, "text_completion.chunk");
        assert_eq!(chunk.choices[0].text, "once");
        assert!(chunk.usage.is_none());
    }

    #[test]
    fn embeddings_request_accepts_single_or_batched_input() {
        let single = OpenAiEmbeddingsRequest {
            model: "nomic-embed-text/latest".to_string(),
            input: EmbeddingsInput::One("hello".to_string()),
        };
        assert_eq!(single.to_ollama_body().unwrap()["input"], "hello");

        let batch = OpenAiEmbeddingsRequest {
            model: "nomic-embed-text/latest".to_string(),
            input: EmbeddingsInput::Many(vec!["a".to_string(), "b".to_string()]),
        };
        assert_eq!(batch.to_ollama_body().unwrap()["input"], serde_json::json!(["a", "b"]));
    }

    #[test]
    fn embeddings_response_translates_embed_shape() {
        let ollama = serde_json::json!({
            "embeddings": [[0.1, 0.2], [0.3, 0.4]],
            "prompt_eval_count": 5,
        });
        let response = OpenAiEmbeddingsResponse::from_ollama_embed(&ollama, "nomic-embed-text").unwrap();
        assert_eq!(response.data.len(), 2);
        assert_eq!(response.data[1].embedding, vec![0.3, 0.4]);
        assert_eq!(response.usage.prompt_tokens, 5);
    }
}
