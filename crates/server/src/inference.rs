//! Ollama-native and OpenAI-compatible inference routes (spec §4.2-§4.4,
//! §6), grounded on `examples/original_source/ollama_x/api/ollama.py`'s
//! `proxy`/`generate_embeddings`/`get_tags`/`show_model`/`get_running_models`
//! and `examples/original_source/ollama_x/api/openai.py`'s `openai_chat`,
//! with admission enforcement and streaming handled by
//! `ollamax_dispatcher`/`ollamax_proxy` instead of the original's module-level
//! `QueueHandler` dict and `aiohttp` passthrough.

use std::convert::Infallible;

use axum::body::Body;
use axum::extract::State;
use axum::http::header::{ACCEPT, CONTENT_TYPE};
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use chrono::Utc;
use futures::StreamExt;
use ollamax_core::{Error, ModelDetails, ModelSummary, Session, SessionKey, User};
use ollamax_dispatcher::resolve_requested_model;
use ollamax_proxy::openai::{
    is_error_chunk, OpenAiChatRequest, OpenAiCompletionMessage, OpenAiCompletionRequest, OpenAiEmbeddingsRequest,
    OpenAiEmbeddingsResponse, OpenAiTextCompletion,
};
use ollamax_proxy::{BackendRequest, ChunkStream, ObservationEvent, ObservationSink, OllamaAction, Observer, ProxyChunk, ProxyOutcome};
use ollamax_store::{filter, Repository};
use reqwest::Method;
use serde_json::Value;

use crate::auth::CurrentUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/chat", post(ollama_chat))
        .route("/ollama/api/chat", post(ollama_chat))
        .route("/api/generate", post(ollama_generate))
        .route("/ollama/api/generate", post(ollama_generate))
        .route("/api/embed", post(ollama_embed))
        .route("/api/embeddings", post(ollama_embed))
        .route("/api/tags", get(ollama_tags))
        .route("/ollama/api/tags", get(ollama_tags))
        .route("/api/show", post(ollama_show))
        .route("/ollama/api/show", post(ollama_show))
        .route("/api/ps", get(ollama_ps))
        .route("/ollama/api/ps", get(ollama_ps))
        .route("/v1/chat/completions", post(openai_chat_completions))
        .route("/v1/completions", post(openai_completions))
        .route("/v1/embeddings", post(openai_embeddings))
}

async fn ollama_chat(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> ApiResult<Response> {
    handle_ollama_request(state, user, headers, OllamaAction::Chat, "/api/chat", body).await
}

async fn ollama_generate(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> ApiResult<Response> {
    handle_ollama_request(state, user, headers, OllamaAction::Generate, "/api/generate", body).await
}

/// `POST /api/embed` (and the legacy `/api/embeddings` alias): the original's
/// handler read `request.state.model` before parsing the JSON body, so a
/// body-only `model` field never reached it (spec §2's resolved bug -- here
/// the body is parsed first).
async fn ollama_embed(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(mut body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let requested_model = body
        .get("model")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::Validation("missing model".to_string()))?;

    let resolved_model = admitted_model(&state, &user, Some(&requested_model));
    if let Some(model) = &resolved_model {
        if let Some(obj) = body.as_object_mut() {
            obj.insert("model".to_string(), Value::String(model.clone()));
        }
    }

    let request = BackendRequest::new(Method::POST, "/api/embed", body);
    let outcome = state
        .streaming_proxy
        .dispatch_stream(&state.dispatcher, resolved_model.as_deref(), request, None)
        .await?;

    match outcome {
        ProxyOutcome::BackendStatus { status, body } => Err(backend_status_error(status, &body)),
        ProxyOutcome::Stream(stream) => Ok(Json(collect_single_chunk(stream).await?)),
    }
}

async fn ollama_tags(State(state): State<AppState>, CurrentUser(_user): CurrentUser) -> ApiResult<Json<Value>> {
    let names = state.registry.union_tags().await?;
    let mut models = Vec::with_capacity(names.len());
    for name in names {
        let summary = match state.registry.cached_model(&name).await {
            Ok(info) => ModelSummary {
                name: name.clone(),
                model: name,
                modified_at: info.fetched_at,
                size: info.size,
                digest: info.digest,
            },
            Err(_) => ModelSummary {
                name: name.clone(),
                model: name,
                modified_at: Utc::now(),
                size: 0,
                digest: String::new(),
            },
        };
        models.push(summary);
    }
    Ok(Json(serde_json::json!({ "models": models })))
}

/// `/api/show` resolves against cached backend metadata rather than a live
/// call (spec §4.3).
async fn ollama_show(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Json(body): Json<Value>,
) -> ApiResult<Json<ModelDetails>> {
    let name = body
        .get("model")
        .or_else(|| body.get("name"))
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Validation("missing model name".to_string()))?;

    let info = state.registry.cached_model(name).await?;
    Ok(Json(ModelDetails {
        name: info.name,
        modelfile: info.modelfile,
        parameters: info.parameters,
        template: info.template,
        details: info.details,
    }))
}

async fn ollama_ps(State(state): State<AppState>, CurrentUser(_user): CurrentUser) -> ApiResult<Json<Value>> {
    let models = state.registry.union_running_models().await?;
    Ok(Json(serde_json::json!({ "models": models })))
}

async fn openai_chat_completions(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    headers: HeaderMap,
    Json(request): Json<OpenAiChatRequest>,
) -> ApiResult<Response> {
    let wants_stream = request.stream;
    let body = request.to_ollama_body()?;
    handle_openai_request(state, user, headers, OllamaAction::Chat, "/api/chat", body, wants_stream, TranslateKind::Chat).await
}

async fn openai_completions(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    headers: HeaderMap,
    Json(request): Json<OpenAiCompletionRequest>,
) -> ApiResult<Response> {
    let wants_stream = request.stream;
    let body = request.to_ollama_body()?;
    handle_openai_request(
        state,
        user,
        headers,
        OllamaAction::Generate,
        "/api/generate",
        body,
        wants_stream,
        TranslateKind::Completion,
    )
    .await
}

/// Spec §6 lists `/v1/embeddings` as a real route; the original's
/// `openai_embeddings` was a literal `NotImplementedError` stub, which this
/// gateway resolves by translating through `/api/embed` (spec §2's recorded
/// Open Question).
async fn openai_embeddings(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<OpenAiEmbeddingsRequest>,
) -> ApiResult<Json<OpenAiEmbeddingsResponse>> {
    let requested_model = request.model.clone();
    let mut body = request.to_ollama_body()?;
    let resolved_model = admitted_model(&state, &user, body.get("model").and_then(Value::as_str).map(str::to_string).as_deref());
    if let Some(model) = &resolved_model {
        if let Some(obj) = body.as_object_mut() {
            obj.insert("model".to_string(), Value::String(model.clone()));
        }
    }

    let backend_request = BackendRequest::new(Method::POST, "/api/embed", body);
    let outcome = state
        .streaming_proxy
        .dispatch_stream(&state.dispatcher, resolved_model.as_deref(), backend_request, None)
        .await?;

    let raw = match outcome {
        ProxyOutcome::BackendStatus { status, body } => return Err(backend_status_error(status, &body)),
        ProxyOutcome::Stream(stream) => collect_single_chunk(stream).await?,
    };

    Ok(Json(OpenAiEmbeddingsResponse::from_ollama_embed(&raw, &requested_model)?))
}

/// Which OpenAI response shape a streamed backend chunk translates to.
#[derive(Debug, Clone, Copy)]
enum TranslateKind {
    Chat,
    Completion,
}

fn translate_chunk(kind: TranslateKind, raw: &Value, is_chunk: bool, stream_id: &str) -> ollamax_core::Result<Value> {
    if is_error_chunk(raw) {
        return Ok(raw.clone());
    }
    let value = match kind {
        TranslateKind::Chat => serde_json::to_value(OpenAiCompletionMessage::from_ollama_chat_message(raw, is_chunk, stream_id)?),
        TranslateKind::Completion => {
            serde_json::to_value(OpenAiTextCompletion::from_ollama_generate_message(raw, is_chunk, stream_id)?)
        }
    };
    value.map_err(|err| Error::Internal(anyhow::anyhow!(err)))
}

/// Shared Ollama-native dispatch: resolves the admitted model, dedups the
/// request against its session row, dispatches through the streaming proxy,
/// tees an [`Observer`] for telemetry, and renders the backend's own NDJSON
/// shape back to the client untranslated.
async fn handle_ollama_request(
    state: AppState,
    user: User,
    headers: HeaderMap,
    action: OllamaAction,
    backend_path: &'static str,
    mut body: Value,
) -> ApiResult<Response> {
    let requested_model = body.get("model").and_then(Value::as_str).map(str::to_string);
    let resolved_model = admitted_model(&state, &user, requested_model.as_deref());
    if let Some(model) = &resolved_model {
        if let Some(obj) = body.as_object_mut() {
            obj.insert("model".to_string(), Value::String(model.clone()));
        }
    }

    record_session(&state, &user, action, &body).await;

    let is_streaming = body.get("stream").and_then(Value::as_bool).unwrap_or(true);
    let observer = Observer::new(action, body.clone(), header_pairs(&headers), user.clone());
    let request = BackendRequest::new(Method::POST, backend_path, body);

    let outcome = state
        .streaming_proxy
        .dispatch_stream(&state.dispatcher, resolved_model.as_deref(), request, Some(observer.clone()))
        .await?;

    spawn_observation(state.clone(), observer);

    render_ollama_outcome(outcome, is_streaming).await
}

/// Shared OpenAI-compatible dispatch: same admission/session/observation
/// pipeline as [`handle_ollama_request`], but the backend's chunks are
/// translated to the OpenAI shape and framed as SSE or NDJSON depending on
/// `Accept` (spec §4.4 "Response translation", §6 "SSE framing").
async fn handle_openai_request(
    state: AppState,
    user: User,
    headers: HeaderMap,
    action: OllamaAction,
    backend_path: &'static str,
    mut body: Value,
    wants_stream: bool,
    kind: TranslateKind,
) -> ApiResult<Response> {
    let requested_model = body.get("model").and_then(Value::as_str).map(str::to_string);
    let resolved_model = admitted_model(&state, &user, requested_model.as_deref());
    if let Some(model) = &resolved_model {
        if let Some(obj) = body.as_object_mut() {
            obj.insert("model".to_string(), Value::String(model.clone()));
        }
    }

    record_session(&state, &user, action, &body).await;

    let is_sse = headers.get(ACCEPT).and_then(|v| v.to_str().ok()) == Some("text/event-stream");
    let stream_id = OpenAiCompletionMessage::new_stream_id();
    let observer = Observer::new(action, body.clone(), header_pairs(&headers), user.clone());
    let request = BackendRequest::new(Method::POST, backend_path, body);

    let outcome = state
        .streaming_proxy
        .dispatch_stream(&state.dispatcher, resolved_model.as_deref(), request, Some(observer.clone()))
        .await?;

    spawn_observation(state.clone(), observer);

    match outcome {
        ProxyOutcome::BackendStatus { status, body } => Err(backend_status_error(status, &body)),
        ProxyOutcome::Stream(stream) => {
            if wants_stream {
                Ok(render_openai_stream(kind, stream, stream_id, is_sse))
            } else {
                let raw = collect_single_chunk(stream).await?;
                let translated = translate_chunk(kind, &raw, false, &stream_id)?;
                Ok(Json(translated).into_response())
            }
        }
    }
}

/// Spec §4.2: enforce_model overrides everyone, guests fall back to
/// anonymous_model, otherwise the client's own choice stands.
fn admitted_model(state: &AppState, user: &User, requested: Option<&str>) -> Option<String> {
    let settings = state.settings.read();
    resolve_requested_model(settings.enforce_model.as_deref(), settings.anonymous_model.as_deref(), user.is_guest(), requested)
}

/// Find-or-create the session row deduping this `(user, messages|context)`
/// request (spec §3), mirroring the original's `AISession` dependency --
/// purely a side effect, its result isn't read by the handler.
async fn record_session(state: &AppState, user: &User, action: OllamaAction, body: &Value) {
    let key = match action {
        OllamaAction::Chat => body.get("messages").cloned().map(SessionKey::Messages),
        OllamaAction::Generate => body.get("context").cloned().map(SessionKey::Context),
    };
    let Some(key) = key else {
        return;
    };

    let ttl = chrono::Duration::seconds(state.settings.read().session_ttl_seconds);
    if let Err(err) = find_or_create_session(&state.sessions, &user.id, key, ttl).await {
        tracing::warn!(error = %err, "session dedup lookup failed");
    }
}

async fn find_or_create_session(
    sessions: &std::sync::Arc<dyn Repository<Session>>,
    user_id: &str,
    key: SessionKey,
    ttl: chrono::Duration,
) -> ollamax_core::Result<Session> {
    let id = Session::fingerprint(user_id, &key);
    match sessions.find_one(filter(move |s: &Session| s.id == id)).await {
        Ok(session) => Ok(session),
        Err(Error::NotFound(_)) => sessions.insert(Session::new(user_id, key, ttl)).await,
        Err(err) => Err(err),
    }
}

/// Header pairs handed to the [`Observer`] (it strips `authorization` and
/// `content-length` itself).
fn header_pairs(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
        .collect()
}

/// Runs independently of the client response so a disconnect never blocks
/// recording (spec §4.5: observation never adds client-visible latency).
fn spawn_observation(state: AppState, observer: Observer) {
    tokio::spawn(async move {
        let done = observer.wait_done().await;
        let (usage_in, usage_out) = observer.usage_tokens().map_or((None, None), |(i, o)| (Some(i), Some(o)));
        let event = ObservationEvent {
            action: observer.action(),
            model: observer.resolved_model(),
            username: observer.user().username.clone(),
            input_text: observer.input_text(),
            response_content: observer.response_content(),
            response_metadata: observer.response_metadata(),
            usage_input_tokens: usage_in,
            usage_output_tokens: usage_out,
            start_time: observer.start_time(),
            completion_start: observer.completion_start(),
            completion_stop: observer.completion_stop(),
            cancelled: !done,
        };
        state.observation_sink.record(event).await;
    });
}

fn backend_status_error(status: u16, body: &Bytes) -> ApiError {
    tracing::warn!(status, "backend returned a non-2xx response");
    let message = String::from_utf8_lossy(body).to_string();
    ApiError(Error::Internal(anyhow::anyhow!("backend responded {status}: {message}")))
}

async fn collect_single_chunk(mut stream: ChunkStream) -> ApiResult<Value> {
    match stream.next().await {
        Some(Ok(ProxyChunk::Json(value))) => Ok(value),
        Some(Ok(ProxyChunk::BackendStatus { status, body })) => Err(backend_status_error(status, &body)),
        Some(Err(err)) => Err(err.into()),
        None => Err(ApiError(Error::Internal(anyhow::anyhow!("backend produced no response")))),
    }
}

/// Renders an Ollama-native outcome untranslated: NDJSON when the client
/// asked to stream, a single JSON object otherwise (spec §4.3).
async fn render_ollama_outcome(outcome: ProxyOutcome, is_streaming: bool) -> ApiResult<Response> {
    match outcome {
        ProxyOutcome::BackendStatus { status, body } => Err(backend_status_error(status, &body)),
        ProxyOutcome::Stream(stream) => {
            if is_streaming {
                Ok(ndjson_response(stream))
            } else {
                let value = collect_single_chunk(stream).await?;
                Ok(Json(value).into_response())
            }
        }
    }
}

fn ndjson_response(stream: ChunkStream) -> Response {
    let body_stream = stream.map(|item| match item {
        Ok(ProxyChunk::Json(value)) => {
            let mut line = serde_json::to_vec(&value).unwrap_or_default();
            line.push(b'\n');
            Ok(Bytes::from(line))
        }
        Ok(ProxyChunk::BackendStatus { body, .. }) => Ok(body),
        Err(err) => Err(std::io::Error::other(err.to_string())),
    });

    let mut response = Response::new(Body::from_stream(body_stream));
    response
        .headers_mut()
        .insert(CONTENT_TYPE, "application/x-ndjson".parse().expect("static content-type"));
    response
}

fn render_openai_stream(kind: TranslateKind, stream: ChunkStream, stream_id: String, is_sse: bool) -> Response {
    if is_sse {
        let event_id = Utc::now().timestamp();
        let sse_stream = stream.map(move |item| {
            let event = match item {
                Ok(ProxyChunk::Json(raw)) => match translate_chunk(kind, &raw, true, &stream_id) {
                    Ok(translated) => Event::default().id(event_id.to_string()).data(translated.to_string()),
                    Err(err) => Event::default().id(event_id.to_string()).data(
                        serde_json::json!({ "error": err.public_message() }).to_string(),
                    ),
                },
                Ok(ProxyChunk::BackendStatus { body, .. }) => {
                    Event::default().id(event_id.to_string()).data(String::from_utf8_lossy(&body).to_string())
                }
                Err(err) => Event::default().id(event_id.to_string()).data(
                    serde_json::json!({ "error": err.public_message() }).to_string(),
                ),
            };
            Ok::<Event, Infallible>(event)
        });

        Sse::new(sse_stream).keep_alive(KeepAlive::default()).into_response()
    } else {
        let stream_id_for_body = stream_id.clone();
        let body_stream = stream.map(move |item| {
            let value = match item {
                Ok(ProxyChunk::Json(raw)) => translate_chunk(kind, &raw, true, &stream_id_for_body).unwrap_or(raw),
                Ok(ProxyChunk::BackendStatus { body, .. }) => {
                    return Ok::<Bytes, std::io::Error>(body);
                }
                Err(err) => serde_json::json!({ "error": err.public_message() }),
            };
            let mut line = serde_json::to_vec(&value).unwrap_or_default();
            line.push(b'\n');
            Ok(Bytes::from(line))
        });

        let mut response = Response::new(Body::from_stream(body_stream));
        response
            .headers_mut()
            .insert(CONTENT_TYPE, "application/x-ndjson".parse().expect("static content-type"));
        response
    }
}
