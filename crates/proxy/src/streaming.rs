//! Forwards one inference request to its chosen backend and streams the
//! response back with minimal buffering (spec §4.3), grounded on the
//! teacher's own `voice-agent-rust/crates/llm/src/backend.rs` streaming
//! client: `reqwest::Response::bytes_stream()` plus line-buffered NDJSON
//! splitting, never holding the full body in memory.
//!
//! The admission queue's semaphore permit (`crates/dispatcher`) must stay
//! held for the full duration of the backend call, not just until the
//! response headers arrive -- so the NDJSON pump itself runs as the
//! dispatcher's `work` closure, and chunks reach the HTTP layer through an
//! unbounded channel rather than as `dispatch`'s return value.

use std::pin::Pin;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use ollamax_core::{Backend, Error, Result};
use ollamax_dispatcher::Dispatcher;
use reqwest::{Client, Method};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::observer::Observer;

/// One proxied call: method, backend-relative path (spec §4.3's endpoint
/// map), and the client's JSON body (with `model` still client-supplied --
/// the dispatcher rewrites it to the resolved name).
#[derive(Debug, Clone)]
pub struct BackendRequest {
    pub method: Method,
    pub path: String,
    pub body: Value,
}

impl BackendRequest {
    pub fn new(method: Method, path: impl Into<String>, body: Value) -> Self {
        Self {
            method,
            path: path.into(),
            body,
        }
    }
}

/// Connection-level failures reaching the backend, distinct from the
/// backend's own HTTP-level error responses (spec §7: a connection failure
/// maps to `NoServerAvailable` and is not retried; a backend 5xx is
/// forwarded as-is).
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("backend connection failed: {0}")]
    Connection(#[from] reqwest::Error),
}

impl From<ProxyError> for Error {
    fn from(_: ProxyError) -> Self {
        Error::NoServerAvailable
    }
}

/// One unit handed to the client: a parsed NDJSON object, or -- for a
/// non-2xx backend response -- the raw status and body to forward
/// unmodified (spec §4.3 / §7: "backend 5xx responses are forwarded as-is
/// rather than mapped").
#[derive(Debug)]
pub enum ProxyChunk {
    Json(Value),
    BackendStatus { status: u16, body: Bytes },
}

pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<ProxyChunk>> + Send>>;

/// What `StreamingProxy::dispatch_stream` hands back once a backend has
/// been selected and the call has started.
pub enum ProxyOutcome {
    /// The backend answered (2xx); `stream` yields one or more chunks.
    Stream(ChunkStream),
    /// The backend answered with a non-2xx status; forward verbatim.
    BackendStatus { status: u16, body: Bytes },
}

/// Thin wrapper over a `reqwest::Client` that knows how to run one backend
/// call as a dispatcher work item and tee its chunks to an [`Observer`].
#[derive(Clone)]
pub struct StreamingProxy {
    http: Client,
}

impl StreamingProxy {
    pub fn new(http: Client) -> Self {
        Self { http }
    }

    /// Select a backend via `dispatcher`, then run `request` against it.
    /// `requested_model` drives both backend selection (spec §4.2) and the
    /// outbound body's `model` field rewrite.
    ///
    /// Backend selection failures (`NoServerAvailable`) and the first
    /// chunk's own connection failure are returned as `Err` so the HTTP
    /// layer can map them through the normal error taxonomy. Everything
    /// after the first chunk streams through the returned
    /// [`ProxyOutcome::Stream`].
    pub async fn dispatch_stream(
        &self,
        dispatcher: &Dispatcher<()>,
        requested_model: Option<&str>,
        request: BackendRequest,
        observer: Option<Observer>,
    ) -> Result<ProxyOutcome> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Result<ProxyChunk>>();
        let http = self.http.clone();
        let tx_for_selection_failure = tx.clone();

        let dispatch_fut = dispatcher.dispatch(requested_model, move |backend, resolved_model| async move {
            run_backend_request(http, backend, resolved_model, request, tx, observer).await
        });

        tokio::spawn(async move {
            // `run_backend_request` never returns `Err` once it has sent
            // anything on its own channel handle -- an `Err` here means
            // `dispatch` failed before `work` ran at all (no active
            // backend matched), so this is the only place that needs to
            // report it.
            if let Err(err) = dispatch_fut.await {
                let _ = tx_for_selection_failure.send(Err(err));
            }
        });

        let first = rx.recv().await;
        match first {
            Some(Ok(ProxyChunk::BackendStatus { status, body })) => Ok(ProxyOutcome::BackendStatus { status, body }),
            Some(Ok(chunk)) => {
                let rest = UnboundedReceiverStream::new(rx);
                let stream = futures::stream::once(async move { Ok::<ProxyChunk, Error>(chunk) }).chain(rest);
                Ok(ProxyOutcome::Stream(Box::pin(stream)))
            }
            Some(Err(err)) => Err(err),
            None => Err(Error::Internal(anyhow::anyhow!("backend produced no response"))),
        }
    }
}

/// Runs inside the dispatcher's worker slot: issues the backend call,
/// rewrites `model` to the resolved name, and pumps NDJSON chunks (or a
/// single read-to-completion body) into `tx`. Holds the admission
/// semaphore permit for as long as the backend keeps sending.
async fn run_backend_request(
    http: Client,
    backend: Backend,
    resolved_model: Option<String>,
    request: BackendRequest,
    tx: mpsc::UnboundedSender<Result<ProxyChunk>>,
    observer: Option<Observer>,
) -> Result<()> {
    let mut body = request.body;
    if let Some(model) = resolved_model {
        if let Some(obj) = body.as_object_mut() {
            obj.insert("model".to_string(), Value::String(model.clone()));
        }
        if let Some(observer) = &observer {
            observer.set_resolved_model(model);
        }
    }
    let is_streaming = body.get("stream").and_then(Value::as_bool).unwrap_or(true);

    let url = format!("{}{}", backend.base_url.trim_end_matches('/'), request.path);
    let response = match http.request(request.method.clone(), &url).json(&body).send().await {
        Ok(resp) => resp,
        Err(err) => {
            let core_err: Error = ProxyError::from(err).into();
            // Reported through `tx`, not the return value, so the
            // caller's `rx.recv()` sees it as the first (and only) item
            // rather than racing a duplicate from the dispatch wrapper.
            let _ = tx.send(Err(core_err));
            if let Some(observer) = &observer {
                observer.finish(None);
            }
            return Ok(());
        }
    };

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.bytes().await.unwrap_or_default();
        let _ = tx.send(Ok(ProxyChunk::BackendStatus { status, body }));
        if let Some(observer) = &observer {
            observer.finish(None);
        }
        return Ok(());
    }

    if !is_streaming {
        return read_single_body(response, tx, observer).await;
    }

    pump_ndjson(response, tx, observer).await
}

async fn read_single_body(
    response: reqwest::Response,
    tx: mpsc::UnboundedSender<Result<ProxyChunk>>,
    observer: Option<Observer>,
) -> Result<()> {
    match response.json::<Value>().await {
        Ok(value) => {
            if let Some(observer) = &observer {
                observer.observe_chunk(&value);
            }
            let done = value.get("done").and_then(Value::as_bool).unwrap_or(true);
            let _ = tx.send(Ok(ProxyChunk::Json(value)));
            if let Some(observer) = &observer {
                observer.finish(Some(done));
            }
            Ok(())
        }
        Err(err) => {
            let _ = tx.send(Err(Error::Internal(anyhow::anyhow!(err))));
            if let Some(observer) = &observer {
                observer.finish(None);
            }
            Ok(())
        }
    }
}

/// Splits the backend's byte stream on `\n` and parses each complete line
/// as one NDJSON object, tee-ing it to `observer` before forwarding it on
/// `tx`. A client that drops its receiving end (disconnects mid-stream)
/// stops the pump on the next send, matching "client cancellation reflects
/// as `is_done` resolving falsy" (spec §4.5).
async fn pump_ndjson(
    response: reqwest::Response,
    tx: mpsc::UnboundedSender<Result<ProxyChunk>>,
    observer: Option<Observer>,
) -> Result<()> {
    let mut byte_stream = response.bytes_stream();
    let mut buffer = String::new();
    let mut last_done = false;

    while let Some(next) = byte_stream.next().await {
        let chunk = match next {
            Ok(chunk) => chunk,
            Err(err) => {
                let _ = tx.send(Err(Error::Internal(anyhow::anyhow!(err))));
                break;
            }
        };
        buffer.push_str(&String::from_utf8_lossy(&chunk));

        while let Some(idx) = buffer.find('\n') {
            let line = buffer[..idx].trim().to_string();
            buffer.drain(..=idx);
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(&line) {
                Ok(value) => {
                    if let Some(observer) = &observer {
                        observer.observe_chunk(&value);
                    }
                    last_done = value.get("done").and_then(Value::as_bool).unwrap_or(false);
                    if tx.send(Ok(ProxyChunk::Json(value))).is_err() {
                        if let Some(observer) = &observer {
                            observer.finish(None);
                        }
                        return Ok(());
                    }
                }
                Err(err) => {
                    let _ = tx.send(Err(Error::Internal(anyhow::anyhow!(err))));
                }
            }
        }
    }

    let trailing = buffer.trim();
    if !trailing.is_empty() {
        if let Ok(value) = serde_json::from_str::<Value>(trailing) {
            if let Some(observer) = &observer {
                observer.observe_chunk(&value);
            }
            last_done = value.get("done").and_then(Value::as_bool).unwrap_or(false);
            let _ = tx.send(Ok(ProxyChunk::Json(value)));
        }
    }

    if let Some(observer) = &observer {
        observer.finish(Some(last_done));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes as AxumBytes;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::Router;
    use ollamax_core::OllamaModelInfo;
    use ollamax_store::{InMemoryRepository, Repository};
    use std::sync::Arc;
    use tokio::net::TcpListener;

    /// Starts a one-route mock backend on an ephemeral local port and
    /// returns its base URL. The serving task is left detached; it exits
    /// when the test process tears down the listener's port.
    async fn mock_backend(route: &'static str, status: StatusCode, content_type: &'static str, body: &'static str) -> String {
        let app = Router::new().route(
            route,
            post(move || async move {
                (status, [(axum::http::header::CONTENT_TYPE, content_type)], AxumBytes::from_static(body.as_bytes()))
            }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    async fn dispatcher_with_backend(base_url: &str, model: &str) -> Dispatcher<()> {
        let backends = Arc::new(InMemoryRepository::<Backend>::new("backend"));
        let mut backend = Backend::new("b1", base_url);
        backend.last_alive = Some(chrono::Utc::now());
        backend.models = vec![format!("{model}:latest")];
        backends.insert(backend).await.unwrap();

        let registry = Arc::new(ollamax_registry::BackendRegistry::new(
            backends,
            Arc::new(InMemoryRepository::<OllamaModelInfo>::new("model")),
            chrono::Duration::seconds(20),
        ));
        Dispatcher::new(registry, 20)
    }

    #[tokio::test]
    async fn streams_ndjson_chunks_in_order() {
        let base_url = mock_backend(
            "/api/chat",
            StatusCode::OK,
            "application/x-ndjson",
            "{\"model\":\"llama3:latest\",\"message\":{\"role\":\"assistant\",\"content\":\"a\"},\"done\":false}\n\
             {\"model\":\"llama3:latest\",\"message\":{\"role\":\"assistant\",\"content\":\"b\"},\"done\":true,\"eval_count\":1,\"prompt_eval_count\":1}\n",
        )
        .await;

        let dispatcher = dispatcher_with_backend(&base_url, "llama3").await;
        let proxy = StreamingProxy::new(Client::new());
        let request = BackendRequest::new(
            Method::POST,
            "/api/chat",
            serde_json::json!({"model": "llama3", "messages": [], "stream": true}),
        );

        let outcome = proxy.dispatch_stream(&dispatcher, Some("llama3"), request, None).await.unwrap();
        let mut chunks = Vec::new();
        match outcome {
            ProxyOutcome::Stream(mut stream) => {
                while let Some(item) = stream.next().await {
                    chunks.push(item.unwrap());
                }
            }
            ProxyOutcome::BackendStatus { .. } => panic!("expected a stream"),
        }

        assert_eq!(chunks.len(), 2);
        assert!(matches!(&chunks[0], ProxyChunk::Json(v) if v["message"]["content"] == "a"));
        assert!(matches!(&chunks[1], ProxyChunk::Json(v) if v["done"] == true));
    }

    #[tokio::test]
    async fn non_streaming_reads_single_body() {
        let base_url = mock_backend(
            "/api/generate",
            StatusCode::OK,
            "application/json",
            "{\"model\":\"llama3:latest\",\"response\":\"hi\",\"done\":true}",
        )
        .await;

        let dispatcher = dispatcher_with_backend(&base_url, "llama3").await;
        let proxy = StreamingProxy::new(Client::new());
        let request = BackendRequest::new(
            Method::POST,
            "/api/generate",
            serde_json::json!({"model": "llama3", "prompt": "hi", "stream": false}),
        );

        let outcome = proxy.dispatch_stream(&dispatcher, Some("llama3"), request, None).await.unwrap();
        let chunks = match outcome {
            ProxyOutcome::Stream(mut stream) => {
                let mut out = Vec::new();
                while let Some(item) = stream.next().await {
                    out.push(item.unwrap());
                }
                out
            }
            ProxyOutcome::BackendStatus { .. } => panic!("expected a backend status passthrough"),
        };
        assert_eq!(chunks.len(), 1);
    }

    #[tokio::test]
    async fn backend_5xx_is_forwarded_verbatim() {
        let base_url = mock_backend("/api/chat", StatusCode::INTERNAL_SERVER_ERROR, "text/plain", "backend exploded").await;

        let dispatcher = dispatcher_with_backend(&base_url, "llama3").await;
        let proxy = StreamingProxy::new(Client::new());
        let request = BackendRequest::new(
            Method::POST,
            "/api/chat",
            serde_json::json!({"model": "llama3", "messages": [], "stream": true}),
        );

        let outcome = proxy.dispatch_stream(&dispatcher, Some("llama3"), request, None).await.unwrap();
        match outcome {
            ProxyOutcome::BackendStatus { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, Bytes::from_static(b"backend exploded"));
            }
            ProxyOutcome::Stream(_) => panic!("expected a backend status passthrough"),
        }
    }

    #[tokio::test]
    async fn no_active_backend_fails_fast() {
        let backends = Arc::new(InMemoryRepository::<Backend>::new("backend"));
        let registry = Arc::new(ollamax_registry::BackendRegistry::new(
            backends,
            Arc::new(InMemoryRepository::<OllamaModelInfo>::new("model")),
            chrono::Duration::seconds(20),
        ));
        let dispatcher = Dispatcher::new(registry, 20);
        let proxy = StreamingProxy::new(Client::new());
        let request = BackendRequest::new(Method::POST, "/api/chat", serde_json::json!({"model": "llama3"}));

        let err = proxy
            .dispatch_stream(&dispatcher, Some("llama3"), request, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoServerAvailable));
    }
}
