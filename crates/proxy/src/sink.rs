//! The external telemetry surface the observation pipeline hands its
//! derived fields to (spec §4.5 "Sink contract"), grounded on
//! `examples/original_source/ollama_x/api/middleware/langfuse.py`'s
//! `LangfuseMiddleware.log_event` -- `input`, `name` (action), `metadata`,
//! `output`, timings, `model`, and a `usage` block are exactly the fields
//! `Observer` already derives.
//!
//! `LANGFUSE_*`/`SENTRY_DSN` (spec §7) name one concrete sink; the trait
//! here is the seam a deployment wires a real exporter behind. `LoggingSink`
//! is the default, always-on implementation: best-effort, failures never
//! propagate to the client (spec §4.5).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::observer::OllamaAction;

/// One request's worth of derived telemetry, handed to the sink once the
/// stream reaches `is_done` (spec §4.5: "one call per request").
#[derive(Debug, Clone)]
pub struct ObservationEvent {
    pub action: OllamaAction,
    pub model: Option<String>,
    pub username: String,
    pub input_text: Value,
    pub response_content: String,
    pub response_metadata: Option<Value>,
    pub usage_input_tokens: Option<u64>,
    pub usage_output_tokens: Option<u64>,
    pub start_time: DateTime<Utc>,
    pub completion_start: Option<DateTime<Utc>>,
    pub completion_stop: Option<DateTime<Utc>>,
    pub cancelled: bool,
}

#[async_trait]
pub trait ObservationSink: Send + Sync {
    /// Record one completed (or cancelled) request. Best-effort: the
    /// trait has no error return because failures are logged by the
    /// implementation and never surfaced to the caller (spec §4.5).
    async fn record(&self, event: ObservationEvent);
}

/// Default sink: structured `tracing` event per request, tagged
/// `action`/`"ollama"`/model the way the original tags Langfuse traces
/// (spec §4.5).
pub struct LoggingSink;

#[async_trait]
impl ObservationSink for LoggingSink {
    async fn record(&self, event: ObservationEvent) {
        let action = match event.action {
            OllamaAction::Chat => "chat",
            OllamaAction::Generate => "generate",
        };

        if event.cancelled {
            tracing::info!(
                action,
                provider = "ollama",
                model = event.model.as_deref().unwrap_or("unknown"),
                user = event.username,
                "request observed: cancelled"
            );
            return;
        }

        tracing::info!(
            action,
            provider = "ollama",
            model = event.model.as_deref().unwrap_or("unknown"),
            user = event.username,
            input_tokens = event.usage_input_tokens,
            output_tokens = event.usage_output_tokens,
            response_chars = event.response_content.len(),
            "request observed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn logging_sink_never_panics_on_missing_fields() {
        let sink = LoggingSink;
        sink.record(ObservationEvent {
            action: OllamaAction::Chat,
            model: None,
            username: "guest".to_string(),
            input_text: Value::Null,
            response_content: String::new(),
            response_metadata: None,
            usage_input_tokens: None,
            usage_output_tokens: None,
            start_time: Utc::now(),
            completion_start: None,
            completion_stop: None,
            cancelled: true,
        })
        .await;
    }
}
