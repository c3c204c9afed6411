//! Streaming proxy, OpenAI<->Ollama protocol translator, and observation
//! pipeline (spec §4.3-§4.5).

pub mod observer;
pub mod openai;
pub mod sink;
pub mod streaming;

pub use observer::{Observer, OllamaAction};
pub use sink::{ObservationEvent, ObservationSink, LoggingSink};
pub use streaming::{BackendRequest, ChunkStream, ProxyChunk, ProxyError, ProxyOutcome, StreamingProxy};
