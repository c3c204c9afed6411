//! Cached per-model metadata reported by a backend's `/api/tags` and
//! `/api/show`, used to answer aggregate `/api/tags`, `/api/show`, `/api/ps`
//! without round-tripping to every backend on each request (spec §2, §4.1).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaModelInfo {
    pub backend_id: String,
    pub name: String,
    pub digest: String,
    pub size: u64,
    pub modelfile: String,
    pub parameters: String,
    pub template: String,
    pub details: serde_json::Value,
    pub fetched_at: DateTime<Utc>,
}

impl OllamaModelInfo {
    pub fn new(backend_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            backend_id: backend_id.into(),
            name: name.into(),
            digest: String::new(),
            size: 0,
            modelfile: String::new(),
            parameters: String::new(),
            template: String::new(),
            details: serde_json::Value::Null,
            fetched_at: Utc::now(),
        }
    }
}
