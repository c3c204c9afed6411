//! Ephemeral dedup key for a prompt (spec §3), grounded on
//! `examples/original_source/ollama_x/model/session.py`.
//!
//! Two identical `(user, messages)` or `(user, context)` requests share one
//! `Session` row; a TTL index on `expires_after` reclaims it after the
//! configured window (default 1 hour).

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// The two shapes a session can dedup on: chat history for `/api/chat`, or
/// an opaque generation context for `/api/generate`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum SessionKey {
    Messages(serde_json::Value),
    Context(serde_json::Value),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub key: SessionKey,
    pub expires_after: DateTime<Utc>,
}

impl Session {
    pub fn new(user_id: impl Into<String>, key: SessionKey, ttl: Duration) -> Self {
        let user_id = user_id.into();
        Self {
            id: Self::fingerprint(&user_id, &key),
            user_id,
            key,
            expires_after: Utc::now() + ttl,
        }
    }

    /// Stable composite lookup key: `sha256(user_id || canonical key json)`,
    /// used as the session's id so repeated requests collide deterministically.
    pub fn fingerprint(user_id: &str, key: &SessionKey) -> String {
        let mut hasher = Sha256::new();
        hasher.update(user_id.as_bytes());
        hasher.update(b"|");
        let canonical = match key {
            SessionKey::Messages(v) | SessionKey::Context(v) => v.to_string(),
        };
        hasher.update(canonical.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_after
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_messages_fingerprint_the_same() {
        let key = SessionKey::Messages(serde_json::json!([{"role": "user", "content": "hi"}]));
        let a = Session::new("u1", key.clone(), Duration::hours(1));
        let b = Session::new("u1", key, Duration::hours(1));
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn different_users_do_not_collide() {
        let key = SessionKey::Messages(serde_json::json!([{"role": "user", "content": "hi"}]));
        let a = Session::new("u1", key.clone(), Duration::hours(1));
        let b = Session::new("u2", key, Duration::hours(1));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn expiry_is_respected() {
        let key = SessionKey::Context(serde_json::json!("ctx"));
        let session = Session::new("u1", key, Duration::seconds(-1));
        assert!(session.is_expired(Utc::now()));
    }
}
