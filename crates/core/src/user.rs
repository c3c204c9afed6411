//! User accounts, API keys, and the transient guest identity (spec §3, §4.6),
//! grounded on `examples/original_source/ollama_x/model/user.py`.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Reserved username shared by every transient guest identity.
pub const GUEST_USERNAME: &str = "guest";

const KEY_MIN_LEN: usize = 40;
const KEY_MAX_LEN: usize = 60;

/// URL-safe alphabet excluding `"`, `'`, `\`, `:` (spec §3).
const KEY_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~!@#$%^&*()+=[]{}|;,.<>?/";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    /// The secret API key. Never serialized to untrusted clients directly;
    /// use [`User::profile`] to produce a redacted view.
    pub key: String,
    pub is_admin: bool,
    pub is_active: bool,
}

impl User {
    /// Generate a new API key: 40-60 chars drawn from [`KEY_ALPHABET`]
    /// before any wire-level encoding (spec §8.1).
    pub fn generate_key() -> String {
        let mut rng = rand::thread_rng();
        let len = rng.gen_range(KEY_MIN_LEN..=KEY_MAX_LEN);
        (0..len)
            .map(|_| {
                let idx = rng.gen_range(0..KEY_ALPHABET.len());
                KEY_ALPHABET[idx] as char
            })
            .collect()
    }

    pub fn new(username: impl Into<String>, key: Option<String>, is_admin: bool) -> Result<Self> {
        let username = username.into();
        if !(4..=50).contains(&username.len()) {
            return Err(Error::Validation(format!(
                "username must be 4-50 chars, got {}",
                username.len()
            )));
        }

        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            username,
            key: key.unwrap_or_else(Self::generate_key),
            is_admin,
            is_active: true,
        })
    }

    /// Build a transient guest user. Never persisted (spec §3 invariant).
    pub fn guest() -> Self {
        Self {
            id: format!("guest-{}", uuid::Uuid::new_v4()),
            username: GUEST_USERNAME.to_string(),
            key: Self::generate_key(),
            is_admin: false,
            is_active: true,
        }
    }

    pub fn is_guest(&self) -> bool {
        self.username == GUEST_USERNAME
    }

    /// Redacted projection for API responses: the key is included only when
    /// the caller is the key's own owner (`exclude_secrets = false` in the
    /// original `UserBase.from_document`).
    pub fn profile(&self, include_secret: bool) -> UserProfile {
        UserProfile {
            username: self.username.clone(),
            is_admin: self.is_admin,
            key: include_secret.then(|| self.key.clone()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub username: String,
    pub is_admin: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn generated_keys_satisfy_length_and_alphabet() {
        let allowed: HashSet<u8> = KEY_ALPHABET.iter().copied().collect();
        for _ in 0..1000 {
            let key = User::generate_key();
            assert!(key.len() >= KEY_MIN_LEN && key.len() <= KEY_MAX_LEN);
            assert!(key.bytes().all(|b| allowed.contains(&b)));
            assert!(!key.contains(['"', '\'', '\\', ':']));
        }
    }

    #[test]
    fn generated_keys_do_not_collide() {
        let mut seen = HashSet::new();
        for _ in 0..100_000 {
            assert!(seen.insert(User::generate_key()));
        }
    }

    #[test]
    fn guest_user_is_never_admin_and_is_recognizable() {
        let guest = User::guest();
        assert!(guest.is_guest());
        assert!(!guest.is_admin);
    }

    #[test]
    fn username_length_is_validated() {
        assert!(User::new("abc", None, false).is_err());
        assert!(User::new("valid_name", None, false).is_ok());
    }
}
