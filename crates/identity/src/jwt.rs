//! JWT issuance and verification for the `/api/user/.login` flow (spec
//! §4.6 item 2), grounded on `examples/original_source/ollama_x/config.py`'s
//! `jwt_secret_key`/`jwt_token_expire_minutes` fields -- the original pack
//! has no standalone JWT module; HS256 with `sub`/`exp` claims is the
//! idiomatic `jsonwebtoken` shape for the teacher's dependency stack.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use ollamax_core::{Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: i64,
}

pub struct JwtIssuer {
    secret: String,
    expire_minutes: i64,
}

impl JwtIssuer {
    pub fn new(secret: impl Into<String>, expire_minutes: i64) -> Self {
        Self {
            secret: secret.into(),
            expire_minutes,
        }
    }

    /// Issue a token carrying `sub=username`, `exp=now+expire_minutes`
    /// (spec §4.6 item 2).
    pub fn issue(&self, username: &str) -> Result<String> {
        let claims = Claims {
            sub: username.to_string(),
            exp: (Utc::now() + Duration::minutes(self.expire_minutes)).timestamp(),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|err| Error::Internal(err.into()))
    }

    /// Decode a token, returning its `sub` claim. Decoding failures or a
    /// missing `sub` both surface as 401 (spec §4.6 item 2: "Decoding
    /// failures, missing `sub`, or unknown user all yield 401").
    pub fn subject(&self, token: &str) -> Result<String> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|_| Error::AccessDenied)?;
        Ok(data.claims.sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_tokens_decode_back_to_the_same_subject() {
        let issuer = JwtIssuer::new("secret", 30);
        let token = issuer.issue("alice").unwrap();
        assert_eq!(issuer.subject(&token).unwrap(), "alice");
    }

    #[test]
    fn tokens_signed_with_a_different_secret_are_rejected() {
        let issuer = JwtIssuer::new("secret", 30);
        let token = issuer.issue("alice").unwrap();

        let other = JwtIssuer::new("different-secret", 30);
        assert!(matches!(other.subject(&token), Err(Error::AccessDenied)));
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let issuer = JwtIssuer::new("secret", -1);
        let token = issuer.issue("alice").unwrap();
        assert!(matches!(issuer.subject(&token), Err(Error::AccessDenied)));
    }
}
