//! Error taxonomy shared by every crate in the gateway (spec §7).
//!
//! `Error` carries no HTTP awareness; `crates/server` maps each variant to a
//! status code and a `{"detail":{"code","message"}}` body, the way the
//! teacher's `ServerError` maps to `axum::http::StatusCode` in
//! `crates/server/src/lib.rs`.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("access denied")]
    AccessDenied,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    #[error("user already exists")]
    UserAlreadyExist,

    #[error("user already in project")]
    UserAlreadyInProject,

    #[error("no server available")]
    NoServerAvailable,

    #[error("internal error")]
    Internal(#[source] anyhow::Error),
}

impl Error {
    /// Machine-readable error code, used as `detail.code` in API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Error::AccessDenied => "AccessDenied",
            Error::NotFound(_) => "NotFound",
            Error::Validation(_) => "Validation",
            Error::DuplicateKey(_) => "DuplicateKey",
            Error::UserAlreadyExist => "UserAlreadyExist",
            Error::UserAlreadyInProject => "UserAlreadyInProject",
            Error::NoServerAvailable => "NoServerAvailable",
            Error::Internal(_) => "InternalError",
        }
    }

    /// The message shown to the client. Internal errors never leak their
    /// source text (spec §7: "never leaks raw exception text").
    pub fn public_message(&self) -> String {
        match self {
            Error::Internal(_) => "Internal error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Internal(err)
    }
}
