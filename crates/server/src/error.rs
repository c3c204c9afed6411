//! Maps [`ollamax_core::Error`] onto HTTP status codes and the
//! `{"detail":{"code","message"}}` response body (spec §7), the way the
//! teacher's `ServerError` maps to `axum::http::StatusCode` in
//! `crates/server/src/lib.rs`. Handlers return `ApiError` (via `?` on
//! `ollamax_core::Result`) instead of matching on `Error` themselves.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use ollamax_core::Error;

pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::AccessDenied => StatusCode::FORBIDDEN,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::DuplicateKey(_) => StatusCode::BAD_REQUEST,
            Error::UserAlreadyExist => StatusCode::BAD_REQUEST,
            Error::UserAlreadyInProject => StatusCode::BAD_REQUEST,
            Error::NoServerAvailable => StatusCode::SERVICE_UNAVAILABLE,
            Error::Internal(err) => {
                tracing::error!(error = %err, "internal error");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(serde_json::json!({
            "detail": {
                "code": self.0.code(),
                "message": self.0.public_message(),
            }
        }));

        (status, body).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn no_server_available_maps_to_503() {
        let response = ApiError(Error::NoServerAvailable).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["detail"]["code"], "NoServerAvailable");
    }

    #[tokio::test]
    async fn internal_errors_never_leak_their_source_text() {
        let response = ApiError(Error::Internal(anyhow::anyhow!("connection string leaked here"))).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["detail"]["message"], "Internal error");
        assert!(!body_contains(&body, "connection string"));
    }

    fn body_contains(body: &[u8], needle: &str) -> bool {
        String::from_utf8_lossy(body).contains(needle)
    }
}
