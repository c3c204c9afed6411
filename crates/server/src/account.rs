//! `/api/user/.login` and `/api/user/me` (spec §4.6 item 2, §6), grounded on
//! `ollamax_identity::JwtIssuer` for token issuance/verification. The
//! original pack (`examples/original_source/ollama_x/api/user.py`) never
//! implements a login flow -- spec §9's "divergent drafts" note applies here
//! too, so this picks the one scheme spec §4.6 actually describes: an
//! OAuth2-password-style form trading a user's existing API key (presented
//! as the form `password`) for a short-lived JWT, rather than inventing a
//! separate password/hash field the data model (spec §3) does not have.

use axum::extract::{Form, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use ollamax_core::{Error, User};
use ollamax_store::{filter, Repository};
use serde::{Deserialize, Serialize};

use crate::auth::CurrentUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/user/.login", post(login))
        .route("/api/user/me", get(me))
}

/// OAuth2 password grant form fields (`username`, `password`), matching the
/// shape FastAPI's `OAuth2PasswordRequestForm` sends (spec §6: "OAuth2
/// password -> JWT"). `password` carries the user's API key.
#[derive(Debug, Deserialize)]
struct LoginForm {
    username: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct TokenResponse {
    access_token: String,
    token_type: &'static str,
}

async fn login(State(state): State<AppState>, Form(form): Form<LoginForm>) -> ApiResult<Json<TokenResponse>> {
    let username = form.username.clone();
    let user = state
        .users
        .find_one(filter(move |u: &User| u.username == username))
        .await
        .map_err(|_| Error::AccessDenied)?;

    if user.key != form.password || !user.is_active {
        return Err(ApiError(Error::AccessDenied));
    }

    let access_token = state.jwt.issue(&user.username)?;
    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer",
    }))
}

/// `GET /api/user/me`: the caller's own redacted profile, key included
/// since the caller is the key's own owner (spec §3 `UserBase.from_document`
/// semantics, carried into [`ollamax_core::user::User::profile`]).
async fn me(CurrentUser(user): CurrentUser) -> Json<ollamax_core::UserProfile> {
    Json(user.profile(true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ollamax_config::Settings;
    use ollamax_store::InMemoryRepository;
    use std::sync::Arc;

    async fn state_with_user(user: User) -> AppState {
        let users: Arc<dyn Repository<User>> = Arc::new(InMemoryRepository::new("user"));
        users.insert(user).await.unwrap();
        AppState::with_repositories(
            Settings::default(),
            users,
            Arc::new(InMemoryRepository::new("backend")),
            Arc::new(InMemoryRepository::new("model")),
            Arc::new(InMemoryRepository::new("session")),
            Arc::new(InMemoryRepository::new("project")),
            metrics_exporter_prometheus::PrometheusBuilder::new()
                .build()
                .expect("prometheus builder builds without a global install")
                .1,
        )
    }

    #[tokio::test]
    async fn login_with_correct_key_issues_a_token() {
        let user = User::new("alice-user", Some("alice-key".into()), false).unwrap();
        let state = state_with_user(user).await;

        let response = login(
            State(state.clone()),
            Form(LoginForm {
                username: "alice-user".to_string(),
                password: "alice-key".to_string(),
            }),
        )
        .await
        .unwrap();

        assert_eq!(state.jwt.subject(&response.0.access_token).unwrap(), "alice-user");
    }

    #[tokio::test]
    async fn login_with_wrong_key_is_denied() {
        let user = User::new("alice-user", Some("alice-key".into()), false).unwrap();
        let state = state_with_user(user).await;

        let result = login(
            State(state),
            Form(LoginForm {
                username: "alice-user".to_string(),
                password: "not-the-key".to_string(),
            }),
        )
        .await;

        assert!(matches!(result, Err(ApiError(Error::AccessDenied))));
    }
}
