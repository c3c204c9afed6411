//! Axum extractors for the three auth schemes of spec §4.6, grounded on the
//! teacher's `auth_middleware` (`crates/server/src/auth.rs`) -- here
//! expressed as `FromRequestParts` impls instead of a `Next`-based
//! middleware, since each route needs a different scheme (plain bearer,
//! admin bearer, or the `user_key:project_id` project bearer) rather than
//! one blanket gate in front of the whole router.

use std::net::SocketAddr;

use async_trait::async_trait;
use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use ollamax_core::{Error, Project, User};

use crate::error::ApiError;
use crate::state::AppState;

/// Pull the bearer credential out of `Authorization: Bearer <token>`,
/// denying anything else (spec §4.6: "missing/invalid credential" is
/// `AccessDenied`).
fn bearer_credential(parts: &Parts) -> Result<&str, Error> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(Error::AccessDenied)
}

/// The authenticated caller of an inference or config-read endpoint (spec
/// §4.6 item 1): a real user found by key, or a transient guest.
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let credential = bearer_credential(parts)?;
        let user = state.bearer_auth.authenticate(credential).await?;
        Ok(CurrentUser(user))
    }
}

/// An authenticated, non-guest caller (spec §4.6: guests may read inference
/// endpoints but not the `/api/user/me` profile or project-admin routes).
pub struct AuthenticatedUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        if user.is_guest() {
            return Err(ApiError(Error::AccessDenied));
        }
        Ok(AuthenticatedUser(user))
    }
}

/// The caller of an admin-only endpoint (spec §4.6 item 3), including the
/// local-admin bootstrap: the peer's socket address decides locality, so
/// `main.rs` must serve with `into_make_service_with_connect_info`.
pub struct AdminUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let credential = bearer_credential(parts)?;
        let ConnectInfo(addr) = parts
            .extract::<ConnectInfo<SocketAddr>>()
            .await
            .map_err(|_| ApiError(Error::Internal(anyhow::anyhow!("missing ConnectInfo extension"))))?;

        let user = state
            .bearer_auth
            .authenticate_admin(credential, AppState::is_local_peer(addr))
            .await?;
        Ok(AdminUser(user))
    }
}

/// The `user_key:project_id` bearer used by the code-assistant config sync
/// (spec §4.6 "Project authorization").
pub struct ProjectBearer {
    pub user: User,
    pub project: Project,
}

#[async_trait]
impl FromRequestParts<AppState> for ProjectBearer {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let credential = bearer_credential(parts)?;
        let (user, project) = state.project_auth.authenticate(credential).await?;
        Ok(ProjectBearer { user, project })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, Request};

    fn parts_with_bearer(token: &str) -> Parts {
        let request = Request::builder()
            .header(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {token}")).unwrap())
            .body(())
            .unwrap();
        request.into_parts().0
    }

    #[test]
    fn bearer_credential_strips_the_scheme() {
        let parts = parts_with_bearer("secret-key");
        assert_eq!(bearer_credential(&parts).unwrap(), "secret-key");
    }

    #[test]
    fn missing_header_is_access_denied() {
        let request = Request::builder().body(()).unwrap();
        let parts = request.into_parts().0;
        assert!(matches!(bearer_credential(&parts), Err(Error::AccessDenied)));
    }
}
