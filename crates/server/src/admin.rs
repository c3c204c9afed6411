//! Admin-only user and backend management routes (spec §4.1, §6), grounded on
//! `examples/original_source/ollama_x/api/user.py` and
//! `examples/original_source/ollama_x/api/server.py`: the same CRUD shape,
//! `AdminUser`-gated, with `username`/`url`/`server_id`/`model` read as query
//! parameters the way FastAPI's undeclared-body handler arguments were.

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use futures::StreamExt;
use ollamax_core::{Backend, Error, User};
use ollamax_store::{filter, Repository};
use serde::Deserialize;
use serde_json::Value;

use crate::auth::AdminUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/user/.one", get(get_user))
        .route("/user/.all", get(get_all_users))
        .route("/user/.create", post(create_user))
        .route("/user", delete(delete_user))
        .route("/user/.reset_key", post(reset_key))
        .route("/user/.register", get(register_user))
        .route("/server/.one", get(get_server))
        .route("/server/.all", get(get_all_servers))
        .route("/server/.create", post(create_server))
        .route("/server/.update", put(update_server))
        .route("/server/.delete", delete(delete_server))
        .route("/server/:server_id/model.list", get(server_models))
        .route("/server/:server_id/model.pull", post(server_pull_model))
        .route("/server/:server_id/model.delete", delete(server_delete_model))
}

#[derive(Debug, Deserialize)]
struct UsernameQuery {
    username: String,
}

#[derive(Debug, Deserialize)]
struct CreateUserQuery {
    username: String,
    #[serde(default)]
    is_admin: bool,
}

async fn get_user(
    _admin: AdminUser,
    State(state): State<AppState>,
    Query(query): Query<UsernameQuery>,
) -> ApiResult<Json<User>> {
    let username = query.username;
    let user = state
        .users
        .find_one(filter(move |u: &User| u.username == username))
        .await?;
    Ok(Json(user))
}

async fn get_all_users(_admin: AdminUser, State(state): State<AppState>) -> ApiResult<Json<Vec<User>>> {
    let users = state.users.iterate(filter(|_: &User| true)).await?;
    Ok(Json(users))
}

async fn create_user(
    _admin: AdminUser,
    State(state): State<AppState>,
    Query(query): Query<CreateUserQuery>,
) -> ApiResult<Json<User>> {
    let user = User::new(query.username, None, query.is_admin)?;
    let created = state.users.insert(user).await?;
    Ok(Json(created))
}

async fn delete_user(
    _admin: AdminUser,
    State(state): State<AppState>,
    Query(query): Query<UsernameQuery>,
) -> ApiResult<Json<User>> {
    let username = query.username;
    let user = state
        .users
        .find_one(filter(move |u: &User| u.username == username))
        .await?;
    state.users.delete(&user.id).await?;
    Ok(Json(user))
}

async fn reset_key(
    _admin: AdminUser,
    State(state): State<AppState>,
    Query(query): Query<UsernameQuery>,
) -> ApiResult<Json<User>> {
    let username = query.username;
    let found = state
        .users
        .find_one(filter(move |u: &User| u.username == username))
        .await?;
    let new_key = User::generate_key();
    let user = state
        .users
        .update(
            &found.id,
            Box::new(move |u: &mut User| u.key = new_key.clone()),
        )
        .await?;
    Ok(Json(user))
}

#[derive(Debug, Deserialize)]
struct RegisterQuery {
    username: String,
}

/// `GET /user/.register`: public self-registration, gated on
/// `settings.user_registration_enabled` (spec §4.6, §7).
async fn register_user(
    State(state): State<AppState>,
    Query(query): Query<RegisterQuery>,
) -> ApiResult<Json<User>> {
    if !state.settings.read().user_registration_enabled {
        return Err(ApiError(Error::AccessDenied));
    }

    let username = query.username.clone();
    if state
        .users
        .find_one(filter(move |u: &User| u.username == username))
        .await
        .is_ok()
    {
        return Err(ApiError(Error::UserAlreadyExist));
    }

    let user = User::new(query.username, None, false)?;
    let created = state.users.insert(user).await?;
    Ok(Json(created))
}

#[derive(Debug, Deserialize)]
struct ServerIdQuery {
    server_id: String,
}

#[derive(Debug, Deserialize)]
struct CreateServerQuery {
    url: String,
}

async fn get_server(
    _admin: AdminUser,
    State(state): State<AppState>,
    Query(query): Query<ServerIdQuery>,
) -> ApiResult<Json<Backend>> {
    Ok(Json(state.registry.get(&query.server_id).await?))
}

async fn get_all_servers(_admin: AdminUser, State(state): State<AppState>) -> ApiResult<Json<Vec<Backend>>> {
    Ok(Json(state.registry.all().await?))
}

async fn create_server(
    _admin: AdminUser,
    State(state): State<AppState>,
    Query(query): Query<CreateServerQuery>,
) -> ApiResult<Json<Backend>> {
    let backend = state.registry.register(query.url.clone(), query.url).await?;
    state.scheduler.start_backend_job(backend.id.clone());
    Ok(Json(backend))
}

#[derive(Debug, Deserialize)]
struct UpdateServerQuery {
    server_id: String,
    server_url: Option<String>,
}

async fn update_server(
    _admin: AdminUser,
    State(state): State<AppState>,
    Query(query): Query<UpdateServerQuery>,
) -> ApiResult<Json<Backend>> {
    let server_id = query.server_id;
    let backend = state
        .backends
        .update(
            &server_id,
            Box::new(move |b: &mut Backend| {
                if let Some(url) = query.server_url {
                    b.base_url = url;
                }
            }),
        )
        .await?;
    Ok(Json(backend))
}

async fn delete_server(
    _admin: AdminUser,
    State(state): State<AppState>,
    Query(query): Query<ServerIdQuery>,
) -> ApiResult<Json<Backend>> {
    let backend = state.registry.get(&query.server_id).await?;
    state.registry.deregister(&backend.id).await?;
    state.scheduler.stop_backend_job(&backend.id);
    Ok(Json(backend))
}

async fn server_models(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(server_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let backend = state.registry.get(&server_id).await?;
    let client = state.registry.client_for(&backend);
    let tags = client
        .list_models()
        .await
        .map_err(|err| Error::Internal(anyhow::anyhow!(err)))?;
    Ok(Json(serde_json::to_value(tags).unwrap_or(Value::Null)))
}

#[derive(Debug, Deserialize)]
struct PullModelQuery {
    model: String,
    #[serde(default = "default_true")]
    stream: bool,
}

fn default_true() -> bool {
    true
}

/// `POST /server/{id}/model.pull`: streams the backend's own NDJSON pull
/// progress back verbatim when `stream=true` (the default), or collects the
/// final line into a single JSON object otherwise (spec §6).
async fn server_pull_model(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(server_id): Path<String>,
    Query(query): Query<PullModelQuery>,
) -> ApiResult<Response> {
    let backend = state.registry.get(&server_id).await?;
    let client = state.registry.client_for(&backend);
    let response = client
        .pull_model(&query.model)
        .await
        .map_err(|err| Error::Internal(anyhow::anyhow!(err)))?;

    if query.stream {
        let body_stream = response.bytes_stream().map(|chunk| chunk.map_err(std::io::Error::other));
        let mut out = Response::new(axum::body::Body::from_stream(body_stream));
        out.headers_mut().insert(
            axum::http::header::CONTENT_TYPE,
            "application/x-ndjson".parse().expect("static content-type"),
        );
        Ok(out)
    } else {
        let body = response
            .text()
            .await
            .map_err(|err| Error::Internal(anyhow::anyhow!(err)))?;
        let last_line = body.lines().last().unwrap_or_default();
        let value: Value = serde_json::from_str(last_line).unwrap_or(Value::Null);
        Ok(Json(value).into_response())
    }
}

#[derive(Debug, Deserialize)]
struct ModelQuery {
    model: String,
}

async fn server_delete_model(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(server_id): Path<String>,
    Query(query): Query<ModelQuery>,
) -> ApiResult<()> {
    let backend = state.registry.get(&server_id).await?;
    let client = state.registry.client_for(&backend);
    client
        .delete_model(&query.model)
        .await
        .map_err(|err| Error::Internal(anyhow::anyhow!(err)))?;
    Ok(())
}
