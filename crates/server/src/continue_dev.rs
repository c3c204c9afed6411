//! `continue.dev` IDE-plugin project routes (spec §4.3, §6), grounded on
//! `examples/original_source/ollama_x/api/continue_dev.py`'s
//! `list_projects`/`get_project`/`create_project`/`prepare_project` and
//! `examples/original_source/ollama_x/model/continue_dev.py`'s
//! `ContinueDevProject`. Spec §9 resolves the draft ambiguity between
//! `/continue-dev/` and `/continue/` in favor of the latter; join-by-invite
//! (spec §3, §8 scenario e) has no counterpart in the original draft.

use axum::extract::{Query, State};
use axum::http::header::HOST;
use axum::http::HeaderMap;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use ollamax_core::project::ProjectConfig;
use ollamax_core::{Error, Project, User};
use ollamax_store::{filter, Repository};
use serde::Deserialize;

use crate::auth::{AuthenticatedUser, ProjectBearer};
use crate::error::ApiResult;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/continue/.all", get(list_projects))
        .route("/continue/.one", get(get_project))
        .route("/continue/.create", post(create_project))
        .route("/continue/join", get(join_project))
        .route("/continue/sync", get(sync_project))
        .route("/continue/:project_name/edit", patch(edit_project))
}

fn gateway_base_url(headers: &HeaderMap) -> String {
    let host = headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    format!("http://{host}")
}

async fn list_projects(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<Project>>> {
    let user_id = user.id.clone();
    let projects = state
        .projects
        .iterate(filter(move |p: &Project| p.is_member(&user_id)))
        .await?;
    let base_url = gateway_base_url(&headers);
    let personalized = projects
        .into_iter()
        .map(|p| personalize(&p, &base_url, &user.key))
        .collect();
    Ok(Json(personalized))
}

#[derive(Debug, Deserialize)]
struct ProjectNameQuery {
    name: String,
}

async fn get_project(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    headers: HeaderMap,
    Query(query): Query<ProjectNameQuery>,
) -> ApiResult<Json<Project>> {
    let name = query.name;
    let project = state
        .projects
        .find_one(filter(move |p: &Project| p.name == name))
        .await?;
    let base_url = gateway_base_url(&headers);
    Ok(Json(personalize(&project, &base_url, &user.key)))
}

#[derive(Debug, Deserialize)]
struct CreateProjectRequest {
    name: String,
    #[serde(default)]
    config: ProjectConfig,
}

/// `POST /continue/.create`: the caller becomes the project's admin and
/// first member, mirroring the original's implicit `admin`/`users` fields --
/// here there is no separate `admin`/`users` input, since the original's
/// freeform `CreateProjectRequest` let the caller name an arbitrary admin,
/// which spec §4.6's project-authorization model does not allow.
async fn create_project(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    headers: HeaderMap,
    Json(request): Json<CreateProjectRequest>,
) -> ApiResult<Json<Project>> {
    let project = Project::new(user.username.clone(), request.name, request.config);
    let created = state.projects.insert(project).await?;
    let base_url = gateway_base_url(&headers);
    Ok(Json(personalize(&created, &base_url, &user.key)))
}

#[derive(Debug, Deserialize)]
struct JoinQuery {
    invite_id: String,
    user_key: String,
}

/// `GET /continue/join?invite_id=&user_key=` (spec §3, §8 scenario e): the
/// invited user is identified by their own key in the query string rather
/// than a bearer, since the invitee has no project membership yet to
/// authenticate with.
async fn join_project(State(state): State<AppState>, Query(query): Query<JoinQuery>) -> ApiResult<Json<Project>> {
    let key = query.user_key;
    let user = state
        .users
        .find_one(filter(move |u: &User| u.key == key))
        .await
        .map_err(|_| Error::AccessDenied)?;

    let invite_id = query.invite_id;
    let project = state
        .projects
        .find_one(filter(move |p: &Project| p.invite_id == invite_id))
        .await?;

    if project.is_member(&user.id) {
        return Err(Error::UserAlreadyInProject.into());
    }

    let user_id = user.id.clone();
    let updated = state
        .projects
        .update(&project.id, Box::new(move |p: &mut Project| { let _ = p.join(&user_id); }))
        .await?;

    Ok(Json(updated))
}

/// `GET /continue/sync`: the `user_key:project_id` bearer of spec §4.6,
/// returning the caller's personalized config the same way
/// `prepare_project` does for every list/get route.
async fn sync_project(State(state): State<AppState>, auth: ProjectBearer) -> ApiResult<Json<ProjectConfig>> {
    let base_url = gateway_sync_base(&state);
    Ok(Json(auth.project.personalize(&base_url, &auth.user.key)))
}

fn gateway_sync_base(state: &AppState) -> String {
    let settings = state.settings.read();
    format!("http://{}:{}", settings.server.host, settings.server.port)
}

#[derive(Debug, Deserialize)]
struct EditProjectRequest {
    config: ProjectConfig,
}

async fn edit_project(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    axum::extract::Path(project_name): axum::extract::Path<String>,
    Json(request): Json<EditProjectRequest>,
) -> ApiResult<Json<Project>> {
    let name = project_name.clone();
    let project = state
        .projects
        .find_one(filter(move |p: &Project| p.name == name))
        .await?;
    state.project_auth.require_project_admin(&user, &project)?;

    let updated = state
        .projects
        .update(
            &project.id,
            Box::new(move |p: &mut Project| p.config = request.config.clone()),
        )
        .await?;
    Ok(Json(updated))
}

fn personalize(project: &Project, base_url: &str, user_key: &str) -> Project {
    let mut personalized = project.clone();
    personalized.config = project.personalize(base_url, user_key);
    personalized
}
