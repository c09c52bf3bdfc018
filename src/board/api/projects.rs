use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use super::{ApiError, SharedState};
use crate::board::analytics::{self, BoardData};
use crate::board::auth::CurrentUser;
use crate::board::dates;
use crate::board::db::{ItemUpdate, ProjectUpdate};
use crate::board::models::Project;
use crate::board::ws::WsMessage;
use crate::errors::BoardError;

#[derive(Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Deserialize, Default)]
pub struct ProjectQuery {
    pub archived: Option<bool>,
}

#[derive(Deserialize)]
pub struct CreateEpicRequest {
    pub project_id: i64,
    #[serde(alias = "name")]
    pub title: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Deserialize)]
pub struct CreateStoryRequest {
    pub epic_id: Option<i64>,
    pub project_id: Option<i64>,
    #[serde(alias = "name")]
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub story_points: Option<i64>,
}

#[derive(Deserialize, Default)]
pub struct ItemQuery {
    pub project_id: Option<i64>,
    pub epic_id: Option<i64>,
}

#[derive(Deserialize)]
pub struct MindMapRequest {
    #[serde(default = "empty_array")]
    pub nodes: serde_json::Value,
    #[serde(default = "empty_array")]
    pub connections: serde_json::Value,
}

fn empty_array() -> serde_json::Value {
    serde_json::Value::Array(Vec::new())
}

// ── Projects ──────────────────────────────────────────────────────────

pub(super) async fn dashboard(
    State(state): State<SharedState>,
    _user: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let dashboard = state.db.call(|db| db.dashboard()).await?;
    Ok(Json(dashboard))
}

pub(super) async fn backlog(
    State(state): State<SharedState>,
    _user: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let today = dates::today();
    let cards = state.db.call(move |db| db.backlog(today)).await?;
    Ok(Json(cards))
}

pub(super) async fn gantt(
    State(state): State<SharedState>,
    _user: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let data = state.db.call(BoardData::load).await?;
    Ok(Json(analytics::gantt(&data)))
}

pub(super) async fn list_projects(
    State(state): State<SharedState>,
    _user: CurrentUser,
    Query(query): Query<ProjectQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let projects = state
        .db
        .call(move |db| db.list_projects(query.archived))
        .await?;
    Ok(Json(projects))
}

pub(super) async fn create_project(
    State(state): State<SharedState>,
    CurrentUser { user, .. }: CurrentUser,
    Json(req): Json<CreateProjectRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let project = state
        .db
        .call(move |db| db.create_project(&req.name, &req.description, Some(&user.username)))
        .await?;
    state.publish(WsMessage::ProjectCreated {
        project: project.clone(),
    });
    Ok((StatusCode::CREATED, Json(project)))
}

pub(super) async fn get_project(
    State(state): State<SharedState>,
    _user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let project = state.db.call(move |db| db.require_project(id)).await?;
    Ok(Json(project))
}

pub(super) async fn update_project(
    State(state): State<SharedState>,
    _user: CurrentUser,
    Path(id): Path<i64>,
    Json(update): Json<ProjectUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    let project = state
        .db
        .call(move |db| db.update_project(id, &update))
        .await?;
    state.publish(WsMessage::ProjectUpdated {
        project: project.clone(),
    });
    Ok(Json(project))
}

async fn set_archived(
    state: SharedState,
    user: CurrentUser,
    id: i64,
    archived: bool,
) -> Result<Json<Project>, ApiError> {
    let by = user.user.username;
    let project = state
        .db
        .call(move |db| db.set_project_archived(id, archived, &by))
        .await?;
    tracing::info!(project_id = id, archived, "Project archive flag changed");
    state.publish(WsMessage::ProjectUpdated {
        project: project.clone(),
    });
    Ok(Json(project))
}

pub(super) async fn archive_project(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    set_archived(state, user, id, true).await
}

pub(super) async fn restore_project(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    set_archived(state, user, id, false).await
}

pub(super) async fn get_board(
    State(state): State<SharedState>,
    _user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let today = dates::today();
    let board = state.db.call(move |db| db.board(id, today)).await?;
    Ok(Json(board))
}

pub(super) async fn get_hierarchy(
    State(state): State<SharedState>,
    _user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let tree = state.db.call(move |db| db.hierarchy(id)).await?;
    Ok(Json(tree))
}

pub(super) async fn get_mindmap(
    State(state): State<SharedState>,
    _user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let map = state
        .db
        .call(move |db| {
            db.require_project(id)?;
            db.load_mindmap(id)
        })
        .await?;
    Ok(Json(map))
}

pub(super) async fn save_mindmap(
    State(state): State<SharedState>,
    _user: CurrentUser,
    Path(id): Path<i64>,
    Json(req): Json<MindMapRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !req.nodes.is_array() || !req.connections.is_array() {
        return Err(ApiError::BadRequest(
            "nodes and connections must be arrays".to_string(),
        ));
    }
    let map = state
        .db
        .call(move |db| {
            db.require_project(id)?;
            db.save_mindmap(id, &req.nodes, &req.connections)
        })
        .await?;
    state.publish(WsMessage::MindMapSaved { project_id: id });
    Ok(Json(map))
}

// ── Epics ─────────────────────────────────────────────────────────────

pub(super) async fn list_epics(
    State(state): State<SharedState>,
    _user: CurrentUser,
    Query(query): Query<ItemQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let epics = state
        .db
        .call(move |db| db.list_epics(query.project_id))
        .await?;
    Ok(Json(epics))
}

pub(super) async fn create_epic(
    State(state): State<SharedState>,
    CurrentUser { user, .. }: CurrentUser,
    Json(req): Json<CreateEpicRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let epic = state
        .db
        .call(move |db| {
            db.create_epic(
                req.project_id,
                &req.title,
                &req.description,
                Some(&user.username),
            )
        })
        .await?;
    state.publish(WsMessage::EpicCreated { epic: epic.clone() });
    Ok((StatusCode::CREATED, Json(epic)))
}

pub(super) async fn get_epic(
    State(state): State<SharedState>,
    _user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let epic = state.db.call(move |db| db.get_epic(id)).await?;
    epic.map(Json)
        .ok_or_else(|| BoardError::not_found("Epic", id).into())
}

pub(super) async fn update_epic(
    State(state): State<SharedState>,
    _user: CurrentUser,
    Path(id): Path<i64>,
    Json(update): Json<ItemUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    let epic = state.db.call(move |db| db.update_epic(id, &update)).await?;
    state.publish(WsMessage::EpicUpdated { epic: epic.clone() });
    Ok(Json(epic))
}

pub(super) async fn delete_epic(
    State(state): State<SharedState>,
    _user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.db.call(move |db| db.delete_epic(id)).await? {
        return Err(BoardError::not_found("Epic", id).into());
    }
    state.publish(WsMessage::EpicDeleted { epic_id: id });
    Ok(StatusCode::NO_CONTENT)
}

pub(super) async fn list_epic_stories(
    State(state): State<SharedState>,
    _user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let stories = state
        .db
        .call(move |db| {
            db.get_epic(id)?.ok_or(BoardError::not_found("Epic", id))?;
            db.list_stories(None, Some(id))
        })
        .await?;
    Ok(Json(stories))
}

// ── Stories ───────────────────────────────────────────────────────────

pub(super) async fn list_stories(
    State(state): State<SharedState>,
    _user: CurrentUser,
    Query(query): Query<ItemQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let stories = state
        .db
        .call(move |db| db.list_stories(query.project_id, query.epic_id))
        .await?;
    Ok(Json(stories))
}

pub(super) async fn create_story(
    State(state): State<SharedState>,
    CurrentUser { user, .. }: CurrentUser,
    Json(req): Json<CreateStoryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let story = state
        .db
        .call(move |db| {
            db.create_story(
                req.epic_id,
                req.project_id,
                &req.title,
                &req.description,
                req.story_points,
                Some(&user.username),
            )
        })
        .await?;
    state.publish(WsMessage::StoryCreated {
        story: story.clone(),
    });
    Ok((StatusCode::CREATED, Json(story)))
}

pub(super) async fn get_story(
    State(state): State<SharedState>,
    _user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let story = state.db.call(move |db| db.get_story(id)).await?;
    story
        .map(Json)
        .ok_or_else(|| BoardError::not_found("Story", id).into())
}

pub(super) async fn update_story(
    State(state): State<SharedState>,
    _user: CurrentUser,
    Path(id): Path<i64>,
    Json(update): Json<ItemUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    let story = state.db.call(move |db| db.update_story(id, &update)).await?;
    state.publish(WsMessage::StoryUpdated {
        story: story.clone(),
    });
    Ok(Json(story))
}

pub(super) async fn delete_story(
    State(state): State<SharedState>,
    _user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.db.call(move |db| db.delete_story(id)).await? {
        return Err(BoardError::not_found("Story", id).into());
    }
    state.publish(WsMessage::StoryDeleted { story_id: id });
    Ok(StatusCode::NO_CONTENT)
}
