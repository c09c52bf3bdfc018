use std::str::FromStr;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use super::{ApiError, SharedState};
use crate::board::auth::CurrentUser;
use crate::board::models::{NewSprint, Sprint, SprintItemKind, SprintItemsRequest, SprintUpdate};
use crate::board::ws::WsMessage;

#[derive(Deserialize, Default)]
pub struct SprintQuery {
    pub project_id: Option<i64>,
}

fn announce(state: &SharedState, sprint: &Sprint) {
    state.publish(WsMessage::SprintUpdated {
        sprint: sprint.clone(),
    });
}

pub(super) async fn list_sprints(
    State(state): State<SharedState>,
    _user: CurrentUser,
    Query(query): Query<SprintQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let sprints = state
        .db
        .call(move |db| db.list_sprints(query.project_id))
        .await?;
    Ok(Json(sprints))
}

pub(super) async fn create_sprint(
    State(state): State<SharedState>,
    CurrentUser { user, .. }: CurrentUser,
    Json(new): Json<NewSprint>,
) -> Result<impl IntoResponse, ApiError> {
    let sprint = state
        .db
        .call(move |db| db.create_sprint(&new, &user.username))
        .await?;
    state.publish(WsMessage::SprintCreated {
        sprint: sprint.clone(),
    });
    Ok((StatusCode::CREATED, Json(sprint)))
}

pub(super) async fn get_sprint(
    State(state): State<SharedState>,
    _user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let sprint = state.db.call(move |db| db.require_sprint(id)).await?;
    Ok(Json(sprint))
}

pub(super) async fn update_sprint(
    State(state): State<SharedState>,
    _user: CurrentUser,
    Path(id): Path<i64>,
    Json(update): Json<SprintUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    let sprint = state
        .db
        .call(move |db| db.update_sprint(id, &update))
        .await?;
    announce(&state, &sprint);
    Ok(Json(sprint))
}

pub(super) async fn delete_sprint(
    State(state): State<SharedState>,
    _user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    state.db.call(move |db| db.delete_sprint(id)).await?;
    state.publish(WsMessage::SprintDeleted { sprint_id: id });
    Ok(StatusCode::NO_CONTENT)
}

pub(super) async fn start_sprint(
    State(state): State<SharedState>,
    _user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let sprint = state.db.call(move |db| db.start_sprint(id)).await?;
    tracing::info!(sprint_id = id, project_id = sprint.project_id, "Sprint started");
    announce(&state, &sprint);
    Ok(Json(sprint))
}

pub(super) async fn complete_sprint(
    State(state): State<SharedState>,
    _user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let sprint = state.db.call(move |db| db.complete_sprint(id)).await?;
    tracing::info!(sprint_id = id, project_id = sprint.project_id, "Sprint completed");
    announce(&state, &sprint);
    Ok(Json(sprint))
}

pub(super) async fn list_items(
    State(state): State<SharedState>,
    _user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let items = state
        .db
        .call(move |db| db.sprint_item_details(id))
        .await?;
    Ok(Json(items))
}

pub(super) async fn add_items(
    State(state): State<SharedState>,
    CurrentUser { user, .. }: CurrentUser,
    Path(id): Path<i64>,
    Json(req): Json<SprintItemsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let sprint = state
        .db
        .call(move |db| db.add_sprint_items(id, &req, &user.username))
        .await?;
    announce(&state, &sprint);
    Ok(Json(sprint))
}

pub(super) async fn remove_item(
    State(state): State<SharedState>,
    _user: CurrentUser,
    Path((id, kind, item_id)): Path<(i64, String, i64)>,
) -> Result<impl IntoResponse, ApiError> {
    let kind = SprintItemKind::from_str(&kind).map_err(ApiError::BadRequest)?;
    let sprint = state
        .db
        .call(move |db| db.remove_sprint_item(id, kind, item_id))
        .await?;
    announce(&state, &sprint);
    Ok(Json(sprint))
}
