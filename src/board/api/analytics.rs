use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use chrono::Local;

use super::{ApiError, SharedState};
use crate::board::analytics::{self, BoardData, ReportKind};
use crate::board::auth::CurrentUser;

async fn load(state: &SharedState) -> Result<BoardData, ApiError> {
    Ok(state.db.call(BoardData::load).await?)
}

pub(super) async fn health(
    State(state): State<SharedState>,
    _user: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let data = load(&state).await?;
    let today = Local::now().date_naive();
    Ok(Json(analytics::project_health(&data, today)))
}

pub(super) async fn resources(
    State(state): State<SharedState>,
    _user: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let data = load(&state).await?;
    let today = Local::now().date_naive();
    Ok(Json(analytics::resource_utilization(&data, today)))
}

pub(super) async fn predictive(
    State(state): State<SharedState>,
    _user: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let data = load(&state).await?;
    let today = Local::now().date_naive();
    let health = analytics::project_health(&data, today);
    Ok(Json(analytics::predictive(&health, today)))
}

pub(super) async fn velocity(
    State(state): State<SharedState>,
    _user: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let data = load(&state).await?;
    Ok(Json(analytics::velocity(&data, Local::now().date_naive())))
}

pub(super) async fn report(
    State(state): State<SharedState>,
    _user: CurrentUser,
    Path(kind): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let kind: ReportKind = kind.parse().map_err(ApiError::BadRequest)?;
    let data = load(&state).await?;
    Ok(Json(analytics::report(kind, &data, Local::now().naive_local())))
}
