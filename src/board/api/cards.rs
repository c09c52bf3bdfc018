use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use super::{ApiError, SharedState};
use crate::board::auth::CurrentUser;
use crate::board::models::{Card, CardFilter, CardUpdate, ItemStatus, NewCard, PREDEFINED_LABELS};
use crate::board::ws::WsMessage;
use crate::errors::BoardError;

#[derive(Deserialize)]
pub struct StatusRequest {
    pub status: ItemStatus,
}

#[derive(Deserialize)]
pub struct DueDateRequest {
    #[serde(default)]
    pub due_date: Option<String>,
}

#[derive(Deserialize)]
pub struct CommentRequest {
    pub content: String,
}

#[derive(Deserialize, Default)]
pub struct NotifyRequest {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

// ── Cards ─────────────────────────────────────────────────────────────

pub(super) async fn list_cards(
    State(state): State<SharedState>,
    _user: CurrentUser,
    Query(filter): Query<CardFilter>,
) -> Result<impl IntoResponse, ApiError> {
    let cards = state.db.call(move |db| db.list_cards(&filter)).await?;
    Ok(Json(cards))
}

pub(super) async fn create_card(
    State(state): State<SharedState>,
    CurrentUser { user, .. }: CurrentUser,
    Json(new): Json<NewCard>,
) -> Result<impl IntoResponse, ApiError> {
    let card = state
        .db
        .call(move |db| db.create_card(&new, &user.username))
        .await?;
    state.publish(WsMessage::CardCreated { card: card.clone() });
    Ok((StatusCode::CREATED, Json(card)))
}

pub(super) async fn get_card(
    State(state): State<SharedState>,
    _user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let card = state.db.call(move |db| db.require_card(id)).await?;
    Ok(Json(card))
}

pub(super) async fn update_card(
    State(state): State<SharedState>,
    CurrentUser { user, .. }: CurrentUser,
    Path(id): Path<i64>,
    Json(update): Json<CardUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    let card = state
        .db
        .call(move |db| db.update_card(id, &update, &user.username))
        .await?;
    state.publish(WsMessage::CardUpdated { card: card.clone() });
    Ok(Json(card))
}

pub(super) async fn delete_card(
    State(state): State<SharedState>,
    _user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.db.call(move |db| db.delete_card(id)).await? {
        return Err(BoardError::not_found("Card", id).into());
    }
    state.publish(WsMessage::CardDeleted { card_id: id });
    Ok(StatusCode::NO_CONTENT)
}

async fn move_card(
    state: &SharedState,
    username: String,
    id: i64,
    to: ItemStatus,
) -> Result<Json<Card>, ApiError> {
    let (from, card) = state
        .db
        .call(move |db| {
            let from = db.require_card(id)?.status;
            Ok((from, db.set_card_status(id, to, &username)?))
        })
        .await?;
    state.publish(WsMessage::CardMoved {
        card_id: id,
        from_status: from,
        to_status: to,
    });
    Ok(Json(card))
}

pub(super) async fn set_status(
    State(state): State<SharedState>,
    CurrentUser { user, .. }: CurrentUser,
    Path(id): Path<i64>,
    Json(req): Json<StatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    move_card(&state, user.username, id, req.status).await
}

pub(super) async fn move_to_backlog(
    State(state): State<SharedState>,
    CurrentUser { user, .. }: CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    move_card(&state, user.username, id, ItemStatus::Todo).await
}

pub(super) async fn set_due_date(
    State(state): State<SharedState>,
    CurrentUser { user, .. }: CurrentUser,
    Path(id): Path<i64>,
    Json(req): Json<DueDateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let card = state
        .db
        .call(move |db| db.set_card_due_date(id, req.due_date.as_deref(), &user.username))
        .await?;
    state.publish(WsMessage::CardUpdated { card: card.clone() });
    Ok(Json(card))
}

pub(super) async fn notify_assignee(
    State(state): State<SharedState>,
    CurrentUser { user, .. }: CurrentUser,
    Path(id): Path<i64>,
    body: Option<Json<NotifyRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let note = body.and_then(|Json(b)| b.message);
    let notification = state
        .db
        .call(move |db| db.notify_assignee(id, &user.username, note.as_deref()))
        .await?;
    state.publish(WsMessage::NotificationCreated {
        notification: notification.clone(),
    });
    Ok((StatusCode::CREATED, Json(notification)))
}

// ── Comments ──────────────────────────────────────────────────────────

pub(super) async fn list_comments(
    State(state): State<SharedState>,
    _user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let comments = state
        .db
        .call(move |db| {
            db.require_card(id)?;
            db.list_comments(id)
        })
        .await?;
    Ok(Json(comments))
}

pub(super) async fn add_comment(
    State(state): State<SharedState>,
    CurrentUser { user, .. }: CurrentUser,
    Path(id): Path<i64>,
    Json(req): Json<CommentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (comment, notifications) = state
        .db
        .call(move |db| db.add_comment(id, &user.username, &req.content))
        .await?;
    tracing::debug!(card_id = id, mentions = notifications.len(), "Comment added");
    state.publish(WsMessage::CommentAdded {
        comment: comment.clone(),
    });
    for notification in notifications {
        state.publish(WsMessage::NotificationCreated { notification });
    }
    Ok((StatusCode::CREATED, Json(comment)))
}

// ── Notifications ─────────────────────────────────────────────────────

pub(super) async fn list_notifications(
    State(state): State<SharedState>,
    CurrentUser { user, .. }: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let notifications = state
        .db
        .call(move |db| db.list_notifications(user.id))
        .await?;
    Ok(Json(notifications))
}

pub(super) async fn mark_read(
    State(state): State<SharedState>,
    CurrentUser { user, .. }: CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .db
        .call(move |db| db.mark_notification_read(id, user.id))
        .await?;
    state.dirty.notify_one();
    Ok(StatusCode::NO_CONTENT)
}

// ── Feeds ─────────────────────────────────────────────────────────────

pub(super) async fn activity(
    State(state): State<SharedState>,
    _user: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let feed = state.db.call(|db| db.activity()).await?;
    Ok(Json(feed))
}

pub(super) async fn search(
    State(state): State<SharedState>,
    _user: CurrentUser,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let hits = state.db.call(move |db| db.search(&query.q)).await?;
    Ok(Json(hits))
}

pub(super) async fn team(
    State(state): State<SharedState>,
    _user: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let members = state.db.call(|db| db.team_members()).await?;
    Ok(Json(members))
}

pub(super) async fn labels(_user: CurrentUser) -> impl IntoResponse {
    Json(PREDEFINED_LABELS)
}
