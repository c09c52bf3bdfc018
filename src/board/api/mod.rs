//! JSON API. Handlers are grouped by resource in the submodules; this module
//! owns the shared state, the error type and the route table.

mod analytics;
mod cards;
mod projects;
mod sprints;
mod users;

use std::sync::Arc;

use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};
use tokio::sync::{Notify, broadcast};

use super::db::DbHandle;
use super::notify::Mailer;
use super::ws::{WsMessage, broadcast_message};
use crate::config::BoardConfig;
use crate::errors::BoardError;

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub db: DbHandle,
    pub ws_tx: broadcast::Sender<String>,
    pub config: BoardConfig,
    pub mailer: Arc<dyn Mailer>,
    /// Wakes the JSON mirror after a mutation.
    pub dirty: Arc<Notify>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    /// Announce a mutation to WebSocket clients and the mirror.
    pub fn publish(&self, msg: WsMessage) {
        broadcast_message(&self.ws_tx, &msg);
        self.dirty.notify_one();
    }
}

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Unauthorized(String),
    Forbidden(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

impl From<BoardError> for ApiError {
    fn from(err: BoardError) -> Self {
        let msg = err.to_string();
        match err {
            BoardError::NotFound { .. } => ApiError::NotFound(msg),
            BoardError::Invalid(_) => ApiError::BadRequest(msg),
            BoardError::Conflict(_) | BoardError::InvalidTransition(_) => ApiError::Conflict(msg),
            BoardError::Unauthorized(_) => ApiError::Unauthorized(msg),
            BoardError::Forbidden(_) => ApiError::Forbidden(msg),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<BoardError>() {
            Ok(board) => board.into(),
            Err(other) => ApiError::Internal(format!("{:#}", other)),
        }
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/health", get(health_check))
        // Auth and profile
        .route("/api/auth/register", post(users::register))
        .route("/api/auth/login", post(users::login))
        .route("/api/auth/logout", post(users::logout))
        .route(
            "/api/auth/profile",
            get(users::get_profile).patch(users::update_profile),
        )
        // Projects and their views
        .route("/api/dashboard", get(projects::dashboard))
        .route("/api/backlog", get(projects::backlog))
        .route("/api/gantt", get(projects::gantt))
        .route(
            "/api/projects",
            get(projects::list_projects).post(projects::create_project),
        )
        .route(
            "/api/projects/{id}",
            get(projects::get_project).patch(projects::update_project),
        )
        .route("/api/projects/{id}/archive", post(projects::archive_project))
        .route("/api/projects/{id}/restore", post(projects::restore_project))
        .route("/api/projects/{id}/board", get(projects::get_board))
        .route("/api/projects/{id}/hierarchy", get(projects::get_hierarchy))
        .route(
            "/api/projects/{id}/mindmap",
            get(projects::get_mindmap).put(projects::save_mindmap),
        )
        // Epics and stories
        .route(
            "/api/epics",
            get(projects::list_epics).post(projects::create_epic),
        )
        .route(
            "/api/epics/{id}",
            get(projects::get_epic)
                .patch(projects::update_epic)
                .delete(projects::delete_epic),
        )
        .route("/api/epics/{id}/stories", get(projects::list_epic_stories))
        .route(
            "/api/stories",
            get(projects::list_stories).post(projects::create_story),
        )
        .route(
            "/api/stories/{id}",
            get(projects::get_story)
                .patch(projects::update_story)
                .delete(projects::delete_story),
        )
        // Cards, comments, notifications
        .route("/api/cards", get(cards::list_cards).post(cards::create_card))
        .route(
            "/api/cards/{id}",
            get(cards::get_card)
                .patch(cards::update_card)
                .delete(cards::delete_card),
        )
        .route("/api/cards/{id}/status", put(cards::set_status))
        .route("/api/cards/{id}/due-date", put(cards::set_due_date))
        .route("/api/cards/{id}/backlog", post(cards::move_to_backlog))
        .route("/api/cards/{id}/notify-assignee", post(cards::notify_assignee))
        .route(
            "/api/cards/{id}/comments",
            get(cards::list_comments).post(cards::add_comment),
        )
        .route("/api/notifications", get(cards::list_notifications))
        .route("/api/notifications/{id}/read", post(cards::mark_read))
        .route("/api/activity", get(cards::activity))
        .route("/api/search", get(cards::search))
        .route("/api/team", get(cards::team))
        .route("/api/labels", get(cards::labels))
        // Sprints
        .route(
            "/api/sprints",
            get(sprints::list_sprints).post(sprints::create_sprint),
        )
        .route(
            "/api/sprints/{id}",
            get(sprints::get_sprint)
                .patch(sprints::update_sprint)
                .delete(sprints::delete_sprint),
        )
        .route("/api/sprints/{id}/start", post(sprints::start_sprint))
        .route("/api/sprints/{id}/complete", post(sprints::complete_sprint))
        .route(
            "/api/sprints/{id}/items",
            get(sprints::list_items).post(sprints::add_items),
        )
        .route(
            "/api/sprints/{id}/items/{kind}/{item_id}",
            delete(sprints::remove_item),
        )
        // Analytics
        .route("/api/analytics/health", get(analytics::health))
        .route("/api/analytics/resources", get(analytics::resources))
        .route("/api/analytics/predictive", get(analytics::predictive))
        .route("/api/analytics/velocity", get(analytics::velocity))
        .route("/api/analytics/reports/{kind}", get(analytics::report))
        // Administration
        .route("/api/admin/users", get(users::admin_list_users))
        .route("/api/admin/users/{id}/status", put(users::admin_set_status))
        .route("/api/admin/users/{id}/role", put(users::admin_set_role))
        .route("/api/admin/users/bulk", post(users::admin_bulk))
        .route("/api/admin/notify-overdue", post(users::admin_notify_overdue))
}

async fn health_check() -> &'static str {
    "ok"
}


#[cfg(test)]
mod tests {
    use super::test_support::test_app;
    use super::*;

    #[tokio::test]
    async fn test_health_check() {
        let app = test_app();
        let (status, body) = app.send("GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn test_api_requires_token() {
        let app = test_app();
        let (status, body) = app.send("GET", "/api/projects", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Authentication required");

        let (status, _) = app
            .send("GET", "/api/projects", Some("not-a-token"), None)
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_board_error_mapping() {
        let cases: Vec<(anyhow::Error, StatusCode)> = vec![
            (BoardError::not_found("Card", 1).into(), StatusCode::NOT_FOUND),
            (BoardError::invalid("bad").into(), StatusCode::BAD_REQUEST),
            (
                BoardError::InvalidTransition("no".into()).into(),
                StatusCode::CONFLICT,
            ),
            (BoardError::conflict("dup").into(), StatusCode::CONFLICT),
            (BoardError::Forbidden("no".into()).into(), StatusCode::FORBIDDEN),
            (anyhow::anyhow!("disk on fire"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            let response = ApiError::from(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }

    #[test]
    fn test_context_wrapped_board_error_still_maps() {
        let err = anyhow::Error::from(BoardError::conflict("taken")).context("Failed to create user");
        assert!(matches!(ApiError::from(err), ApiError::Conflict(msg) if msg == "taken"));
    }
}
