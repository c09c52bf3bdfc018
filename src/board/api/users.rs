use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Local;
use serde::Deserialize;

use super::{ApiError, SharedState};
use crate::board::auth::{self, AdminUser, CurrentUser, LoginRequest, RegisterRequest};
use crate::board::models::{BulkAction, Role, User, UserFilter, UserStatus};
use crate::board::notify::{deliver, registration_mail, send_overdue_digest, status_change_mail};
use crate::board::ws::WsMessage;

// ── Auth ─────────────────────────────────────────────────────────────

pub(super) async fn register(
    State(state): State<SharedState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let cost = state.config.auth.bcrypt_cost;
    // bcrypt is slow on purpose; keep it off the async workers.
    let new = tokio::task::spawn_blocking(move || req.into_new_user(cost))
        .await
        .map_err(|e| ApiError::Internal(format!("Hashing task failed: {}", e)))??;

    let (user, admins) = state
        .db
        .call(move |db| {
            let user = db.create_user(&new)?;
            let admins = db.list_users(&UserFilter {
                role: Some(Role::Admin),
                ..Default::default()
            })?;
            Ok((user, admins))
        })
        .await?;
    tracing::info!(username = %user.username, "User registered, awaiting approval");

    let base_url = &state.config.notifications.base_url;
    for admin in admins.iter().filter(|a| a.status == UserStatus::Active) {
        if let Some(email) = admin.email.as_deref().filter(|e| !e.is_empty()) {
            deliver(state.mailer.as_ref(), registration_mail(email, &user, base_url)).await;
        }
    }
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "user": user,
            "message": "Registration successful. Your account is pending admin approval."
        })),
    ))
}

pub(super) async fn login(
    State(state): State<SharedState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let ttl = state.config.auth.session_ttl_hours;
    let session = auth::login(&state.db, req, ttl).await?;
    tracing::info!(username = %session.user.username, "User logged in");
    Ok(Json(session))
}

pub(super) async fn logout(
    State(state): State<SharedState>,
    CurrentUser { token, .. }: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    state.db.call(move |db| db.delete_session(&token)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(super) async fn get_profile(CurrentUser { user, .. }: CurrentUser) -> Json<User> {
    Json(user)
}

#[derive(Deserialize)]
pub struct ProfileUpdate {
    pub email: Option<String>,
    pub email_notifications: Option<bool>,
}

pub(super) async fn update_profile(
    State(state): State<SharedState>,
    CurrentUser { user, .. }: CurrentUser,
    Json(update): Json<ProfileUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .db
        .call(move |db| {
            db.update_profile(user.id, update.email.as_deref(), update.email_notifications)
        })
        .await?;
    Ok(Json(user))
}

// ── Administration ───────────────────────────────────────────────────

pub(super) async fn admin_list_users(
    State(state): State<SharedState>,
    _admin: AdminUser,
    Query(filter): Query<UserFilter>,
) -> Result<impl IntoResponse, ApiError> {
    let (users, stats) = state
        .db
        .call(move |db| Ok((db.list_users(&filter)?, db.user_stats()?)))
        .await?;
    Ok(Json(serde_json::json!({ "users": users, "stats": stats })))
}

#[derive(Deserialize)]
pub struct StatusRequest {
    pub status: UserStatus,
}

/// Announce a status change: mail the user and drop their sessions when
/// they can no longer log in.
async fn after_status_change(state: &SharedState, user: &User) -> Result<(), ApiError> {
    if user.status != UserStatus::Active {
        let id = user.id;
        let dropped = state.db.call(move |db| db.delete_user_sessions(id)).await?;
        tracing::debug!(user_id = id, sessions = dropped, "Revoked sessions");
    }
    if let Some(mail) = status_change_mail(user, &state.config.notifications.base_url) {
        deliver(state.mailer.as_ref(), mail).await;
    }
    state.publish(WsMessage::UserUpdated { user: user.clone() });
    Ok(())
}

pub(super) async fn admin_set_status(
    State(state): State<SharedState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<i64>,
    Json(req): Json<StatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if id == admin.id && req.status != UserStatus::Active {
        return Err(ApiError::BadRequest(
            "You cannot deactivate your own account".to_string(),
        ));
    }
    let (user, previous) = state
        .db
        .call(move |db| db.update_user_status(id, req.status))
        .await?;
    if previous != user.status {
        tracing::info!(
            admin = %admin.username,
            user = %user.username,
            from = previous.as_str(),
            to = user.status.as_str(),
            "User status changed"
        );
        after_status_change(&state, &user).await?;
    }
    Ok(Json(user))
}

#[derive(Deserialize)]
pub struct RoleRequest {
    pub role: Role,
}

pub(super) async fn admin_set_role(
    State(state): State<SharedState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<i64>,
    Json(req): Json<RoleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if id == admin.id && req.role != Role::Admin {
        return Err(ApiError::BadRequest(
            "You cannot remove your own admin role".to_string(),
        ));
    }
    let user = state
        .db
        .call(move |db| db.update_user_role(id, req.role))
        .await?;
    tracing::info!(admin = %admin.username, user = %user.username, role = user.role.as_str(), "User role changed");
    state.publish(WsMessage::UserUpdated { user: user.clone() });
    Ok(Json(user))
}

#[derive(Deserialize)]
pub struct BulkRequest {
    pub action: BulkAction,
    pub user_ids: Vec<i64>,
}

pub(super) async fn admin_bulk(
    State(state): State<SharedState>,
    AdminUser(admin): AdminUser,
    Json(req): Json<BulkRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let status = req.action.target_status();
    // The acting admin is never swept up in their own bulk action.
    let ids: Vec<i64> = req.user_ids.into_iter().filter(|&id| id != admin.id).collect();
    let changed = state
        .db
        .call(move |db| db.bulk_update_status(&ids, status))
        .await?;
    tracing::info!(
        admin = %admin.username,
        status = status.as_str(),
        updated = changed.len(),
        "Bulk user update"
    );
    for user in &changed {
        after_status_change(&state, user).await?;
    }
    Ok(Json(serde_json::json!({
        "updated": changed.len(),
        "users": changed,
    })))
}

pub(super) async fn admin_notify_overdue(
    State(state): State<SharedState>,
    _admin: AdminUser,
) -> Result<impl IntoResponse, ApiError> {
    let report = send_overdue_digest(
        &state.db,
        state.mailer.as_ref(),
        &state.config.notifications.base_url,
        Local::now().naive_local(),
    )
    .await?;
    Ok(Json(report))
}
