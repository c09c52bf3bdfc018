//! Password hashing, registration rules, login and bearer-token sessions.

use anyhow::{Context, Result};
use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use super::api::{ApiError, SharedState};
use super::dates::TIMESTAMP_FORMAT;
use super::db::{BoardDb, DbHandle, NewUser};
use super::models::{Role, User, UserStatus};
use crate::errors::BoardError;

pub const MIN_PASSWORD_LEN: usize = 6;
const INVALID_CREDENTIALS: &str = "Invalid username or password";

pub fn hash_password(password: &str, cost: u32) -> Result<String> {
    bcrypt::hash(password, cost).context("Failed to hash password")
}

/// Unknown or malformed hashes never verify.
pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    pub password: String,
    pub confirm_password: String,
}

impl RegisterRequest {
    pub fn validate(&self) -> Result<(), BoardError> {
        if self.username.trim().is_empty() {
            return Err(BoardError::invalid("Username is required"));
        }
        if self.password != self.confirm_password {
            return Err(BoardError::invalid("Passwords do not match"));
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(BoardError::invalid(format!(
                "Password must be at least {} characters long",
                MIN_PASSWORD_LEN
            )));
        }
        Ok(())
    }

    /// A pending account awaiting admin approval.
    pub fn into_new_user(self, cost: u32) -> Result<NewUser> {
        self.validate()?;
        let trimmed = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        Ok(NewUser {
            password_hash: hash_password(&self.password, cost)?,
            username: self.username.trim().to_string(),
            email: trimmed(self.email),
            display_name: trimmed(self.display_name),
            role: Role::User,
            status: UserStatus::Pending,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub token: String,
    pub expires_at: String,
    pub user: User,
}

fn now_stamp() -> String {
    Utc::now().naive_utc().format(TIMESTAMP_FORMAT).to_string()
}

/// Check credentials and open a session valid for `ttl_hours`.
///
/// The bcrypt check runs on the blocking pool between two short database
/// calls, so the connection lock is never held while hashing.
pub async fn login(db: &DbHandle, req: LoginRequest, ttl_hours: i64) -> Result<Session> {
    let username = req.username.trim().to_string();
    let (user, hash) = db
        .call(move |db| db.get_credentials(&username))
        .await?
        .ok_or_else(|| BoardError::Unauthorized(INVALID_CREDENTIALS.to_string()))?;
    let password = req.password;
    let valid = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .context("Password check task failed")?;
    if !valid {
        return Err(BoardError::Unauthorized(INVALID_CREDENTIALS.to_string()).into());
    }
    if let Some(refusal) = user.status.login_refusal() {
        return Err(BoardError::Forbidden(refusal.to_string()).into());
    }
    db.call(move |db| db.open_session(user.id, ttl_hours)).await
}

impl BoardDb {
    /// Issue a token for an already verified user and stamp `last_login`.
    pub fn open_session(&self, user_id: i64, ttl_hours: i64) -> Result<Session> {
        let token = uuid::Uuid::new_v4().to_string();
        let expires_at = (Utc::now().naive_utc() + Duration::hours(ttl_hours))
            .format(TIMESTAMP_FORMAT)
            .to_string();
        self.create_session(&token, user_id, &expires_at)?;
        self.touch_last_login(user_id)?;
        let user = self
            .get_user(user_id)?
            .ok_or_else(|| BoardError::not_found("User", user_id))?;
        Ok(Session {
            token,
            expires_at,
            user,
        })
    }

    /// The active user behind a live token.
    pub fn authenticate(&self, token: &str) -> Result<User> {
        let user = self
            .session_user(token, &now_stamp())?
            .ok_or_else(|| BoardError::Unauthorized("Invalid or expired session".to_string()))?;
        if let Some(refusal) = user.status.login_refusal() {
            return Err(BoardError::Forbidden(refusal.to_string()).into());
        }
        Ok(user)
    }
}

// ── Extractors ───────────────────────────────────────────────────────

fn bearer_token(parts: &Parts) -> Option<String> {
    let value = parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// The logged-in user, from `Authorization: Bearer <token>`.
pub struct CurrentUser {
    pub user: User,
    pub token: String,
}

impl FromRequestParts<SharedState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &SharedState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| ApiError::Unauthorized("Authentication required".to_string()))?;
        let lookup = token.clone();
        let user = state.db.call(move |db| db.authenticate(&lookup)).await?;
        Ok(Self { user, token })
    }
}

/// A logged-in admin.
pub struct AdminUser(pub User);

impl FromRequestParts<SharedState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &SharedState) -> Result<Self, Self::Rejection> {
        let CurrentUser { user, .. } = CurrentUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(ApiError::Forbidden("Admin access required".to_string()));
        }
        Ok(Self(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Minimum bcrypt cost keeps the tests fast.
    const COST: u32 = 4;

    fn register(username: &str, password: &str, confirm: &str) -> RegisterRequest {
        RegisterRequest {
            username: username.to_string(),
            email: Some(format!("{}@example.com", username)),
            display_name: None,
            password: password.to_string(),
            confirm_password: confirm.to_string(),
        }
    }

    fn user_with_status(db: &BoardDb, name: &str, status: UserStatus) -> Result<User> {
        let mut new = register(name, "secret1", "secret1").into_new_user(COST)?;
        new.status = status;
        db.create_user(&new)
    }

    #[test]
    fn test_password_hash_roundtrip() -> Result<()> {
        let hash = hash_password("hunter22", COST)?;
        assert!(verify_password("hunter22", &hash));
        assert!(!verify_password("hunter23", &hash));
        assert!(!verify_password("hunter22", "pbkdf2:sha256:legacy$hash"));
        Ok(())
    }

    #[test]
    fn test_register_validation() {
        assert!(register("ann", "secret1", "secret1").validate().is_ok());
        let err = register("ann", "secret1", "secret2").validate().unwrap_err();
        assert_eq!(err.to_string(), "Passwords do not match");
        let err = register("ann", "short", "short").validate().unwrap_err();
        assert_eq!(err.to_string(), "Password must be at least 6 characters long");
        assert!(register("  ", "secret1", "secret1").validate().is_err());
    }

    #[test]
    fn test_registered_user_is_pending() -> Result<()> {
        let new = register(" ann ", "secret1", "secret1").into_new_user(COST)?;
        assert_eq!(new.username, "ann");
        assert_eq!(new.status, UserStatus::Pending);
        assert_eq!(new.role, Role::User);
        assert!(verify_password("secret1", &new.password_hash));
        Ok(())
    }

    fn login_request(username: &str, password: &str) -> LoginRequest {
        LoginRequest {
            username: username.into(),
            password: password.into(),
        }
    }

    #[tokio::test]
    async fn test_login_success_and_authenticate() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        user_with_status(&db, "ann", UserStatus::Active)?;
        let handle = DbHandle::new(db);
        let session = login(&handle, login_request(" ann ", "secret1"), 24).await?;
        assert!(session.user.last_login.is_some());

        let db = handle.lock_sync()?;
        assert_eq!(db.authenticate(&session.token)?.username, "ann");
        db.delete_session(&session.token)?;
        assert!(db.authenticate(&session.token).is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_login_refusals() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        user_with_status(&db, "ann", UserStatus::Active)?;
        user_with_status(&db, "pat", UserStatus::Pending)?;
        user_with_status(&db, "sam", UserStatus::Suspended)?;
        let handle = DbHandle::new(db);

        let err = login(&handle, login_request("ann", "wrong-pass"), 24)
            .await
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<BoardError>(), Some(BoardError::Unauthorized(_))));
        let err = login(&handle, login_request("nobody", "secret1"), 24)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), INVALID_CREDENTIALS);
        let err = login(&handle, login_request("pat", "secret1"), 24)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Your account is pending admin approval.");
        let err = login(&handle, login_request("sam", "secret1"), 24)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Your account has been suspended.");
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_login_does_not_hold_db_during_hash_check() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        let mut new = register("ann", "secret1", "secret1").into_new_user(11)?;
        new.status = UserStatus::Active;
        db.create_user(&new)?;
        let handle = DbHandle::new(db);

        let login_handle = handle.clone();
        let pending = tokio::spawn(async move {
            login(&login_handle, login_request("ann", "secret1"), 24).await
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        // A cost-11 verify takes far longer than this read.
        handle.call(|db| db.get_setting("unrelated")).await?;
        assert!(!pending.is_finished());

        let session = pending.await??;
        assert_eq!(session.user.username, "ann");
        Ok(())
    }

    #[test]
    fn test_expired_session_rejected() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        let user = user_with_status(&db, "ann", UserStatus::Active)?;
        db.create_session("stale", user.id, "2000-01-01 00:00:00")?;
        assert!(db.authenticate("stale").is_err());
        Ok(())
    }

    #[test]
    fn test_suspended_user_loses_session() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        let user = user_with_status(&db, "ann", UserStatus::Active)?;
        let session = db.open_session(user.id, 24)?;
        db.update_user_status(user.id, UserStatus::Suspended)?;
        let err = db.authenticate(&session.token).unwrap_err();
        assert!(matches!(err.downcast_ref::<BoardError>(), Some(BoardError::Forbidden(_))));
        Ok(())
    }
}
