use anyhow::{Context, Result};
use rusqlite::{OptionalExtension, Row, params};

use super::{BoardDb, parse_enum};
use crate::board::models::*;
use crate::errors::BoardError;

const USER_COLUMNS: &str =
    "id, username, email, display_name, role, status, email_notifications, created_at, last_login";

/// Raw `users` row before enum parsing.
pub(super) struct UserRow {
    id: i64,
    username: String,
    email: Option<String>,
    display_name: Option<String>,
    role: String,
    status: String,
    email_notifications: bool,
    created_at: String,
    last_login: Option<String>,
}

impl UserRow {
    pub(super) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            username: row.get(1)?,
            email: row.get(2)?,
            display_name: row.get(3)?,
            role: row.get(4)?,
            status: row.get(5)?,
            email_notifications: row.get(6)?,
            created_at: row.get(7)?,
            last_login: row.get(8)?,
        })
    }

    pub(super) fn into_user(self) -> Result<User> {
        Ok(User {
            id: self.id,
            username: self.username,
            email: self.email,
            display_name: self.display_name,
            role: parse_enum(&self.role)?,
            status: parse_enum(&self.status)?,
            email_notifications: self.email_notifications,
            created_at: self.created_at,
            last_login: self.last_login,
        })
    }
}

/// Fields for a new account. The password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub password_hash: String,
    pub role: Role,
    pub status: UserStatus,
}

impl BoardDb {
    // ── Users ─────────────────────────────────────────────────────────

    pub fn create_user(&self, new: &NewUser) -> Result<User> {
        if self.get_user_by_username(&new.username)?.is_some() {
            return Err(BoardError::conflict("Username already exists").into());
        }
        if let Some(email) = new.email.as_deref() {
            let taken: bool = self
                .conn
                .query_row(
                    "SELECT COUNT(*) > 0 FROM users WHERE lower(email) = lower(?1)",
                    params![email],
                    |row| row.get(0),
                )
                .context("Failed to check email")?;
            if taken {
                return Err(BoardError::conflict("Email already registered").into());
            }
        }

        self.conn
            .execute(
                "INSERT INTO users (username, password_hash, email, display_name, role, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    new.username,
                    new.password_hash,
                    new.email,
                    new.display_name,
                    new.role.as_str(),
                    new.status.as_str()
                ],
            )
            .context("Failed to insert user")?;
        let id = self.conn.last_insert_rowid();
        self.get_user(id)?.context("User not found after insert")
    }

    pub fn get_user(&self, id: i64) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS);
        let row = self
            .conn
            .query_row(&sql, params![id], UserRow::from_row)
            .optional()
            .context("Failed to query user")?;
        row.map(UserRow::into_user).transpose()
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE username = ?1", USER_COLUMNS);
        let row = self
            .conn
            .query_row(&sql, params![username], UserRow::from_row)
            .optional()
            .context("Failed to query user by username")?;
        row.map(UserRow::into_user).transpose()
    }

    /// The user and their password hash, for credential checks.
    pub fn get_credentials(&self, username: &str) -> Result<Option<(User, String)>> {
        let user = match self.get_user_by_username(username)? {
            Some(u) => u,
            None => return Ok(None),
        };
        let hash: String = self
            .conn
            .query_row(
                "SELECT password_hash FROM users WHERE id = ?1",
                params![user.id],
                |row| row.get(0),
            )
            .context("Failed to read password hash")?;
        Ok(Some((user, hash)))
    }

    pub fn list_users(&self, filter: &UserFilter) -> Result<Vec<User>> {
        let sql = format!("SELECT {} FROM users ORDER BY id", USER_COLUMNS);
        let mut stmt = self.conn.prepare(&sql).context("Failed to prepare list_users")?;
        let rows = stmt
            .query_map([], UserRow::from_row)
            .context("Failed to query users")?;

        let search = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);

        let mut users = Vec::new();
        for row in rows {
            let user = row.context("Failed to read user row")?.into_user()?;
            if filter.status.is_some_and(|s| s != user.status) {
                continue;
            }
            if filter.role.is_some_and(|r| r != user.role) {
                continue;
            }
            if let Some(q) = &search {
                let in_name = user.username.to_lowercase().contains(q);
                let in_display = user
                    .display_name
                    .as_deref()
                    .is_some_and(|d| d.to_lowercase().contains(q));
                if !in_name && !in_display {
                    continue;
                }
            }
            users.push(user);
        }
        Ok(users)
    }

    pub fn user_stats(&self) -> Result<UserStats> {
        self.conn
            .query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(status = 'active'), 0),
                        COALESCE(SUM(status = 'pending'), 0),
                        COALESCE(SUM(role = 'admin'), 0)
                 FROM users",
                [],
                |row| {
                    Ok(UserStats {
                        total: row.get(0)?,
                        active: row.get(1)?,
                        pending: row.get(2)?,
                        admins: row.get(3)?,
                    })
                },
            )
            .context("Failed to compute user stats")
    }

    /// Set a user's status. Returns the updated user and the previous status.
    pub fn update_user_status(&self, id: i64, status: UserStatus) -> Result<(User, UserStatus)> {
        let previous = self
            .get_user(id)?
            .ok_or(BoardError::not_found("User", id))?
            .status;
        self.conn
            .execute(
                "UPDATE users SET status = ?1 WHERE id = ?2",
                params![status.as_str(), id],
            )
            .context("Failed to update user status")?;
        let user = self.get_user(id)?.context("User not found after update")?;
        Ok((user, previous))
    }

    pub fn update_user_role(&self, id: i64, role: Role) -> Result<User> {
        let count = self
            .conn
            .execute(
                "UPDATE users SET role = ?1 WHERE id = ?2",
                params![role.as_str(), id],
            )
            .context("Failed to update user role")?;
        if count == 0 {
            return Err(BoardError::not_found("User", id).into());
        }
        self.get_user(id)?.context("User not found after update")
    }

    /// Apply a status to many users at once. Unknown ids are skipped.
    /// Returns the users whose status actually changed.
    pub fn bulk_update_status(&self, ids: &[i64], status: UserStatus) -> Result<Vec<User>> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        let mut changed = Vec::new();
        for &id in ids {
            let count = tx
                .execute(
                    "UPDATE users SET status = ?1 WHERE id = ?2 AND status != ?1",
                    params![status.as_str(), id],
                )
                .context("Failed to bulk update user")?;
            if count > 0 {
                changed.push(id);
            }
        }
        tx.commit().context("Failed to commit bulk update")?;

        let mut users = Vec::with_capacity(changed.len());
        for id in changed {
            if let Some(user) = self.get_user(id)? {
                users.push(user);
            }
        }
        Ok(users)
    }

    pub fn update_profile(
        &self,
        id: i64,
        email: Option<&str>,
        email_notifications: Option<bool>,
    ) -> Result<User> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        if let Some(e) = email {
            let e = e.trim();
            let value = if e.is_empty() { None } else { Some(e) };
            tx.execute(
                "UPDATE users SET email = ?1 WHERE id = ?2",
                params![value, id],
            )
            .context("Failed to update email")?;
        }
        if let Some(n) = email_notifications {
            tx.execute(
                "UPDATE users SET email_notifications = ?1 WHERE id = ?2",
                params![n, id],
            )
            .context("Failed to update email_notifications")?;
        }
        tx.commit().context("Failed to commit profile update")?;
        self.get_user(id)?.ok_or_else(|| BoardError::not_found("User", id).into())
    }

    pub fn touch_last_login(&self, id: i64) -> Result<()> {
        self.conn
            .execute(
                "UPDATE users SET last_login = datetime('now') WHERE id = ?1",
                params![id],
            )
            .context("Failed to update last_login")?;
        Ok(())
    }

    /// Active users, for assignee pickers and mentions.
    pub fn team_members(&self) -> Result<Vec<TeamMember>> {
        let users = self.list_users(&UserFilter {
            status: Some(UserStatus::Active),
            ..Default::default()
        })?;
        Ok(users
            .into_iter()
            .map(|u| TeamMember {
                id: u.id,
                display_name: u.display().to_string(),
                username: u.username,
            })
            .collect())
    }

    // ── Sessions ──────────────────────────────────────────────────────

    pub fn create_session(&self, token: &str, user_id: i64, expires_at: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO sessions (token, user_id, expires_at) VALUES (?1, ?2, ?3)",
                params![token, user_id, expires_at],
            )
            .context("Failed to insert session")?;
        Ok(())
    }

    /// Resolve a token to its user. Expired sessions are purged as a side effect.
    pub fn session_user(&self, token: &str, now: &str) -> Result<Option<User>> {
        self.conn
            .execute("DELETE FROM sessions WHERE expires_at <= ?1", params![now])
            .context("Failed to purge expired sessions")?;
        let user_id: Option<i64> = self
            .conn
            .query_row(
                "SELECT user_id FROM sessions WHERE token = ?1",
                params![token],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to query session")?;
        match user_id {
            Some(id) => self.get_user(id),
            None => Ok(None),
        }
    }

    pub fn delete_session(&self, token: &str) -> Result<bool> {
        let count = self
            .conn
            .execute("DELETE FROM sessions WHERE token = ?1", params![token])
            .context("Failed to delete session")?;
        Ok(count > 0)
    }

    /// Drop every session for a user, e.g. after suspension.
    pub fn delete_user_sessions(&self, user_id: i64) -> Result<usize> {
        self.conn
            .execute("DELETE FROM sessions WHERE user_id = ?1", params![user_id])
            .context("Failed to delete user sessions")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(username: &str, email: Option<&str>) -> NewUser {
        NewUser {
            username: username.to_string(),
            email: email.map(str::to_string),
            display_name: None,
            password_hash: "hash".to_string(),
            role: Role::User,
            status: UserStatus::Pending,
        }
    }

    #[test]
    fn test_create_and_fetch_user() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        let user = db.create_user(&new_user("alice", Some("alice@example.com")))?;
        assert!(user.id > 0);
        assert_eq!(user.status, UserStatus::Pending);
        assert_eq!(user.role, Role::User);
        assert!(user.email_notifications);

        let (fetched, hash) = db.get_credentials("alice")?.expect("user exists");
        assert_eq!(fetched.id, user.id);
        assert_eq!(hash, "hash");
        assert!(db.get_credentials("bob")?.is_none());
        Ok(())
    }

    #[test]
    fn test_duplicate_username_and_email_conflict() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        db.create_user(&new_user("alice", Some("a@example.com")))?;

        let err = db.create_user(&new_user("alice", None)).unwrap_err();
        assert!(matches!(err.downcast_ref::<BoardError>(), Some(BoardError::Conflict(_))));

        let err = db
            .create_user(&new_user("alice2", Some("A@example.com")))
            .unwrap_err();
        assert_eq!(err.to_string(), "Email already registered");
        Ok(())
    }

    #[test]
    fn test_list_users_filters() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        let a = db.create_user(&new_user("alice", None))?;
        let mut bob = new_user("bob", None);
        bob.display_name = Some("Robert Smith".into());
        bob.role = Role::Admin;
        db.create_user(&bob)?;
        db.update_user_status(a.id, UserStatus::Active)?;

        let active = db.list_users(&UserFilter {
            status: Some(UserStatus::Active),
            ..Default::default()
        })?;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].username, "alice");

        let admins = db.list_users(&UserFilter {
            role: Some(Role::Admin),
            ..Default::default()
        })?;
        assert_eq!(admins.len(), 1);

        let by_display = db.list_users(&UserFilter {
            search: Some("SMITH".into()),
            ..Default::default()
        })?;
        assert_eq!(by_display.len(), 1);
        assert_eq!(by_display[0].username, "bob");

        let stats = db.user_stats()?;
        assert_eq!(
            stats,
            UserStats {
                total: 2,
                active: 1,
                pending: 1,
                admins: 1
            }
        );
        Ok(())
    }

    #[test]
    fn test_update_status_reports_previous() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        let u = db.create_user(&new_user("carol", None))?;
        let (user, previous) = db.update_user_status(u.id, UserStatus::Active)?;
        assert_eq!(previous, UserStatus::Pending);
        assert_eq!(user.status, UserStatus::Active);

        let err = db.update_user_status(999, UserStatus::Active).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BoardError>(),
            Some(BoardError::NotFound { entity: "User", id: 999 })
        ));
        Ok(())
    }

    #[test]
    fn test_bulk_update_skips_unknown_and_unchanged() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        let a = db.create_user(&new_user("a1", None))?;
        let b = db.create_user(&new_user("b1", None))?;
        db.update_user_status(b.id, UserStatus::Suspended)?;

        let changed = db.bulk_update_status(&[a.id, b.id, 404], UserStatus::Suspended)?;
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].id, a.id);
        Ok(())
    }

    #[test]
    fn test_update_profile() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        let u = db.create_user(&new_user("dave", None))?;
        let user = db.update_profile(u.id, Some("dave@example.com"), Some(false))?;
        assert_eq!(user.email.as_deref(), Some("dave@example.com"));
        assert!(!user.email_notifications);

        let user = db.update_profile(u.id, Some("  "), None)?;
        assert_eq!(user.email, None);
        assert!(!user.email_notifications);
        Ok(())
    }

    #[test]
    fn test_team_members_only_active() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        let a = db.create_user(&new_user("erin", None))?;
        db.create_user(&new_user("frank", None))?;
        db.update_user_status(a.id, UserStatus::Active)?;

        let team = db.team_members()?;
        assert_eq!(team.len(), 1);
        assert_eq!(team[0].username, "erin");
        assert_eq!(team[0].display_name, "erin");
        Ok(())
    }

    #[test]
    fn test_sessions_expire() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        let u = db.create_user(&new_user("gina", None))?;
        db.create_session("tok-live", u.id, "2099-01-01 00:00:00")?;
        db.create_session("tok-dead", u.id, "2000-01-01 00:00:00")?;

        let now = "2024-06-01 12:00:00";
        assert_eq!(db.session_user("tok-live", now)?.map(|u| u.id), Some(u.id));
        assert!(db.session_user("tok-dead", now)?.is_none());

        assert!(db.delete_session("tok-live")?);
        assert!(db.session_user("tok-live", now)?.is_none());
        Ok(())
    }
}
