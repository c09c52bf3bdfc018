//! SQLite store for the board.
//!
//! `BoardDb` owns a single connection; per-entity CRUD lives in the
//! submodules as further `impl BoardDb` blocks. `DbHandle` is the async
//! entry point used by handlers and background tasks.

mod cards;
mod projects;
mod snapshot;
mod sprints;
mod users;
mod views;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};

pub use projects::{ItemUpdate, ProjectUpdate};
pub use snapshot::{COLLECTIONS, ImportSummary, Snapshot};
pub use users::NewUser;

/// Async-safe handle to the board database.
///
/// Wraps `BoardDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, so synchronous SQLite I/O
/// never ties up async worker threads.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<BoardDb>>,
}

impl DbHandle {
    pub fn new(db: BoardDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&BoardDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db
                .lock()
                .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }

    /// Acquire the database mutex synchronously. For startup and tests only;
    /// never call this from a hot async path.
    pub fn lock_sync(&self) -> Result<std::sync::MutexGuard<'_, BoardDb>> {
        self.inner
            .lock()
            .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))
    }
}

pub struct BoardDb {
    conn: Connection,
}

impl BoardDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    username TEXT NOT NULL UNIQUE,
                    password_hash TEXT NOT NULL,
                    email TEXT,
                    display_name TEXT,
                    role TEXT NOT NULL DEFAULT 'user',
                    status TEXT NOT NULL DEFAULT 'pending',
                    email_notifications INTEGER NOT NULL DEFAULT 1,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    last_login TEXT
                );

                CREATE TABLE IF NOT EXISTS sessions (
                    token TEXT PRIMARY KEY,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    expires_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS projects (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    description TEXT NOT NULL DEFAULT '',
                    archived INTEGER NOT NULL DEFAULT 0,
                    archived_at TEXT,
                    archived_by TEXT,
                    created_by TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    start_date TEXT,
                    end_date TEXT,
                    budget REAL NOT NULL DEFAULT 100000
                );

                CREATE TABLE IF NOT EXISTS epics (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                    title TEXT NOT NULL,
                    description TEXT NOT NULL DEFAULT '',
                    status TEXT NOT NULL DEFAULT 'todo',
                    created_by TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS stories (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    epic_id INTEGER REFERENCES epics(id) ON DELETE SET NULL,
                    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                    title TEXT NOT NULL,
                    description TEXT NOT NULL DEFAULT '',
                    story_points INTEGER,
                    status TEXT NOT NULL DEFAULT 'todo',
                    created_by TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS cards (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                    epic_id INTEGER REFERENCES epics(id) ON DELETE SET NULL,
                    story_id INTEGER REFERENCES stories(id) ON DELETE SET NULL,
                    title TEXT NOT NULL,
                    description TEXT NOT NULL DEFAULT '',
                    status TEXT NOT NULL DEFAULT 'todo',
                    priority TEXT NOT NULL DEFAULT 'medium',
                    assignee TEXT,
                    due_date TEXT,
                    labels TEXT NOT NULL DEFAULT '[]',
                    created_by TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT,
                    updated_by TEXT,
                    completed_at TEXT
                );

                CREATE TABLE IF NOT EXISTS comments (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    card_id INTEGER NOT NULL REFERENCES cards(id) ON DELETE CASCADE,
                    author TEXT NOT NULL,
                    content TEXT NOT NULL,
                    mentions TEXT NOT NULL DEFAULT '[]',
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS notifications (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    kind TEXT NOT NULL,
                    message TEXT NOT NULL,
                    card_id INTEGER REFERENCES cards(id) ON DELETE SET NULL,
                    read INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS sprints (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                    name TEXT NOT NULL,
                    description TEXT NOT NULL DEFAULT '',
                    goal TEXT,
                    story_points INTEGER,
                    start_date TEXT,
                    end_date TEXT,
                    status TEXT NOT NULL DEFAULT 'planning',
                    created_by TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    started_at TEXT,
                    completed_at TEXT
                );

                CREATE TABLE IF NOT EXISTS sprint_items (
                    sprint_id INTEGER NOT NULL REFERENCES sprints(id) ON DELETE CASCADE,
                    item_type TEXT NOT NULL,
                    item_id INTEGER NOT NULL,
                    added_by TEXT,
                    added_at TEXT NOT NULL DEFAULT (datetime('now')),
                    PRIMARY KEY (sprint_id, item_type, item_id)
                );

                CREATE TABLE IF NOT EXISTS mindmaps (
                    project_id INTEGER PRIMARY KEY REFERENCES projects(id) ON DELETE CASCADE,
                    nodes TEXT NOT NULL DEFAULT '[]',
                    connections TEXT NOT NULL DEFAULT '[]',
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS settings (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL,
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE INDEX IF NOT EXISTS idx_epics_project ON epics(project_id);
                CREATE INDEX IF NOT EXISTS idx_stories_project ON stories(project_id);
                CREATE INDEX IF NOT EXISTS idx_stories_epic ON stories(epic_id);
                CREATE INDEX IF NOT EXISTS idx_cards_project ON cards(project_id, status);
                CREATE INDEX IF NOT EXISTS idx_cards_story ON cards(story_id);
                CREATE INDEX IF NOT EXISTS idx_comments_card ON comments(card_id);
                CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(user_id);
                CREATE INDEX IF NOT EXISTS idx_sprints_project ON sprints(project_id);
                CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);
                ",
            )
            .context("Failed to create tables")?;

        // At most one active sprint per project.
        self.conn
            .execute_batch(
                "CREATE UNIQUE INDEX IF NOT EXISTS idx_sprints_one_active
                 ON sprints(project_id) WHERE status = 'active';",
            )
            .context("Failed to create active sprint index")?;

        Ok(())
    }

    // ── Settings ──────────────────────────────────────────────────────

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to read setting")
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO settings (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = datetime('now')",
                params![key, value],
            )
            .context("Failed to write setting")?;
        Ok(())
    }

    /// True when the store holds no users and no projects.
    pub fn is_empty(&self) -> Result<bool> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT (SELECT COUNT(*) FROM users) + (SELECT COUNT(*) FROM projects)",
                [],
                |row| row.get(0),
            )
            .context("Failed to count rows")?;
        Ok(count == 0)
    }

    /// Create the default admin and a sample project in an empty store.
    /// Returns false (and does nothing) when the store already has data.
    pub fn seed_defaults(&self, admin_password_hash: &str) -> Result<bool> {
        if !self.is_empty()? {
            return Ok(false);
        }
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        tx.execute(
            "INSERT INTO users (username, password_hash, email, display_name, role, status)
             VALUES ('admin', ?1, NULL, 'Administrator', 'admin', 'active')",
            params![admin_password_hash],
        )
        .context("Failed to seed admin user")?;
        tx.execute(
            "INSERT INTO projects (name, description, created_by)
             VALUES ('Sample Project', 'A sample project to get started', 'admin')",
            [],
        )
        .context("Failed to seed sample project")?;
        tx.commit().context("Failed to commit seed")?;
        Ok(true)
    }
}

/// Parse a TEXT column holding an enum's `as_str()` form.
pub(crate) fn parse_enum<T: std::str::FromStr<Err = String>>(value: &str) -> Result<T> {
    T::from_str(value).map_err(|e| anyhow::anyhow!(e))
}

/// Parse a TEXT column holding a JSON array of strings.
pub(crate) fn parse_string_list(value: &str) -> Result<Vec<String>> {
    serde_json::from_str(value).with_context(|| format!("Invalid JSON list: {}", value))
}
