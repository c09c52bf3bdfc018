//! Configuration for pmboard, read from `.pmboard/pmboard.toml`.
//!
//! Layered: file → environment (`PMBOARD_*`, with `.env` loaded first) → CLI.
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 5000
//! dev = false
//!
//! [storage]
//! db_path = ".pmboard/pmboard.db"
//! json_dir = "data"
//! mirror_json = true
//! remote_url = "https://docs.example.com/pmboard"
//!
//! [auth]
//! session_ttl_hours = 168
//! bcrypt_cost = 12
//! seed_admin = true
//! admin_password = "admin123"
//!
//! [notifications]
//! enabled = true
//! send_at = "09:00"
//! poll_secs = 30
//! mail_webhook = "https://mail-relay.example.com/send"
//! from = "pmboard@localhost"
//! base_url = "http://localhost:5000"
//!
//! [logging]
//! level = "info"
//! json = false
//! dir = ".pmboard/logs"
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

pub const CONFIG_DIR: &str = ".pmboard";
pub const CONFIG_FILE: &str = "pmboard.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Permissive CORS for a separately served front-end.
    #[serde(default)]
    pub dev: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            dev: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSection {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Directory of per-collection JSON files (`users.json`, `cards.json`, ...).
    #[serde(default = "default_json_dir")]
    pub json_dir: PathBuf,
    /// Keep the JSON directory in sync with the database while serving.
    #[serde(default = "default_true")]
    pub mirror_json: bool,
    /// Optional remote document store that mirrors every collection.
    #[serde(default)]
    pub remote_url: Option<String>,
    #[serde(default)]
    pub remote_token: Option<String>,
}

fn default_db_path() -> PathBuf {
    PathBuf::from(CONFIG_DIR).join("pmboard.db")
}

fn default_json_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_true() -> bool {
    true
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            json_dir: default_json_dir(),
            mirror_json: true,
            remote_url: None,
            remote_token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSection {
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: i64,
    #[serde(default = "default_bcrypt_cost")]
    pub bcrypt_cost: u32,
    /// Create `admin` and a sample project when the store is empty.
    #[serde(default = "default_true")]
    pub seed_admin: bool,
    #[serde(default = "default_admin_password")]
    pub admin_password: String,
}

fn default_session_ttl_hours() -> i64 {
    24 * 7
}

fn default_bcrypt_cost() -> u32 {
    bcrypt::DEFAULT_COST
}

fn default_admin_password() -> String {
    "admin123".to_string()
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            session_ttl_hours: default_session_ttl_hours(),
            bcrypt_cost: default_bcrypt_cost(),
            seed_admin: true,
            admin_password: default_admin_password(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Local wall-clock time of the daily overdue digest, `HH:MM`.
    #[serde(default = "default_send_at")]
    pub send_at: String,
    #[serde(default = "default_poll_secs")]
    pub poll_secs: u64,
    /// HTTP endpoint that accepts outgoing mail as JSON. Mail is only logged when unset.
    #[serde(default)]
    pub mail_webhook: Option<String>,
    #[serde(default = "default_from")]
    pub from: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_send_at() -> String {
    "09:00".to_string()
}

fn default_poll_secs() -> u64 {
    30
}

fn default_from() -> String {
    "pmboard@localhost".to_string()
}

fn default_base_url() -> String {
    "http://localhost:5000".to_string()
}

impl Default for NotificationsSection {
    fn default() -> Self {
        Self {
            enabled: true,
            send_at: default_send_at(),
            poll_secs: default_poll_secs(),
            mail_webhook: None,
            from: default_from(),
            base_url: default_base_url(),
        }
    }
}

impl NotificationsSection {
    pub fn send_at_time(&self) -> Result<NaiveTime, ConfigError> {
        NaiveTime::parse_from_str(&self.send_at, "%H:%M").map_err(|_| ConfigError::InvalidValue {
            key: "notifications.send_at".to_string(),
            value: self.send_at.clone(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
    /// Write daily-rolling log files here instead of stderr.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
            dir: None,
        }
    }
}

/// The complete pmboard.toml structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BoardConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub auth: AuthSection,
    #[serde(default)]
    pub notifications: NotificationsSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl BoardConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(ConfigError::from)?;
        config.notifications.send_at_time()?;
        Ok(config)
    }

    /// Load `pmboard.toml` from `config_dir`, or defaults when it does not exist.
    pub fn load_or_default(config_dir: &Path) -> Result<Self> {
        let config_path = config_dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize pmboard.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Load from the project directory and apply `.env` and `PMBOARD_*` overrides.
    pub fn resolve(project_dir: &Path) -> Result<Self> {
        // A missing .env is normal.
        let _ = dotenvy::from_path(project_dir.join(".env"));
        let mut config = Self::load_or_default(&project_dir.join(CONFIG_DIR))?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply environment overrides. `lookup` is injected so tests don't touch the process env.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("PMBOARD_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PMBOARD_PORT") {
            self.server.port = port.parse().map_err(|_| ConfigError::InvalidValue {
                key: "PMBOARD_PORT".to_string(),
                value: port.clone(),
            })?;
        }
        if let Some(db) = lookup("PMBOARD_DB") {
            self.storage.db_path = PathBuf::from(db);
        }
        if let Some(dir) = lookup("PMBOARD_JSON_DIR") {
            self.storage.json_dir = PathBuf::from(dir);
        }
        if let Some(url) = lookup("PMBOARD_REMOTE_URL") {
            self.storage.remote_url = Some(url);
        }
        if let Some(token) = lookup("PMBOARD_REMOTE_TOKEN") {
            self.storage.remote_token = Some(token);
        }
        if let Some(hook) = lookup("PMBOARD_MAIL_WEBHOOK") {
            self.notifications.mail_webhook = Some(hook);
        }
        if let Some(password) = lookup("PMBOARD_ADMIN_PASSWORD") {
            self.auth.admin_password = password;
        }
        if let Some(level) = lookup("PMBOARD_LOG") {
            self.logging.level = level;
        }
        if let Some(json) = lookup("PMBOARD_LOG_JSON") {
            self.logging.json = json != "false" && json != "0";
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = BoardConfig::default();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.storage.db_path, PathBuf::from(".pmboard/pmboard.db"));
        assert_eq!(config.storage.json_dir, PathBuf::from("data"));
        assert!(config.storage.mirror_json);
        assert_eq!(config.auth.admin_password, "admin123");
        assert_eq!(config.notifications.send_at, "09:00");
        assert_eq!(config.notifications.poll_secs, 30);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_partial_file_keeps_defaults() {
        let config = BoardConfig::parse(
            r#"
            [server]
            port = 8080

            [notifications]
            send_at = "07:30"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(
            config.notifications.send_at_time().unwrap(),
            NaiveTime::from_hms_opt(7, 30, 0).unwrap()
        );
        assert_eq!(config.auth.session_ttl_hours, 168);
    }

    #[test]
    fn test_parse_rejects_bad_send_at() {
        let err = BoardConfig::parse("[notifications]\nsend_at = \"25:99\"").unwrap_err();
        assert!(err.to_string().contains("notifications.send_at"));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = TempDir::new().unwrap();
        let config = BoardConfig::load_or_default(dir.path()).unwrap();
        assert_eq!(config.server.port, 5000);
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let mut config = BoardConfig::default();
        config.server.port = 6001;
        config.storage.remote_url = Some("http://docs.local".into());
        config.save(&path).unwrap();

        let loaded = BoardConfig::load(&path).unwrap();
        assert_eq!(loaded.server.port, 6001);
        assert_eq!(loaded.storage.remote_url.as_deref(), Some("http://docs.local"));
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = BoardConfig::parse("[server]\nport = 7000").unwrap();
        let env: HashMap<&str, &str> = [
            ("PMBOARD_PORT", "7100"),
            ("PMBOARD_DB", "/tmp/board.db"),
            ("PMBOARD_LOG_JSON", "1"),
        ]
        .into_iter()
        .collect();
        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.server.port, 7100);
        assert_eq!(config.storage.db_path, PathBuf::from("/tmp/board.db"));
        assert!(config.logging.json);
    }

    #[test]
    fn test_env_rejects_bad_port() {
        let mut config = BoardConfig::default();
        let err = config
            .apply_env(|key| (key == "PMBOARD_PORT").then(|| "http".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("PMBOARD_PORT"));
    }
}
