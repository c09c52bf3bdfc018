//! Snapshot stores outside the database: the per-collection JSON directory
//! and an optional remote document store.
//!
//! Both are used twice: once at startup to seed an empty database, and
//! afterwards as mirrors that receive a debounced export after mutations.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use fs2::FileExt;
use tokio::sync::{Notify, watch};

use super::db::{COLLECTIONS, DbHandle, ImportSummary, Snapshot};
use crate::config::StorageSection;

const LOCK_FILE: &str = ".pmboard.lock";
pub const MIRROR_DEBOUNCE: Duration = Duration::from_millis(500);

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    fn describe(&self) -> String;
    /// `None` when the store holds no collections at all.
    async fn load(&self) -> Result<Option<Snapshot>>;
    async fn save(&self, snapshot: &Snapshot) -> Result<()>;
}

// ── JSON directory ───────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct JsonDirStore {
    dir: PathBuf,
}

impl JsonDirStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn lock(&self) -> Result<fs::File> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;
        let path = self.dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("Failed to open lock file {}", path.display()))?;
        file.lock_exclusive()
            .with_context(|| format!("Failed to lock {}", path.display()))?;
        Ok(file)
    }

    pub fn read(&self) -> Result<Option<Snapshot>> {
        if !self.dir.is_dir() {
            return Ok(None);
        }
        let _lock = self.lock()?;
        let mut collections = HashMap::new();
        for name in COLLECTIONS {
            let path = self.dir.join(format!("{}.json", name));
            let bytes = match fs::read(&path) {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(e).with_context(|| format!("Failed to read {}", path.display()));
                }
            };
            let value: serde_json::Value = serde_json::from_slice(&bytes)
                .with_context(|| format!("Failed to parse {}", path.display()))?;
            collections.insert(name.to_string(), value);
        }
        if collections.is_empty() {
            return Ok(None);
        }
        Snapshot::from_collections(collections).map(Some)
    }

    /// Write every collection file atomically while holding the directory lock.
    pub fn write(&self, snapshot: &Snapshot) -> Result<()> {
        let _lock = self.lock()?;
        for (name, value) in snapshot.to_collections()? {
            write_json_atomic(&self.dir.join(format!("{}.json", name)), &value)?;
        }
        Ok(())
    }
}

fn write_json_atomic(path: &Path, value: &serde_json::Value) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("Path has no parent: {}", path.display()))?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temp file in {}", parent.display()))?;
    serde_json::to_writer_pretty(tmp.as_file_mut(), value)
        .with_context(|| format!("Failed to serialize {}", path.display()))?;
    tmp.as_file_mut()
        .flush()
        .with_context(|| format!("Failed to flush {}", path.display()))?;
    tmp.persist(path)
        .with_context(|| format!("Failed to persist {}", path.display()))?;
    Ok(())
}

#[async_trait]
impl SnapshotStore for JsonDirStore {
    fn describe(&self) -> String {
        format!("json dir {}", self.dir.display())
    }

    async fn load(&self) -> Result<Option<Snapshot>> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.read())
            .await
            .context("JSON read task panicked")?
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let store = self.clone();
        let snapshot = snapshot.clone();
        tokio::task::spawn_blocking(move || store.write(&snapshot))
            .await
            .context("JSON write task panicked")?
    }
}

// ── Remote document store ────────────────────────────────────────────

/// Collections as JSON arrays at `{base}/{collection}`.
pub struct HttpDocumentStore {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpDocumentStore {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    fn url(&self, collection: &str) -> String {
        format!("{}/{}", self.base_url, collection)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }
}

#[async_trait]
impl SnapshotStore for HttpDocumentStore {
    fn describe(&self) -> String {
        format!("remote store {}", self.base_url)
    }

    async fn load(&self) -> Result<Option<Snapshot>> {
        let mut collections = HashMap::new();
        for name in COLLECTIONS {
            let resp = self
                .authorize(self.client.get(self.url(name)))
                .send()
                .await
                .with_context(|| format!("Failed to fetch collection {}", name))?;
            if resp.status() == reqwest::StatusCode::NOT_FOUND {
                continue;
            }
            let value: serde_json::Value = resp
                .error_for_status()
                .with_context(|| format!("Remote store refused collection {}", name))?
                .json()
                .await
                .with_context(|| format!("Failed to parse collection {}", name))?;
            collections.insert(name.to_string(), value);
        }
        if collections.is_empty() {
            return Ok(None);
        }
        Snapshot::from_collections(collections).map(Some)
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<()> {
        for (name, value) in snapshot.to_collections()? {
            self.authorize(self.client.put(self.url(name)))
                .json(&value)
                .send()
                .await
                .with_context(|| format!("Failed to push collection {}", name))?
                .error_for_status()
                .with_context(|| format!("Remote store rejected collection {}", name))?;
        }
        Ok(())
    }
}

// ── Wiring ───────────────────────────────────────────────────────────

/// Stores in load-priority order: remote first, then the JSON directory.
pub fn stores_from_config(storage: &StorageSection, project_dir: &Path) -> Vec<Arc<dyn SnapshotStore>> {
    let mut stores: Vec<Arc<dyn SnapshotStore>> = Vec::new();
    if let Some(url) = storage.remote_url.as_deref().filter(|u| !u.is_empty()) {
        stores.push(Arc::new(HttpDocumentStore::new(url, storage.remote_token.clone())));
    }
    stores.push(Arc::new(JsonDirStore::new(project_dir.join(&storage.json_dir))));
    stores
}

/// Stores that receive exports while serving. The JSON directory is left
/// out when `mirror_json` is off.
pub fn mirror_stores_from_config(
    storage: &StorageSection,
    project_dir: &Path,
) -> Vec<Arc<dyn SnapshotStore>> {
    let mut stores = stores_from_config(storage, project_dir);
    if !storage.mirror_json {
        stores.pop();
    }
    stores
}

/// Import the first non-empty snapshot into an empty database. Stores that
/// fail are logged and skipped.
pub async fn load_initial(
    db: &DbHandle,
    stores: &[Arc<dyn SnapshotStore>],
) -> Result<Option<(String, ImportSummary)>> {
    if !db.call(|db| db.is_empty()).await? {
        return Ok(None);
    }
    for store in stores {
        let snapshot = match store.load().await {
            Ok(Some(s)) if !s.is_empty() => s,
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!(store = %store.describe(), error = %e, "Snapshot load failed, trying next store");
                continue;
            }
        };
        let summary = db.call(move |db| db.import_snapshot(&snapshot)).await?;
        tracing::info!(store = %store.describe(), ?summary, "Imported snapshot into empty database");
        return Ok(Some((store.describe(), summary)));
    }
    Ok(None)
}

/// Export the database and push it to every store, logging failures.
pub async fn flush(db: &DbHandle, stores: &[Arc<dyn SnapshotStore>]) -> Result<()> {
    let snapshot = db.call(|db| db.export_snapshot()).await?;
    for store in stores {
        if let Err(e) = store.save(&snapshot).await {
            tracing::warn!(store = %store.describe(), error = %e, "Mirror write failed");
        }
    }
    Ok(())
}

/// Mirror the database after each burst of mutations until shutdown, then
/// flush once more if anything is pending.
pub async fn run_mirror(
    db: DbHandle,
    stores: Vec<Arc<dyn SnapshotStore>>,
    dirty: Arc<Notify>,
    debounce: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = dirty.notified() => {}
            _ = shutdown.changed() => break,
        }
        // Collapse the burst.
        tokio::select! {
            _ = tokio::time::sleep(debounce) => {}
            _ = shutdown.changed() => {}
        }
        if let Err(e) = flush(&db, &stores).await {
            tracing::warn!(error = %e, "Mirror export failed");
        }
        if *shutdown.borrow() {
            return;
        }
    }
    if let Err(e) = flush(&db, &stores).await {
        tracing::warn!(error = %e, "Final mirror export failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::db::BoardDb;
    use tempfile::TempDir;

    fn seeded() -> Result<DbHandle> {
        let db = BoardDb::new_in_memory()?;
        db.seed_defaults("hash")?;
        Ok(DbHandle::new(db))
    }

    #[test]
    fn test_json_dir_missing_is_none() -> Result<()> {
        let dir = TempDir::new()?;
        let store = JsonDirStore::new(dir.path().join("nope"));
        assert!(store.read()?.is_none());
        Ok(())
    }

    #[test]
    fn test_json_dir_write_then_read() -> Result<()> {
        let dir = TempDir::new()?;
        let db = BoardDb::new_in_memory()?;
        db.seed_defaults("hash")?;
        let store = JsonDirStore::new(dir.path().join("data"));
        store.write(&db.export_snapshot()?)?;

        for name in COLLECTIONS {
            assert!(store.dir().join(format!("{}.json", name)).exists(), "{} written", name);
        }
        let projects: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.dir().join("projects.json"))?)?;
        assert_eq!(projects[0]["name"], "Sample Project");

        let back = store.read()?.expect("snapshot");
        assert_eq!(back.users.len(), 1);
        assert_eq!(back.projects.len(), 1);
        Ok(())
    }

    #[test]
    fn test_json_dir_partial_collections() -> Result<()> {
        let dir = TempDir::new()?;
        fs::write(
            dir.path().join("projects.json"),
            r#"[{"id": 4, "name": "Legacy", "description": ""}]"#,
        )?;
        let snapshot = JsonDirStore::new(dir.path()).read()?.expect("snapshot");
        assert_eq!(snapshot.projects[0].id, 4);
        assert!(snapshot.cards.is_empty());
        Ok(())
    }

    #[test]
    fn test_json_dir_rejects_garbage() -> Result<()> {
        let dir = TempDir::new()?;
        fs::write(dir.path().join("cards.json"), "not json")?;
        assert!(JsonDirStore::new(dir.path()).read().is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_load_initial_falls_back_to_next_store() -> Result<()> {
        let source = TempDir::new()?;
        JsonDirStore::new(source.path()).write(&seeded()?.lock_sync()?.export_snapshot()?)?;
        let broken = TempDir::new()?;
        fs::write(broken.path().join("users.json"), "{")?;

        let stores: Vec<Arc<dyn SnapshotStore>> = vec![
            Arc::new(JsonDirStore::new(broken.path())),
            Arc::new(JsonDirStore::new(source.path())),
        ];
        let db = DbHandle::new(BoardDb::new_in_memory()?);
        let (from, summary) = load_initial(&db, &stores).await?.expect("imported");
        assert!(from.contains(&source.path().display().to_string()));
        assert_eq!(summary.projects, 1);

        // Non-empty databases are left alone.
        assert!(load_initial(&db, &stores).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_mirror_flushes_on_notify_and_shutdown() -> Result<()> {
        let out = TempDir::new()?;
        let db = seeded()?;
        let dirty = Arc::new(Notify::new());
        let (tx, rx) = watch::channel(false);
        let stores: Vec<Arc<dyn SnapshotStore>> = vec![Arc::new(JsonDirStore::new(out.path()))];
        let task = tokio::spawn(run_mirror(
            db.clone(),
            stores,
            dirty.clone(),
            Duration::from_millis(10),
            rx,
        ));

        dirty.notify_one();
        for _ in 0..100 {
            if out.path().join("projects.json").exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(out.path().join("projects.json").exists());

        db.call(|db| db.create_project("Second", "", None)).await?;
        tx.send(true)?;
        tokio::time::timeout(Duration::from_secs(5), task).await??;
        let back = JsonDirStore::new(out.path()).read()?.expect("snapshot");
        assert_eq!(back.projects.len(), 2);
        Ok(())
    }

    #[test]
    fn test_stores_from_config_orders_remote_first() {
        let dir = Path::new("/srv/board");
        let mut storage = StorageSection::default();
        assert_eq!(stores_from_config(&storage, dir).len(), 1);
        storage.remote_url = Some("https://docs.example.com/pm/".into());
        let stores = stores_from_config(&storage, dir);
        assert_eq!(stores.len(), 2);
        assert_eq!(stores[0].describe(), "remote store https://docs.example.com/pm");
        assert_eq!(stores[1].describe(), "json dir /srv/board/data");

        storage.mirror_json = false;
        let mirrors = mirror_stores_from_config(&storage, dir);
        assert_eq!(mirrors.len(), 1);
        assert_eq!(mirrors[0].describe(), "remote store https://docs.example.com/pm");
    }
}
