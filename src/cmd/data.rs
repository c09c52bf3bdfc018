//! Snapshot and mail commands: `pmboard import`, `export` and `notify-overdue`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;

use pmboard::board::db::{BoardDb, DbHandle};
use pmboard::board::notify::{mailer_from_config, send_overdue_digest};
use pmboard::board::store::JsonDirStore;
use pmboard::config::BoardConfig;

fn open_db(project_dir: &Path, config: &BoardConfig) -> Result<BoardDb> {
    let db_path = project_dir.join(&config.storage.db_path);
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    BoardDb::new(&db_path)
        .with_context(|| format!("Failed to open database {}", db_path.display()))
}

fn json_dir(project_dir: &Path, config: &BoardConfig, explicit: Option<&Path>) -> PathBuf {
    match explicit {
        Some(dir) => dir.to_path_buf(),
        None => project_dir.join(&config.storage.json_dir),
    }
}

pub fn cmd_import(
    project_dir: &Path,
    config: &BoardConfig,
    from: Option<&Path>,
    force: bool,
) -> Result<()> {
    let dir = json_dir(project_dir, config, from);
    let snapshot = JsonDirStore::new(&dir)
        .read()?
        .with_context(|| format!("No snapshot found in {}", dir.display()))?;

    let db = open_db(project_dir, config)?;
    if !force && !db.is_empty()? {
        anyhow::bail!("Database already holds data; pass --force to replace it");
    }
    let summary = db.import_snapshot(&snapshot)?;
    tracing::info!(dir = %dir.display(), ?summary, "Snapshot imported");
    println!(
        "Imported {} users, {} projects, {} epics, {} stories, {} cards, {} sprints from {}",
        summary.users,
        summary.projects,
        summary.epics,
        summary.stories,
        summary.cards,
        summary.sprints,
        dir.display()
    );
    if summary.skipped > 0 {
        println!("Skipped {} records with missing parents", summary.skipped);
    }
    Ok(())
}

pub fn cmd_export(project_dir: &Path, config: &BoardConfig, to: Option<&Path>) -> Result<()> {
    let dir = json_dir(project_dir, config, to);
    let db = open_db(project_dir, config)?;
    let snapshot = db.export_snapshot()?;
    JsonDirStore::new(&dir).write(&snapshot)?;
    println!(
        "Exported {} projects and {} cards to {}",
        snapshot.projects.len(),
        snapshot.cards.len(),
        dir.display()
    );
    Ok(())
}

pub async fn cmd_notify_overdue(project_dir: &Path, config: &BoardConfig) -> Result<()> {
    let db = DbHandle::new(open_db(project_dir, config)?);
    let mailer = mailer_from_config(&config.notifications);
    let report = send_overdue_digest(
        &db,
        mailer.as_ref(),
        &config.notifications.base_url,
        Local::now().naive_local(),
    )
    .await?;
    println!(
        "{} overdue cards; digest sent to {} users ({} failed)",
        report.overdue_cards, report.sent, report.failed
    );
    Ok(())
}
