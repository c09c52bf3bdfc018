//! Whole-store JSON snapshots in the per-collection layout used by the
//! `data/` directory and the remote document store.

use std::collections::{HashMap, HashSet};

use anyhow::{Context, Result};
use rusqlite::params;
use serde::{Deserialize, Serialize};

use super::BoardDb;
use super::cards::CommentRow;
use crate::board::dates::format_timestamp;
use crate::board::models::*;

/// Collection names, in dependency order. Each is one JSON array.
pub const COLLECTIONS: [&str; 9] = [
    "users",
    "projects",
    "epics",
    "stories",
    "cards",
    "comments",
    "notifications",
    "sprints",
    "mindmaps",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotUser {
    #[serde(flatten)]
    pub user: User,
    #[serde(default)]
    pub password_hash: String,
}

/// A sprint as stored on disk. Older files list members in `epics`,
/// `stories` and `issues` arrays instead of `items`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotSprint {
    #[serde(flatten)]
    pub sprint: Sprint,
    #[serde(default, skip_serializing)]
    pub epics: Vec<i64>,
    #[serde(default, skip_serializing)]
    pub stories: Vec<i64>,
    #[serde(default, skip_serializing)]
    pub issues: Vec<i64>,
}

impl SnapshotSprint {
    fn all_items(&self) -> Vec<SprintItem> {
        let legacy = [
            (SprintItemKind::Epic, &self.epics),
            (SprintItemKind::Story, &self.stories),
            (SprintItemKind::Card, &self.issues),
        ];
        let mut items = self.sprint.items.clone();
        for (kind, ids) in legacy {
            for id in ids {
                items.push(SprintItem {
                    kind,
                    id: *id,
                    added_by: None,
                    added_at: String::new(),
                });
            }
        }
        items
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub users: Vec<SnapshotUser>,
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub epics: Vec<Epic>,
    #[serde(default)]
    pub stories: Vec<Story>,
    #[serde(default)]
    pub cards: Vec<Card>,
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(default)]
    pub notifications: Vec<Notification>,
    #[serde(default)]
    pub sprints: Vec<SnapshotSprint>,
    #[serde(default)]
    pub mindmaps: Vec<MindMap>,
}

/// Row counts written by an import, plus records dropped because they
/// pointed at a parent that does not exist or repeated an id or username.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ImportSummary {
    pub users: usize,
    pub projects: usize,
    pub epics: usize,
    pub stories: usize,
    pub cards: usize,
    pub comments: usize,
    pub notifications: usize,
    pub sprints: usize,
    pub mindmaps: usize,
    pub skipped: usize,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.users.is_empty() && self.projects.is_empty()
    }

    /// Split into `(collection, array)` pairs.
    pub fn to_collections(&self) -> Result<Vec<(&'static str, serde_json::Value)>> {
        let value = serde_json::to_value(self).context("Failed to serialize snapshot")?;
        let mut object = match value {
            serde_json::Value::Object(map) => map,
            _ => anyhow::bail!("Snapshot did not serialize to an object"),
        };
        Ok(COLLECTIONS
            .iter()
            .map(|name| {
                let array = object
                    .remove(*name)
                    .unwrap_or_else(|| serde_json::Value::Array(Vec::new()));
                (*name, array)
            })
            .collect())
    }

    /// Reassemble from per-collection arrays. Missing collections are empty.
    pub fn from_collections(collections: HashMap<String, serde_json::Value>) -> Result<Self> {
        let object: serde_json::Map<String, serde_json::Value> = collections.into_iter().collect();
        serde_json::from_value(serde_json::Value::Object(object))
            .context("Failed to parse snapshot collections")
    }
}

/// Imported timestamps in the canonical `YYYY-MM-DD HH:MM:SS` form; blank is `None`.
fn stamp(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| format_timestamp(value))
}

/// The sprint that stays active in each project: the most recently started
/// one, ties going to the higher id. Older files could hold several.
fn latest_active_sprints(sprints: &[SnapshotSprint]) -> HashMap<i64, i64> {
    let mut latest: HashMap<i64, (Option<String>, i64)> = HashMap::new();
    for s in sprints
        .iter()
        .map(|entry| &entry.sprint)
        .filter(|s| s.status == SprintStatus::Active)
    {
        let key = (s.started_at.as_deref().and_then(stamp), s.id);
        match latest.get(&s.project_id) {
            Some(best) if *best >= key => {}
            _ => {
                latest.insert(s.project_id, key);
            }
        }
    }
    latest
        .into_iter()
        .map(|(project_id, (_, sprint_id))| (project_id, sprint_id))
        .collect()
}

impl BoardDb {
    /// Read the whole store.
    pub fn export_snapshot(&self) -> Result<Snapshot> {
        let mut hashes: HashMap<i64, String> = HashMap::new();
        {
            let mut stmt = self
                .conn
                .prepare("SELECT id, password_hash FROM users")
                .context("Failed to prepare password export")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
                .context("Failed to query password hashes")?;
            for row in rows {
                let (id, hash) = row.context("Failed to read password hash")?;
                hashes.insert(id, hash);
            }
        }
        let users = self
            .list_users(&UserFilter::default())?
            .into_iter()
            .map(|user| SnapshotUser {
                password_hash: hashes.remove(&user.id).unwrap_or_default(),
                user,
            })
            .collect();

        let mut comments = Vec::new();
        {
            let mut stmt = self
                .conn
                .prepare(
                    "SELECT id, card_id, author, content, mentions, created_at
                     FROM comments ORDER BY id",
                )
                .context("Failed to prepare comment export")?;
            let rows = stmt
                .query_map([], CommentRow::from_row)
                .context("Failed to query comments")?;
            for row in rows {
                comments.push(row.context("Failed to read comment row")?.into_comment()?);
            }
        }

        let mut notifications = Vec::new();
        {
            let mut stmt = self
                .conn
                .prepare("SELECT DISTINCT user_id FROM notifications ORDER BY user_id")
                .context("Failed to prepare notification export")?;
            let user_ids: Vec<i64> = stmt
                .query_map([], |row| row.get(0))
                .context("Failed to query notification owners")?
                .collect::<rusqlite::Result<_>>()
                .context("Failed to read notification owner")?;
            for user_id in user_ids {
                notifications.extend(self.list_notifications(user_id)?);
            }
            notifications.sort_by_key(|n| n.id);
        }

        let mut mindmaps = Vec::new();
        {
            let mut stmt = self
                .conn
                .prepare("SELECT project_id FROM mindmaps ORDER BY project_id")
                .context("Failed to prepare mind map export")?;
            let project_ids: Vec<i64> = stmt
                .query_map([], |row| row.get(0))
                .context("Failed to query mind maps")?
                .collect::<rusqlite::Result<_>>()
                .context("Failed to read mind map row")?;
            for project_id in project_ids {
                mindmaps.push(self.load_mindmap(project_id)?);
            }
        }

        Ok(Snapshot {
            users,
            projects: self.list_projects(None)?,
            epics: self.list_epics(None)?,
            stories: self.list_stories(None, None)?,
            cards: self.list_cards(&CardFilter::default())?,
            comments,
            notifications,
            sprints: self
                .list_sprints(None)?
                .into_iter()
                .map(|sprint| SnapshotSprint {
                    sprint,
                    epics: Vec::new(),
                    stories: Vec::new(),
                    issues: Vec::new(),
                })
                .collect(),
            mindmaps,
        })
    }

    /// Replace the store's content with a snapshot, keeping its ids.
    /// Links to missing parents are nulled where nullable; records whose
    /// required parent is missing are skipped.
    pub fn import_snapshot(&self, snapshot: &Snapshot) -> Result<ImportSummary> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        tx.execute_batch(
            "DELETE FROM sprint_items;
             DELETE FROM sprints;
             DELETE FROM notifications;
             DELETE FROM comments;
             DELETE FROM cards;
             DELETE FROM stories;
             DELETE FROM epics;
             DELETE FROM mindmaps;
             DELETE FROM projects;
             DELETE FROM sessions;
             DELETE FROM users;",
        )
        .context("Failed to clear store")?;

        let mut summary = ImportSummary::default();
        let mut user_ids = HashSet::new();
        let mut project_ids = HashSet::new();
        let mut epic_ids = HashSet::new();
        let mut story_ids = HashSet::new();
        let mut card_ids = HashSet::new();
        let mut sprint_ids = HashSet::new();
        let mut usernames = HashSet::new();
        let live_sprints = latest_active_sprints(&snapshot.sprints);

        for u in &snapshot.users {
            let user = &u.user;
            if user_ids.contains(&user.id) || !usernames.insert(user.username.as_str()) {
                summary.skipped += 1;
                continue;
            }
            user_ids.insert(user.id);
            tx.execute(
                "INSERT INTO users (id, username, password_hash, email, display_name, role, status,
                    email_notifications, created_at, last_login)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, COALESCE(?9, datetime('now')), ?10)",
                params![
                    user.id,
                    user.username,
                    u.password_hash,
                    user.email.as_deref().filter(|e| !e.is_empty()),
                    user.display_name,
                    user.role.as_str(),
                    user.status.as_str(),
                    user.email_notifications,
                    stamp(&user.created_at),
                    user.last_login.as_deref().and_then(stamp),
                ],
            )
            .with_context(|| format!("Failed to import user {}", user.username))?;
            summary.users += 1;
        }

        for p in &snapshot.projects {
            if !project_ids.insert(p.id) {
                summary.skipped += 1;
                continue;
            }
            tx.execute(
                "INSERT INTO projects (id, name, description, archived, archived_at, archived_by,
                    created_by, created_at, start_date, end_date, budget)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, COALESCE(?8, datetime('now')), ?9, ?10, ?11)",
                params![
                    p.id,
                    p.name,
                    p.description,
                    p.archived,
                    p.archived_at,
                    p.archived_by,
                    p.created_by,
                    stamp(&p.created_at),
                    p.start_date,
                    p.end_date,
                    p.budget,
                ],
            )
            .with_context(|| format!("Failed to import project {}", p.id))?;
            summary.projects += 1;
        }

        for e in &snapshot.epics {
            if !project_ids.contains(&e.project_id) || !epic_ids.insert(e.id) {
                summary.skipped += 1;
                continue;
            }
            tx.execute(
                "INSERT INTO epics (id, project_id, title, description, status, created_by, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, COALESCE(?7, datetime('now')))",
                params![
                    e.id,
                    e.project_id,
                    e.title,
                    e.description,
                    e.status.as_str(),
                    e.created_by,
                    stamp(&e.created_at),
                ],
            )
            .with_context(|| format!("Failed to import epic {}", e.id))?;
            summary.epics += 1;
        }

        for s in &snapshot.stories {
            if !project_ids.contains(&s.project_id) || !story_ids.insert(s.id) {
                summary.skipped += 1;
                continue;
            }
            let epic_id = s.epic_id.filter(|id| epic_ids.contains(id));
            tx.execute(
                "INSERT INTO stories (id, epic_id, project_id, title, description, story_points,
                    status, created_by, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, COALESCE(?9, datetime('now')))",
                params![
                    s.id,
                    epic_id,
                    s.project_id,
                    s.title,
                    s.description,
                    s.story_points,
                    s.status.as_str(),
                    s.created_by,
                    stamp(&s.created_at),
                ],
            )
            .with_context(|| format!("Failed to import story {}", s.id))?;
            summary.stories += 1;
        }

        for c in &snapshot.cards {
            if !project_ids.contains(&c.project_id) || !card_ids.insert(c.id) {
                summary.skipped += 1;
                continue;
            }
            let labels = serde_json::to_string(&c.labels).context("Failed to encode labels")?;
            tx.execute(
                "INSERT INTO cards (id, project_id, epic_id, story_id, title, description, status,
                    priority, assignee, due_date, labels, created_by, created_at, updated_at,
                    updated_by, completed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                    COALESCE(?13, datetime('now')), ?14, ?15, ?16)",
                params![
                    c.id,
                    c.project_id,
                    c.epic_id.filter(|id| epic_ids.contains(id)),
                    c.story_id.filter(|id| story_ids.contains(id)),
                    c.title,
                    c.description,
                    c.status.as_str(),
                    c.priority.as_str(),
                    c.assignee,
                    c.due_date,
                    labels,
                    c.created_by,
                    stamp(&c.created_at),
                    c.updated_at.as_deref().and_then(stamp),
                    c.updated_by,
                    c.completed_at.as_deref().and_then(stamp),
                ],
            )
            .with_context(|| format!("Failed to import card {}", c.id))?;
            summary.cards += 1;
        }

        for c in &snapshot.comments {
            if !card_ids.contains(&c.card_id) {
                summary.skipped += 1;
                continue;
            }
            let mentions = serde_json::to_string(&c.mentions).context("Failed to encode mentions")?;
            tx.execute(
                "INSERT OR IGNORE INTO comments (id, card_id, author, content, mentions, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, COALESCE(?6, datetime('now')))",
                params![
                    c.id,
                    c.card_id,
                    c.author,
                    c.content,
                    mentions,
                    stamp(&c.created_at)
                ],
            )
            .with_context(|| format!("Failed to import comment {}", c.id))?;
            summary.comments += 1;
        }

        for n in &snapshot.notifications {
            if !user_ids.contains(&n.user_id) {
                summary.skipped += 1;
                continue;
            }
            tx.execute(
                "INSERT OR IGNORE INTO notifications (id, user_id, kind, message, card_id, read, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, COALESCE(?7, datetime('now')))",
                params![
                    n.id,
                    n.user_id,
                    n.kind.as_str(),
                    n.message,
                    n.card_id.filter(|id| card_ids.contains(id)),
                    n.read,
                    stamp(&n.created_at),
                ],
            )
            .with_context(|| format!("Failed to import notification {}", n.id))?;
            summary.notifications += 1;
        }

        for entry in &snapshot.sprints {
            let s = &entry.sprint;
            if !project_ids.contains(&s.project_id) || !sprint_ids.insert(s.id) {
                summary.skipped += 1;
                continue;
            }
            let mut status = s.status;
            let mut completed_at = s.completed_at.as_deref().and_then(stamp);
            if status == SprintStatus::Active && live_sprints.get(&s.project_id) != Some(&s.id) {
                tracing::warn!(
                    sprint_id = s.id,
                    project_id = s.project_id,
                    "Project already has a newer active sprint; importing as completed"
                );
                status = SprintStatus::Completed;
                completed_at = completed_at.or_else(|| s.started_at.as_deref().and_then(stamp));
            }
            tx.execute(
                "INSERT INTO sprints (id, project_id, name, description, goal, story_points,
                    start_date, end_date, status, created_by, created_at, started_at, completed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                    COALESCE(?11, datetime('now')), ?12, ?13)",
                params![
                    s.id,
                    s.project_id,
                    s.name,
                    s.description,
                    s.goal,
                    s.story_points,
                    s.start_date,
                    s.end_date,
                    status.as_str(),
                    s.created_by,
                    stamp(&s.created_at),
                    s.started_at.as_deref().and_then(stamp),
                    completed_at,
                ],
            )
            .with_context(|| format!("Failed to import sprint {}", s.id))?;
            for item in entry.all_items() {
                let exists = match item.kind {
                    SprintItemKind::Epic => epic_ids.contains(&item.id),
                    SprintItemKind::Story => story_ids.contains(&item.id),
                    SprintItemKind::Card => card_ids.contains(&item.id),
                };
                if !exists {
                    continue;
                }
                tx.execute(
                    "INSERT OR IGNORE INTO sprint_items (sprint_id, item_type, item_id, added_by, added_at)
                     VALUES (?1, ?2, ?3, ?4, COALESCE(?5, datetime('now')))",
                    params![
                        s.id,
                        item.kind.as_str(),
                        item.id,
                        item.added_by,
                        stamp(&item.added_at)
                    ],
                )
                .with_context(|| format!("Failed to import item of sprint {}", s.id))?;
            }
            summary.sprints += 1;
        }

        for m in &snapshot.mindmaps {
            if !project_ids.contains(&m.project_id) {
                summary.skipped += 1;
                continue;
            }
            tx.execute(
                "INSERT OR REPLACE INTO mindmaps (project_id, nodes, connections, updated_at)
                 VALUES (?1, ?2, ?3, COALESCE(?4, datetime('now')))",
                params![
                    m.project_id,
                    m.nodes.to_string(),
                    m.connections.to_string(),
                    m.updated_at.as_deref().and_then(stamp),
                ],
            )
            .with_context(|| format!("Failed to import mind map of project {}", m.project_id))?;
            summary.mindmaps += 1;
        }

        tx.commit().context("Failed to commit import")?;
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::db::NewUser;

    fn populated() -> Result<BoardDb> {
        let db = BoardDb::new_in_memory()?;
        db.seed_defaults("$2b$04$hash")?;
        db.create_user(&NewUser {
            username: "bob".into(),
            email: Some("bob@example.com".into()),
            display_name: Some("Bob".into()),
            password_hash: "bobhash".into(),
            role: Role::User,
            status: UserStatus::Active,
        })?;
        let p = db.list_projects(None)?[0].clone();
        let e = db.create_epic(p.id, "Epic", "", Some("admin"))?;
        let s = db.create_story(Some(e.id), None, "Story", "", Some(2), None)?;
        let card = db.create_card(
            &NewCard {
                story_id: Some(s.id),
                title: "Card".into(),
                labels: vec!["bug".into()],
                ..Default::default()
            },
            "admin",
        )?;
        db.add_comment(card.id, "admin", "ping @bob")?;
        let sprint = db.create_sprint(
            &NewSprint {
                project_id: p.id,
                name: "S1".into(),
                ..Default::default()
            },
            "admin",
        )?;
        db.add_sprint_items(
            sprint.id,
            &SprintItemsRequest {
                card_ids: vec![card.id],
                ..Default::default()
            },
            "admin",
        )?;
        db.save_mindmap(p.id, &serde_json::json!([{"id": "a"}]), &serde_json::json!([]))?;
        Ok(db)
    }

    #[test]
    fn test_export_then_import_into_fresh_store() -> Result<()> {
        let source = populated()?;
        let snapshot = source.export_snapshot()?;
        assert_eq!(snapshot.users.len(), 2);
        assert_eq!(snapshot.notifications.len(), 1);
        assert_eq!(snapshot.users[1].password_hash, "bobhash");

        let target = BoardDb::new_in_memory()?;
        let summary = target.import_snapshot(&snapshot)?;
        assert_eq!(summary.users, 2);
        assert_eq!(summary.cards, 1);
        assert_eq!(summary.skipped, 0);

        let (_, hash) = target.get_credentials("bob")?.expect("bob imported");
        assert_eq!(hash, "bobhash");
        let sprint = &target.list_sprints(None)?[0];
        assert_eq!(sprint.items.len(), 1);
        let card = &target.list_cards(&CardFilter::default())?[0];
        assert_eq!(card.labels, vec!["bug".to_string()]);
        assert_eq!(target.load_mindmap(card.project_id)?.nodes[0]["id"], "a");
        Ok(())
    }

    #[test]
    fn test_import_replaces_existing_content() -> Result<()> {
        let db = populated()?;
        let summary = db.import_snapshot(&Snapshot::default())?;
        assert_eq!(summary, ImportSummary::default());
        assert!(db.is_empty()?);
        Ok(())
    }

    #[test]
    fn test_import_nulls_dangling_links_and_skips_orphans() -> Result<()> {
        let snapshot: Snapshot = serde_json::from_value(serde_json::json!({
            "projects": [{"id": 1, "name": "P"}],
            "epics": [{"id": 1, "project_id": 1, "name": "E", "status": "active"}],
            "stories": [{"id": 1, "epic_id": 42, "project_id": 1, "title": "S"}],
            "cards": [
                {"id": 1, "project_id": 1, "epic_id": 1, "story_id": 9, "title": "C",
                 "priority": "High", "assignee": "", "due_date": ""},
                {"id": 2, "project_id": 77, "title": "Lost"}
            ],
            "comments": [{"id": 1, "card_id": 2, "author": "a", "content": "x"}],
            "sprints": [{"id": 1, "project_id": 1, "name": "Old", "status": "planning",
                         "issues": [1, 2], "epics": [1]}]
        }))?;
        let db = BoardDb::new_in_memory()?;
        let summary = db.import_snapshot(&snapshot)?;
        assert_eq!(summary.cards, 1);
        assert_eq!(summary.skipped, 2);

        let story = db.get_story(1)?.expect("story imported");
        assert_eq!(story.epic_id, None);
        let card = db.get_card(1)?.expect("card imported");
        assert_eq!(card.story_id, None);
        assert_eq!(card.epic_id, Some(1));
        assert_eq!(card.priority, Priority::High);
        assert_eq!(card.assignee, None);
        assert_eq!(db.get_epic(1)?.expect("epic").status, ItemStatus::InProgress);

        let sprint = db.require_sprint(1)?;
        assert_eq!(sprint.item_ids(SprintItemKind::Card), vec![1]);
        assert_eq!(sprint.item_ids(SprintItemKind::Epic), vec![1]);
        Ok(())
    }

    #[test]
    fn test_import_keeps_one_active_sprint_per_project() -> Result<()> {
        let snapshot: Snapshot = serde_json::from_value(serde_json::json!({
            "users": [
                {"id": 1, "username": "ann"},
                {"id": 2, "username": "ann"},
                {"id": 1, "username": "bob"}
            ],
            "projects": [{"id": 1, "name": "P"}],
            "sprints": [
                {"id": 1, "project_id": 1, "name": "Old", "status": "active",
                 "started_at": "2024-01-01T09:00:00"},
                {"id": 2, "project_id": 1, "name": "New", "status": "active",
                 "started_at": "2024-02-01T09:00:00"},
                {"id": 2, "project_id": 1, "name": "Copy", "status": "planning"}
            ]
        }))?;
        let db = BoardDb::new_in_memory()?;
        let summary = db.import_snapshot(&snapshot)?;
        assert_eq!(summary.users, 1);
        assert_eq!(summary.sprints, 2);
        assert_eq!(summary.skipped, 3);

        let old = db.require_sprint(1)?;
        assert_eq!(old.status, SprintStatus::Completed);
        assert_eq!(old.completed_at.as_deref(), Some("2024-01-01 09:00:00"));
        let new = db.require_sprint(2)?;
        assert_eq!(new.status, SprintStatus::Active);
        assert_eq!(new.name, "New");
        Ok(())
    }

    #[test]
    fn test_ids_continue_after_import() -> Result<()> {
        let snapshot: Snapshot = serde_json::from_value(serde_json::json!({
            "projects": [{"id": 40, "name": "P"}]
        }))?;
        let db = BoardDb::new_in_memory()?;
        db.import_snapshot(&snapshot)?;
        let next = db.create_project("Next", "", None)?;
        assert_eq!(next.id, 41);
        Ok(())
    }

    #[test]
    fn test_collections_split_and_join() -> Result<()> {
        let db = populated()?;
        let snapshot = db.export_snapshot()?;
        let collections = snapshot.to_collections()?;
        assert_eq!(collections.len(), COLLECTIONS.len());
        let users = &collections[0];
        assert_eq!(users.0, "users");
        assert!(users.1[0].get("password_hash").is_some());
        // Legacy sprint arrays are never written back.
        let sprints = &collections[7].1;
        assert!(sprints[0].get("issues").is_none());

        let map = collections
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect();
        let rebuilt = Snapshot::from_collections(map)?;
        assert_eq!(rebuilt.cards.len(), snapshot.cards.len());
        assert_eq!(rebuilt.sprints[0].sprint.items.len(), 1);
        Ok(())
    }
}
