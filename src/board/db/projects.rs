use anyhow::{Context, Result};
use rusqlite::{OptionalExtension, Row, params};
use serde::Deserialize;

use super::{BoardDb, parse_enum};
use crate::board::models::*;
use crate::errors::BoardError;

const PROJECT_COLUMNS: &str = "id, name, description, archived, archived_at, archived_by, \
     created_by, created_at, start_date, end_date, budget";

const EPIC_COLUMNS: &str = "id, project_id, title, description, status, created_by, created_at";

const STORY_COLUMNS: &str =
    "id, epic_id, project_id, title, description, story_points, status, created_by, created_at";

fn project_from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        archived: row.get(3)?,
        archived_at: row.get(4)?,
        archived_by: row.get(5)?,
        created_by: row.get(6)?,
        created_at: row.get(7)?,
        start_date: row.get(8)?,
        end_date: row.get(9)?,
        budget: row.get(10)?,
    })
}

pub(super) struct EpicRow {
    id: i64,
    project_id: i64,
    title: String,
    description: String,
    status: String,
    created_by: Option<String>,
    created_at: String,
}

impl EpicRow {
    pub(super) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            project_id: row.get(1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            status: row.get(4)?,
            created_by: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    pub(super) fn into_epic(self) -> Result<Epic> {
        Ok(Epic {
            id: self.id,
            project_id: self.project_id,
            title: self.title,
            description: self.description,
            status: parse_enum(&self.status)?,
            created_by: self.created_by,
            created_at: self.created_at,
        })
    }
}

pub(super) struct StoryRow {
    id: i64,
    epic_id: Option<i64>,
    project_id: i64,
    title: String,
    description: String,
    story_points: Option<i64>,
    status: String,
    created_by: Option<String>,
    created_at: String,
}

impl StoryRow {
    pub(super) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            epic_id: row.get(1)?,
            project_id: row.get(2)?,
            title: row.get(3)?,
            description: row.get(4)?,
            story_points: row.get(5)?,
            status: row.get(6)?,
            created_by: row.get(7)?,
            created_at: row.get(8)?,
        })
    }

    pub(super) fn into_story(self) -> Result<Story> {
        Ok(Story {
            id: self.id,
            epic_id: self.epic_id,
            project_id: self.project_id,
            title: self.title,
            description: self.description,
            story_points: self.story_points,
            status: parse_enum(&self.status)?,
            created_by: self.created_by,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub budget: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<ItemStatus>,
    pub story_points: Option<i64>,
}

fn require_title(title: &str, what: &str) -> Result<()> {
    if title.trim().is_empty() {
        return Err(BoardError::invalid(format!("{} is required", what)).into());
    }
    Ok(())
}

impl BoardDb {
    // ── Project CRUD ──────────────────────────────────────────────────

    pub fn create_project(
        &self,
        name: &str,
        description: &str,
        created_by: Option<&str>,
    ) -> Result<Project> {
        require_title(name, "Project name")?;
        self.conn
            .execute(
                "INSERT INTO projects (name, description, created_by) VALUES (?1, ?2, ?3)",
                params![name.trim(), description, created_by],
            )
            .context("Failed to insert project")?;
        let id = self.conn.last_insert_rowid();
        self.get_project(id)?
            .context("Project not found after insert")
    }

    /// All projects, or only archived / only live ones.
    pub fn list_projects(&self, archived: Option<bool>) -> Result<Vec<Project>> {
        let sql = format!(
            "SELECT {} FROM projects WHERE (?1 IS NULL OR archived = ?1) ORDER BY id",
            PROJECT_COLUMNS
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("Failed to prepare list_projects")?;
        let rows = stmt
            .query_map(params![archived], project_from_row)
            .context("Failed to query projects")?;
        let mut projects = Vec::new();
        for row in rows {
            projects.push(row.context("Failed to read project row")?);
        }
        Ok(projects)
    }

    pub fn get_project(&self, id: i64) -> Result<Option<Project>> {
        let sql = format!("SELECT {} FROM projects WHERE id = ?1", PROJECT_COLUMNS);
        self.conn
            .query_row(&sql, params![id], project_from_row)
            .optional()
            .context("Failed to query project")
    }

    pub(crate) fn require_project(&self, id: i64) -> Result<Project> {
        self.get_project(id)?
            .ok_or_else(|| BoardError::not_found("Project", id).into())
    }

    pub fn update_project(&self, id: i64, update: &ProjectUpdate) -> Result<Project> {
        self.require_project(id)?;
        if let Some(name) = &update.name {
            require_title(name, "Project name")?;
        }
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        if let Some(n) = &update.name {
            tx.execute(
                "UPDATE projects SET name = ?1 WHERE id = ?2",
                params![n.trim(), id],
            )
            .context("Failed to update project name")?;
        }
        if let Some(d) = &update.description {
            tx.execute(
                "UPDATE projects SET description = ?1 WHERE id = ?2",
                params![d, id],
            )
            .context("Failed to update project description")?;
        }
        if let Some(s) = &update.start_date {
            tx.execute(
                "UPDATE projects SET start_date = NULLIF(?1, '') WHERE id = ?2",
                params![s, id],
            )
            .context("Failed to update project start_date")?;
        }
        if let Some(e) = &update.end_date {
            tx.execute(
                "UPDATE projects SET end_date = NULLIF(?1, '') WHERE id = ?2",
                params![e, id],
            )
            .context("Failed to update project end_date")?;
        }
        if let Some(b) = update.budget {
            tx.execute(
                "UPDATE projects SET budget = ?1 WHERE id = ?2",
                params![b, id],
            )
            .context("Failed to update project budget")?;
        }
        tx.commit().context("Failed to commit project update")?;
        self.require_project(id)
    }

    /// Archive or restore a project.
    pub fn set_project_archived(&self, id: i64, archived: bool, by: &str) -> Result<Project> {
        let count = if archived {
            self.conn.execute(
                "UPDATE projects SET archived = 1, archived_at = datetime('now'), archived_by = ?1
                 WHERE id = ?2",
                params![by, id],
            )
        } else {
            self.conn.execute(
                "UPDATE projects SET archived = 0, archived_at = NULL, archived_by = NULL
                 WHERE id = ?1",
                params![id],
            )
        }
        .context("Failed to update project archive flag")?;
        if count == 0 {
            return Err(BoardError::not_found("Project", id).into());
        }
        self.require_project(id)
    }

    // ── Epic CRUD ─────────────────────────────────────────────────────

    pub fn create_epic(
        &self,
        project_id: i64,
        title: &str,
        description: &str,
        created_by: Option<&str>,
    ) -> Result<Epic> {
        require_title(title, "Epic title")?;
        self.require_project(project_id)?;
        self.conn
            .execute(
                "INSERT INTO epics (project_id, title, description, created_by)
                 VALUES (?1, ?2, ?3, ?4)",
                params![project_id, title.trim(), description, created_by],
            )
            .context("Failed to insert epic")?;
        let id = self.conn.last_insert_rowid();
        self.get_epic(id)?.context("Epic not found after insert")
    }

    pub fn list_epics(&self, project_id: Option<i64>) -> Result<Vec<Epic>> {
        let sql = format!(
            "SELECT {} FROM epics WHERE (?1 IS NULL OR project_id = ?1) ORDER BY id",
            EPIC_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql).context("Failed to prepare list_epics")?;
        let rows = stmt
            .query_map(params![project_id], EpicRow::from_row)
            .context("Failed to query epics")?;
        let mut epics = Vec::new();
        for row in rows {
            epics.push(row.context("Failed to read epic row")?.into_epic()?);
        }
        Ok(epics)
    }

    pub fn get_epic(&self, id: i64) -> Result<Option<Epic>> {
        let sql = format!("SELECT {} FROM epics WHERE id = ?1", EPIC_COLUMNS);
        let row = self
            .conn
            .query_row(&sql, params![id], EpicRow::from_row)
            .optional()
            .context("Failed to query epic")?;
        row.map(EpicRow::into_epic).transpose()
    }

    pub fn update_epic(&self, id: i64, update: &ItemUpdate) -> Result<Epic> {
        if self.get_epic(id)?.is_none() {
            return Err(BoardError::not_found("Epic", id).into());
        }
        if let Some(t) = &update.title {
            require_title(t, "Epic title")?;
        }
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        if let Some(t) = &update.title {
            tx.execute("UPDATE epics SET title = ?1 WHERE id = ?2", params![t.trim(), id])
                .context("Failed to update epic title")?;
        }
        if let Some(d) = &update.description {
            tx.execute("UPDATE epics SET description = ?1 WHERE id = ?2", params![d, id])
                .context("Failed to update epic description")?;
        }
        if let Some(s) = update.status {
            tx.execute(
                "UPDATE epics SET status = ?1 WHERE id = ?2",
                params![s.as_str(), id],
            )
            .context("Failed to update epic status")?;
        }
        tx.commit().context("Failed to commit epic update")?;
        self.get_epic(id)?.context("Epic not found after update")
    }

    /// Delete an epic. Its stories and cards stay, detached.
    pub fn delete_epic(&self, id: i64) -> Result<bool> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        tx.execute(
            "DELETE FROM sprint_items WHERE item_type = 'epic' AND item_id = ?1",
            params![id],
        )
        .context("Failed to remove epic from sprints")?;
        let count = tx
            .execute("DELETE FROM epics WHERE id = ?1", params![id])
            .context("Failed to delete epic")?;
        tx.commit().context("Failed to commit epic delete")?;
        Ok(count > 0)
    }

    // ── Story CRUD ────────────────────────────────────────────────────

    /// Create a story under an epic (project taken from the epic) or directly
    /// under a project.
    pub fn create_story(
        &self,
        epic_id: Option<i64>,
        project_id: Option<i64>,
        title: &str,
        description: &str,
        story_points: Option<i64>,
        created_by: Option<&str>,
    ) -> Result<Story> {
        require_title(title, "Story title")?;
        let project_id = match epic_id {
            Some(eid) => {
                let epic = self
                    .get_epic(eid)?
                    .ok_or(BoardError::not_found("Epic", eid))?;
                if project_id.is_some_and(|p| p != epic.project_id) {
                    return Err(
                        BoardError::invalid("Epic belongs to a different project").into()
                    );
                }
                epic.project_id
            }
            None => {
                let pid = project_id
                    .ok_or_else(|| BoardError::invalid("Epic or project is required"))?;
                self.require_project(pid)?.id
            }
        };
        self.conn
            .execute(
                "INSERT INTO stories (epic_id, project_id, title, description, story_points, created_by)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![epic_id, project_id, title.trim(), description, story_points, created_by],
            )
            .context("Failed to insert story")?;
        let id = self.conn.last_insert_rowid();
        self.get_story(id)?.context("Story not found after insert")
    }

    pub fn list_stories(&self, project_id: Option<i64>, epic_id: Option<i64>) -> Result<Vec<Story>> {
        let sql = format!(
            "SELECT {} FROM stories
             WHERE (?1 IS NULL OR project_id = ?1) AND (?2 IS NULL OR epic_id = ?2)
             ORDER BY id",
            STORY_COLUMNS
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("Failed to prepare list_stories")?;
        let rows = stmt
            .query_map(params![project_id, epic_id], StoryRow::from_row)
            .context("Failed to query stories")?;
        let mut stories = Vec::new();
        for row in rows {
            stories.push(row.context("Failed to read story row")?.into_story()?);
        }
        Ok(stories)
    }

    pub fn get_story(&self, id: i64) -> Result<Option<Story>> {
        let sql = format!("SELECT {} FROM stories WHERE id = ?1", STORY_COLUMNS);
        let row = self
            .conn
            .query_row(&sql, params![id], StoryRow::from_row)
            .optional()
            .context("Failed to query story")?;
        row.map(StoryRow::into_story).transpose()
    }

    pub fn update_story(&self, id: i64, update: &ItemUpdate) -> Result<Story> {
        if self.get_story(id)?.is_none() {
            return Err(BoardError::not_found("Story", id).into());
        }
        if let Some(t) = &update.title {
            require_title(t, "Story title")?;
        }
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        if let Some(t) = &update.title {
            tx.execute("UPDATE stories SET title = ?1 WHERE id = ?2", params![t.trim(), id])
                .context("Failed to update story title")?;
        }
        if let Some(d) = &update.description {
            tx.execute("UPDATE stories SET description = ?1 WHERE id = ?2", params![d, id])
                .context("Failed to update story description")?;
        }
        if let Some(s) = update.status {
            tx.execute(
                "UPDATE stories SET status = ?1 WHERE id = ?2",
                params![s.as_str(), id],
            )
            .context("Failed to update story status")?;
        }
        if let Some(p) = update.story_points {
            tx.execute(
                "UPDATE stories SET story_points = ?1 WHERE id = ?2",
                params![p, id],
            )
            .context("Failed to update story points")?;
        }
        tx.commit().context("Failed to commit story update")?;
        self.get_story(id)?.context("Story not found after update")
    }

    /// Delete a story. Its cards stay, detached.
    pub fn delete_story(&self, id: i64) -> Result<bool> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        tx.execute(
            "DELETE FROM sprint_items WHERE item_type = 'story' AND item_id = ?1",
            params![id],
        )
        .context("Failed to remove story from sprints")?;
        let count = tx
            .execute("DELETE FROM stories WHERE id = ?1", params![id])
            .context("Failed to delete story")?;
        tx.commit().context("Failed to commit story delete")?;
        Ok(count > 0)
    }

    // ── Mind map ──────────────────────────────────────────────────────

    pub fn save_mindmap(
        &self,
        project_id: i64,
        nodes: &serde_json::Value,
        connections: &serde_json::Value,
    ) -> Result<MindMap> {
        self.require_project(project_id)?;
        self.conn
            .execute(
                "INSERT INTO mindmaps (project_id, nodes, connections) VALUES (?1, ?2, ?3)
                 ON CONFLICT(project_id) DO UPDATE SET
                    nodes = excluded.nodes,
                    connections = excluded.connections,
                    updated_at = datetime('now')",
                params![project_id, nodes.to_string(), connections.to_string()],
            )
            .context("Failed to save mind map")?;
        self.load_mindmap(project_id)
    }

    /// The project's mind map, or an empty one if none was saved.
    pub fn load_mindmap(&self, project_id: i64) -> Result<MindMap> {
        self.require_project(project_id)?;
        let row: Option<(String, String, String)> = self
            .conn
            .query_row(
                "SELECT nodes, connections, updated_at FROM mindmaps WHERE project_id = ?1",
                params![project_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .context("Failed to query mind map")?;
        match row {
            Some((nodes, connections, updated_at)) => Ok(MindMap {
                project_id,
                nodes: serde_json::from_str(&nodes).context("Invalid mind map nodes")?,
                connections: serde_json::from_str(&connections)
                    .context("Invalid mind map connections")?,
                updated_at: Some(updated_at),
            }),
            None => Ok(MindMap {
                project_id,
                nodes: serde_json::json!([]),
                connections: serde_json::json!([]),
                updated_at: None,
            }),
        }
    }
}
