use anyhow::{Context, Result};
use rusqlite::{OptionalExtension, Row, params};

use super::{BoardDb, parse_enum};
use crate::board::dates::normalize_due_date;
use crate::board::models::*;
use crate::errors::BoardError;

const SPRINT_COLUMNS: &str = "id, project_id, name, description, goal, story_points, start_date, \
     end_date, status, created_by, created_at, started_at, completed_at";

pub(super) struct SprintRow {
    id: i64,
    project_id: i64,
    name: String,
    description: String,
    goal: Option<String>,
    story_points: Option<i64>,
    start_date: Option<String>,
    end_date: Option<String>,
    status: String,
    created_by: Option<String>,
    created_at: String,
    started_at: Option<String>,
    completed_at: Option<String>,
}

impl SprintRow {
    pub(super) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            project_id: row.get(1)?,
            name: row.get(2)?,
            description: row.get(3)?,
            goal: row.get(4)?,
            story_points: row.get(5)?,
            start_date: row.get(6)?,
            end_date: row.get(7)?,
            status: row.get(8)?,
            created_by: row.get(9)?,
            created_at: row.get(10)?,
            started_at: row.get(11)?,
            completed_at: row.get(12)?,
        })
    }

    /// Items are loaded separately.
    pub(super) fn into_sprint(self) -> Result<Sprint> {
        Ok(Sprint {
            id: self.id,
            project_id: self.project_id,
            name: self.name,
            description: self.description,
            goal: self.goal,
            story_points: self.story_points,
            start_date: self.start_date,
            end_date: self.end_date,
            status: parse_enum(&self.status)?,
            created_by: self.created_by,
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            items: Vec::new(),
        })
    }
}

/// Both dates must parse, and the sprint cannot end before it starts.
fn check_sprint_dates(
    start: Option<&str>,
    end: Option<&str>,
) -> Result<(Option<String>, Option<String>)> {
    let start = normalize_due_date(start)?;
    let end = normalize_due_date(end)?;
    if let (Some(s), Some(e)) = (&start, &end)
        && e < s
    {
        return Err(
            BoardError::invalid("Sprint end date must be on or after its start date").into(),
        );
    }
    Ok((start, end))
}

impl BoardDb {
    pub fn create_sprint(&self, new: &NewSprint, created_by: &str) -> Result<Sprint> {
        if new.name.trim().is_empty() {
            return Err(BoardError::invalid("Sprint name is required").into());
        }
        self.require_project(new.project_id)?;
        let (start, end) = check_sprint_dates(new.start_date.as_deref(), new.end_date.as_deref())?;
        self.conn
            .execute(
                "INSERT INTO sprints (project_id, name, description, goal, story_points,
                    start_date, end_date, created_by)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    new.project_id,
                    new.name.trim(),
                    new.description,
                    new.goal,
                    new.story_points,
                    start,
                    end,
                    created_by,
                ],
            )
            .context("Failed to insert sprint")?;
        let id = self.conn.last_insert_rowid();
        self.require_sprint(id)
    }

    pub fn get_sprint(&self, id: i64) -> Result<Option<Sprint>> {
        let sql = format!("SELECT {} FROM sprints WHERE id = ?1", SPRINT_COLUMNS);
        let row = self
            .conn
            .query_row(&sql, params![id], SprintRow::from_row)
            .optional()
            .context("Failed to query sprint")?;
        match row {
            Some(row) => {
                let mut sprint = row.into_sprint()?;
                sprint.items = self.sprint_items(id)?;
                Ok(Some(sprint))
            }
            None => Ok(None),
        }
    }

    pub(crate) fn require_sprint(&self, id: i64) -> Result<Sprint> {
        self.get_sprint(id)?
            .ok_or_else(|| BoardError::not_found("Sprint", id).into())
    }

    pub fn list_sprints(&self, project_id: Option<i64>) -> Result<Vec<Sprint>> {
        let sql = format!(
            "SELECT {} FROM sprints WHERE (?1 IS NULL OR project_id = ?1) ORDER BY id",
            SPRINT_COLUMNS
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("Failed to prepare list_sprints")?;
        let rows = stmt
            .query_map(params![project_id], SprintRow::from_row)
            .context("Failed to query sprints")?;
        let mut sprints = Vec::new();
        for row in rows {
            let mut sprint = row.context("Failed to read sprint row")?.into_sprint()?;
            sprint.items = self.sprint_items(sprint.id)?;
            sprints.push(sprint);
        }
        Ok(sprints)
    }

    fn sprint_items(&self, sprint_id: i64) -> Result<Vec<SprintItem>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT item_type, item_id, added_by, added_at FROM sprint_items
                 WHERE sprint_id = ?1 ORDER BY added_at, rowid",
            )
            .context("Failed to prepare sprint_items")?;
        let rows = stmt
            .query_map(params![sprint_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .context("Failed to query sprint items")?;
        let mut items = Vec::new();
        for row in rows {
            let (kind, id, added_by, added_at) = row.context("Failed to read sprint item")?;
            items.push(SprintItem {
                kind: parse_enum(&kind)?,
                id,
                added_by,
                added_at,
            });
        }
        Ok(items)
    }

    pub fn update_sprint(&self, id: i64, update: &SprintUpdate) -> Result<Sprint> {
        let sprint = self.require_sprint(id)?;
        if let Some(n) = &update.name
            && n.trim().is_empty()
        {
            return Err(BoardError::invalid("Sprint name is required").into());
        }
        let (start, end) = check_sprint_dates(
            update.start_date.as_deref().or(sprint.start_date.as_deref()),
            update.end_date.as_deref().or(sprint.end_date.as_deref()),
        )?;

        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        if let Some(n) = &update.name {
            tx.execute("UPDATE sprints SET name = ?1 WHERE id = ?2", params![n.trim(), id])
                .context("Failed to update sprint name")?;
        }
        if let Some(d) = &update.description {
            tx.execute(
                "UPDATE sprints SET description = ?1 WHERE id = ?2",
                params![d, id],
            )
            .context("Failed to update sprint description")?;
        }
        if let Some(g) = &update.goal {
            tx.execute("UPDATE sprints SET goal = ?1 WHERE id = ?2", params![g, id])
                .context("Failed to update sprint goal")?;
        }
        if let Some(p) = update.story_points {
            tx.execute(
                "UPDATE sprints SET story_points = ?1 WHERE id = ?2",
                params![p, id],
            )
            .context("Failed to update sprint story points")?;
        }
        tx.execute(
            "UPDATE sprints SET start_date = ?1, end_date = ?2 WHERE id = ?3",
            params![start, end, id],
        )
        .context("Failed to update sprint dates")?;
        tx.commit().context("Failed to commit sprint update")?;
        self.require_sprint(id)
    }

    /// planning → active. One active sprint per project.
    pub fn start_sprint(&self, id: i64) -> Result<Sprint> {
        let sprint = self.require_sprint(id)?;
        match sprint.status {
            SprintStatus::Active => {
                return Err(
                    BoardError::InvalidTransition("Sprint is already active".into()).into(),
                );
            }
            SprintStatus::Completed => {
                return Err(BoardError::InvalidTransition(
                    "Completed sprints cannot be restarted".into(),
                )
                .into());
            }
            SprintStatus::Planning => {}
        }
        let active: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM sprints WHERE project_id = ?1 AND status = 'active'",
                params![sprint.project_id],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to check for active sprint")?;
        if let Some(other) = active {
            return Err(BoardError::conflict(format!(
                "Project already has an active sprint ({})",
                other
            ))
            .into());
        }
        self.conn
            .execute(
                "UPDATE sprints SET status = 'active', started_at = datetime('now') WHERE id = ?1",
                params![id],
            )
            .context("Failed to start sprint")?;
        self.require_sprint(id)
    }

    /// active → completed.
    pub fn complete_sprint(&self, id: i64) -> Result<Sprint> {
        let sprint = self.require_sprint(id)?;
        if sprint.status != SprintStatus::Active {
            return Err(
                BoardError::InvalidTransition("Only active sprints can be completed".into())
                    .into(),
            );
        }
        self.conn
            .execute(
                "UPDATE sprints SET status = 'completed', completed_at = datetime('now')
                 WHERE id = ?1",
                params![id],
            )
            .context("Failed to complete sprint")?;
        self.require_sprint(id)
    }

    pub fn delete_sprint(&self, id: i64) -> Result<()> {
        let sprint = self.require_sprint(id)?;
        if sprint.status == SprintStatus::Active {
            return Err(
                BoardError::InvalidTransition("Cannot delete an active sprint".into()).into(),
            );
        }
        self.conn
            .execute("DELETE FROM sprints WHERE id = ?1", params![id])
            .context("Failed to delete sprint")?;
        Ok(())
    }

    /// Project id of an epic, story or card, if it exists.
    fn item_project(&self, kind: SprintItemKind, item_id: i64) -> Result<Option<i64>> {
        Ok(match kind {
            SprintItemKind::Epic => self.get_epic(item_id)?.map(|e| e.project_id),
            SprintItemKind::Story => self.get_story(item_id)?.map(|s| s.project_id),
            SprintItemKind::Card => self.get_card(item_id)?.map(|c| c.project_id),
        })
    }

    /// Attach items to a sprint. Every item must exist and belong to the
    /// sprint's project; items already attached are skipped.
    pub fn add_sprint_items(
        &self,
        sprint_id: i64,
        request: &SprintItemsRequest,
        added_by: &str,
    ) -> Result<Sprint> {
        let sprint = self.require_sprint(sprint_id)?;
        if sprint.status == SprintStatus::Completed {
            return Err(BoardError::InvalidTransition(
                "Cannot add items to a completed sprint".into(),
            )
            .into());
        }
        for (kind, item_id) in request.iter() {
            match self.item_project(kind, item_id)? {
                None => return Err(BoardError::not_found(kind.label(), item_id).into()),
                Some(p) if p != sprint.project_id => {
                    return Err(BoardError::invalid(format!(
                        "{} {} belongs to a different project",
                        kind.label(),
                        item_id
                    ))
                    .into());
                }
                Some(_) => {}
            }
        }

        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        for (kind, item_id) in request.iter() {
            tx.execute(
                "INSERT OR IGNORE INTO sprint_items (sprint_id, item_type, item_id, added_by)
                 VALUES (?1, ?2, ?3, ?4)",
                params![sprint_id, kind.as_str(), item_id, added_by],
            )
            .context("Failed to add sprint item")?;
        }
        tx.commit().context("Failed to commit sprint items")?;
        self.require_sprint(sprint_id)
    }

    /// Detach an item. Detaching something not in the sprint is a no-op.
    pub fn remove_sprint_item(
        &self,
        sprint_id: i64,
        kind: SprintItemKind,
        item_id: i64,
    ) -> Result<Sprint> {
        self.require_sprint(sprint_id)?;
        self.conn
            .execute(
                "DELETE FROM sprint_items WHERE sprint_id = ?1 AND item_type = ?2 AND item_id = ?3",
                params![sprint_id, kind.as_str(), item_id],
            )
            .context("Failed to remove sprint item")?;
        self.require_sprint(sprint_id)
    }

    /// The sprint's items resolved to their records, in the order added.
    pub fn sprint_item_details(&self, sprint_id: i64) -> Result<Vec<SprintItemDetail>> {
        let sprint = self.require_sprint(sprint_id)?;
        let mut details = Vec::with_capacity(sprint.items.len());
        for item in &sprint.items {
            let detail = match item.kind {
                SprintItemKind::Epic => self.get_epic(item.id)?.map(SprintItemDetail::Epic),
                SprintItemKind::Story => self.get_story(item.id)?.map(SprintItemDetail::Story),
                SprintItemKind::Card => self.get_card(item.id)?.map(SprintItemDetail::Card),
            };
            if let Some(detail) = detail {
                details.push(detail);
            }
        }
        Ok(details)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Result<(BoardDb, Project)> {
        let db = BoardDb::new_in_memory()?;
        let project = db.create_project("P", "", None)?;
        Ok((db, project))
    }

    fn sprint(db: &BoardDb, project_id: i64, name: &str) -> Result<Sprint> {
        db.create_sprint(
            &NewSprint {
                project_id,
                name: name.to_string(),
                start_date: Some("2024-06-01".into()),
                end_date: Some("2024-06-14".into()),
                ..Default::default()
            },
            "admin",
        )
    }

    fn transition_message(err: &anyhow::Error) -> Option<&str> {
        match err.downcast_ref::<BoardError>() {
            Some(BoardError::InvalidTransition(msg)) => Some(msg.as_str()),
            _ => None,
        }
    }

    #[test]
    fn test_create_sprint_validates() -> Result<()> {
        let (db, p) = setup()?;
        let s = sprint(&db, p.id, "Sprint 1")?;
        assert_eq!(s.status, SprintStatus::Planning);
        assert!(s.items.is_empty());

        let err = db
            .create_sprint(
                &NewSprint {
                    project_id: p.id,
                    name: "Backwards".into(),
                    start_date: Some("2024-06-14".into()),
                    end_date: Some("2024-06-01".into()),
                    ..Default::default()
                },
                "admin",
            )
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Sprint end date must be on or after its start date"
        );
        assert!(sprint(&db, 999, "Orphan").is_err());
        Ok(())
    }

    #[test]
    fn test_sprint_lifecycle() -> Result<()> {
        let (db, p) = setup()?;
        let s = sprint(&db, p.id, "Sprint 1")?;

        let err = db.complete_sprint(s.id).unwrap_err();
        assert_eq!(
            transition_message(&err),
            Some("Only active sprints can be completed")
        );

        let active = db.start_sprint(s.id)?;
        assert_eq!(active.status, SprintStatus::Active);
        assert!(active.started_at.is_some());

        let err = db.start_sprint(s.id).unwrap_err();
        assert_eq!(transition_message(&err), Some("Sprint is already active"));
        let err = db.delete_sprint(s.id).unwrap_err();
        assert_eq!(transition_message(&err), Some("Cannot delete an active sprint"));

        let done = db.complete_sprint(s.id)?;
        assert_eq!(done.status, SprintStatus::Completed);
        assert!(done.completed_at.is_some());

        let err = db.start_sprint(s.id).unwrap_err();
        assert!(transition_message(&err).is_some());

        db.delete_sprint(s.id)?;
        assert!(db.get_sprint(s.id)?.is_none());
        Ok(())
    }

    #[test]
    fn test_one_active_sprint_per_project() -> Result<()> {
        let (db, p) = setup()?;
        let other = db.create_project("Other", "", None)?;
        let a = sprint(&db, p.id, "A")?;
        let b = sprint(&db, p.id, "B")?;
        let c = sprint(&db, other.id, "C")?;

        db.start_sprint(a.id)?;
        let err = db.start_sprint(b.id).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BoardError>(),
            Some(BoardError::Conflict(_))
        ));
        db.start_sprint(c.id)?;

        db.complete_sprint(a.id)?;
        db.start_sprint(b.id)?;
        Ok(())
    }

    #[test]
    fn test_sprint_items() -> Result<()> {
        let (db, p) = setup()?;
        let other = db.create_project("Other", "", None)?;
        let s = sprint(&db, p.id, "S")?;
        let epic = db.create_epic(p.id, "E", "", None)?;
        let story = db.create_story(Some(epic.id), None, "St", "", Some(3), None)?;
        let card = db.create_card(
            &NewCard {
                project_id: Some(p.id),
                title: "C".into(),
                ..Default::default()
            },
            "admin",
        )?;

        let request = SprintItemsRequest {
            epic_ids: vec![epic.id],
            story_ids: vec![story.id],
            card_ids: vec![card.id],
        };
        let updated = db.add_sprint_items(s.id, &request, "admin")?;
        assert_eq!(updated.items.len(), 3);
        // Re-adding is idempotent.
        let updated = db.add_sprint_items(s.id, &request, "admin")?;
        assert_eq!(updated.items.len(), 3);
        assert_eq!(updated.item_ids(SprintItemKind::Card), vec![card.id]);

        let details = db.sprint_item_details(s.id)?;
        assert!(matches!(details[0], SprintItemDetail::Epic(_)));
        assert!(matches!(details[2], SprintItemDetail::Card(_)));

        let foreign = db.create_epic(other.id, "Foreign", "", None)?;
        let err = db
            .add_sprint_items(
                s.id,
                &SprintItemsRequest {
                    epic_ids: vec![foreign.id],
                    ..Default::default()
                },
                "admin",
            )
            .unwrap_err();
        assert!(err.to_string().contains("different project"));

        let updated = db.remove_sprint_item(s.id, SprintItemKind::Story, story.id)?;
        assert_eq!(updated.items.len(), 2);
        let updated = db.remove_sprint_item(s.id, SprintItemKind::Story, story.id)?;
        assert_eq!(updated.items.len(), 2);

        // Deleting the card drops it from the sprint.
        db.delete_card(card.id)?;
        assert_eq!(db.require_sprint(s.id)?.items.len(), 1);
        Ok(())
    }

    #[test]
    fn test_update_sprint_keeps_dates_consistent() -> Result<()> {
        let (db, p) = setup()?;
        let s = sprint(&db, p.id, "S")?;
        let updated = db.update_sprint(
            s.id,
            &SprintUpdate {
                goal: Some("Ship checkout".into()),
                end_date: Some("2024-06-21".into()),
                ..Default::default()
            },
        )?;
        assert_eq!(updated.goal.as_deref(), Some("Ship checkout"));
        assert_eq!(updated.end_date.as_deref(), Some("2024-06-21"));
        assert_eq!(updated.start_date.as_deref(), Some("2024-06-01"));

        let err = db
            .update_sprint(
                s.id,
                &SprintUpdate {
                    end_date: Some("2024-05-01".into()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(err.to_string().contains("end date"));
        Ok(())
    }

    #[test]
    fn test_list_sprints_by_project() -> Result<()> {
        let (db, p) = setup()?;
        let other = db.create_project("Other", "", None)?;
        sprint(&db, p.id, "A")?;
        sprint(&db, other.id, "B")?;
        assert_eq!(db.list_sprints(None)?.len(), 2);
        assert_eq!(db.list_sprints(Some(p.id))?.len(), 1);
        Ok(())
    }
}
