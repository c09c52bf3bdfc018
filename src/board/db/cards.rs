use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{OptionalExtension, Row, params};

use super::{BoardDb, parse_enum, parse_string_list};
use crate::board::dates::{self, normalize_due_date};
use crate::board::models::*;
use crate::board::notify::extract_mentions;
use crate::errors::BoardError;

pub(super) const CARD_COLUMNS: &str = "id, project_id, epic_id, story_id, title, description, \
     status, priority, assignee, due_date, labels, created_by, created_at, updated_at, \
     updated_by, completed_at";

const COMMENT_COLUMNS: &str = "id, card_id, author, content, mentions, created_at";

const NOTIFICATION_COLUMNS: &str = "id, user_id, kind, message, card_id, read, created_at";

/// Sets `status` and keeps `completed_at` in step: stamped on entering
/// `done`, cleared on leaving it.
const SET_STATUS_SQL: &str = "UPDATE cards SET status = ?1,
        completed_at = CASE WHEN ?1 = 'done' THEN COALESCE(completed_at, datetime('now')) ELSE NULL END,
        updated_at = datetime('now'), updated_by = ?2
     WHERE id = ?3";

pub(super) struct CardRow {
    id: i64,
    project_id: i64,
    epic_id: Option<i64>,
    story_id: Option<i64>,
    title: String,
    description: String,
    status: String,
    priority: String,
    assignee: Option<String>,
    due_date: Option<String>,
    labels: String,
    created_by: Option<String>,
    created_at: String,
    updated_at: Option<String>,
    updated_by: Option<String>,
    completed_at: Option<String>,
}

impl CardRow {
    pub(super) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            project_id: row.get(1)?,
            epic_id: row.get(2)?,
            story_id: row.get(3)?,
            title: row.get(4)?,
            description: row.get(5)?,
            status: row.get(6)?,
            priority: row.get(7)?,
            assignee: row.get(8)?,
            due_date: row.get(9)?,
            labels: row.get(10)?,
            created_by: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
            updated_by: row.get(14)?,
            completed_at: row.get(15)?,
        })
    }

    pub(super) fn into_card(self) -> Result<Card> {
        Ok(Card {
            id: self.id,
            project_id: self.project_id,
            epic_id: self.epic_id,
            story_id: self.story_id,
            title: self.title,
            description: self.description,
            status: parse_enum(&self.status)?,
            priority: parse_enum(&self.priority)?,
            assignee: self.assignee,
            due_date: self.due_date,
            labels: parse_string_list(&self.labels)?,
            created_by: self.created_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
            updated_by: self.updated_by,
            completed_at: self.completed_at,
        })
    }
}

pub(super) struct CommentRow {
    id: i64,
    card_id: i64,
    author: String,
    content: String,
    mentions: String,
    created_at: String,
}

impl CommentRow {
    pub(super) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            card_id: row.get(1)?,
            author: row.get(2)?,
            content: row.get(3)?,
            mentions: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    pub(super) fn into_comment(self) -> Result<Comment> {
        Ok(Comment {
            id: self.id,
            card_id: self.card_id,
            author: self.author,
            content: self.content,
            mentions: parse_string_list(&self.mentions)?,
            created_at: self.created_at,
        })
    }
}

pub(super) struct NotificationRow {
    id: i64,
    user_id: i64,
    kind: String,
    message: String,
    card_id: Option<i64>,
    read: bool,
    created_at: String,
}

impl NotificationRow {
    pub(super) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            kind: row.get(2)?,
            message: row.get(3)?,
            card_id: row.get(4)?,
            read: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    pub(super) fn into_notification(self) -> Result<Notification> {
        Ok(Notification {
            id: self.id,
            user_id: self.user_id,
            kind: parse_enum(&self.kind)?,
            message: self.message,
            card_id: self.card_id,
            read: self.read,
            created_at: self.created_at,
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl BoardDb {
    /// Resolve a card's project, epic and story from whichever links were
    /// given. A story implies its epic and project; an epic implies its
    /// project. Links that disagree on the project are rejected.
    fn resolve_links(
        &self,
        project_id: Option<i64>,
        epic_id: Option<i64>,
        story_id: Option<i64>,
    ) -> Result<(i64, Option<i64>, Option<i64>)> {
        let story = match story_id {
            Some(id) => Some(self.get_story(id)?.ok_or(BoardError::not_found("Story", id))?),
            None => None,
        };
        let epic_id = epic_id.or(story.as_ref().and_then(|s| s.epic_id));
        let epic = match epic_id {
            Some(id) => Some(self.get_epic(id)?.ok_or(BoardError::not_found("Epic", id))?),
            None => None,
        };

        let project_id = project_id
            .or(story.as_ref().map(|s| s.project_id))
            .or(epic.as_ref().map(|e| e.project_id))
            .ok_or_else(|| BoardError::invalid("Project is required"))?;
        self.require_project(project_id)?;

        if story.as_ref().is_some_and(|s| s.project_id != project_id) {
            return Err(BoardError::invalid("Story belongs to a different project").into());
        }
        if epic.as_ref().is_some_and(|e| e.project_id != project_id) {
            return Err(BoardError::invalid("Epic belongs to a different project").into());
        }
        Ok((project_id, epic_id, story_id))
    }

    // ── Card CRUD ─────────────────────────────────────────────────────

    pub fn create_card(&self, new: &NewCard, created_by: &str) -> Result<Card> {
        if new.title.trim().is_empty() {
            return Err(BoardError::invalid("Card title is required").into());
        }
        let (project_id, epic_id, story_id) =
            self.resolve_links(new.project_id, new.epic_id, new.story_id)?;
        let due_date = normalize_due_date(new.due_date.as_deref())?;
        let status = new.status.unwrap_or(ItemStatus::Todo);
        let priority = new.priority.unwrap_or(Priority::Medium);
        let labels = serde_json::to_string(&new.labels).context("Failed to encode labels")?;

        self.conn
            .execute(
                "INSERT INTO cards (project_id, epic_id, story_id, title, description, status,
                    priority, assignee, due_date, labels, created_by, completed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11,
                    CASE WHEN ?6 = 'done' THEN datetime('now') END)",
                params![
                    project_id,
                    epic_id,
                    story_id,
                    new.title.trim(),
                    new.description,
                    status.as_str(),
                    priority.as_str(),
                    non_empty(new.assignee.as_deref()),
                    due_date,
                    labels,
                    created_by,
                ],
            )
            .context("Failed to insert card")?;
        let id = self.conn.last_insert_rowid();
        self.get_card(id)?.context("Card not found after insert")
    }

    pub fn get_card(&self, id: i64) -> Result<Option<Card>> {
        let sql = format!("SELECT {} FROM cards WHERE id = ?1", CARD_COLUMNS);
        let row = self
            .conn
            .query_row(&sql, params![id], CardRow::from_row)
            .optional()
            .context("Failed to query card")?;
        row.map(CardRow::into_card).transpose()
    }

    pub(crate) fn require_card(&self, id: i64) -> Result<Card> {
        self.get_card(id)?
            .ok_or_else(|| BoardError::not_found("Card", id).into())
    }

    /// List cards, optionally filtered. Assignee matching ignores case.
    pub fn list_cards(&self, filter: &CardFilter) -> Result<Vec<Card>> {
        let sql = format!(
            "SELECT {} FROM cards
             WHERE (?1 IS NULL OR project_id = ?1)
               AND (?2 IS NULL OR status = ?2)
               AND (?3 IS NULL OR LOWER(assignee) = LOWER(?3))
             ORDER BY id",
            CARD_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql).context("Failed to prepare list_cards")?;
        let rows = stmt
            .query_map(
                params![
                    filter.project_id,
                    filter.status.map(|s| s.as_str()),
                    filter.assignee.as_deref().filter(|a| !a.is_empty()),
                ],
                CardRow::from_row,
            )
            .context("Failed to query cards")?;
        let mut cards = Vec::new();
        for row in rows {
            cards.push(row.context("Failed to read card row")?.into_card()?);
        }
        Ok(cards)
    }

    pub fn update_card(&self, id: i64, update: &CardUpdate, by: &str) -> Result<Card> {
        let card = self.require_card(id)?;
        if let Some(t) = &update.title
            && t.trim().is_empty()
        {
            return Err(BoardError::invalid("Card title is required").into());
        }
        let due_date = match &update.due_date {
            Some(d) => Some(normalize_due_date(Some(d))?),
            None => None,
        };
        let relinked = update.epic_id.is_some() || update.story_id.is_some();
        let story_id = update.story_id.unwrap_or(card.story_id);
        let epic_id = match (update.epic_id, update.story_id) {
            (Some(epic_id), _) => epic_id,
            // A new story brings its own epic.
            (None, Some(Some(_))) => None,
            (None, _) => card.epic_id,
        };
        let (epic_id, story_id) = if relinked {
            let (_, epic_id, story_id) =
                self.resolve_links(Some(card.project_id), epic_id, story_id)?;
            (epic_id, story_id)
        } else {
            (epic_id, story_id)
        };

        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        if let Some(t) = &update.title {
            tx.execute("UPDATE cards SET title = ?1 WHERE id = ?2", params![t.trim(), id])
                .context("Failed to update card title")?;
        }
        if let Some(d) = &update.description {
            tx.execute("UPDATE cards SET description = ?1 WHERE id = ?2", params![d, id])
                .context("Failed to update card description")?;
        }
        if let Some(p) = update.priority {
            tx.execute(
                "UPDATE cards SET priority = ?1 WHERE id = ?2",
                params![p.as_str(), id],
            )
            .context("Failed to update card priority")?;
        }
        if let Some(a) = &update.assignee {
            tx.execute(
                "UPDATE cards SET assignee = ?1 WHERE id = ?2",
                params![non_empty(Some(a)), id],
            )
            .context("Failed to update card assignee")?;
        }
        if let Some(d) = due_date {
            tx.execute("UPDATE cards SET due_date = ?1 WHERE id = ?2", params![d, id])
                .context("Failed to update card due date")?;
        }
        if let Some(labels) = &update.labels {
            let encoded = serde_json::to_string(labels).context("Failed to encode labels")?;
            tx.execute("UPDATE cards SET labels = ?1 WHERE id = ?2", params![encoded, id])
                .context("Failed to update card labels")?;
        }
        if relinked {
            tx.execute(
                "UPDATE cards SET epic_id = ?1, story_id = ?2 WHERE id = ?3",
                params![epic_id, story_id, id],
            )
            .context("Failed to update card links")?;
        }
        if let Some(s) = update.status {
            tx.execute(SET_STATUS_SQL, params![s.as_str(), by, id])
                .context("Failed to update card status")?;
        }
        tx.execute(
            "UPDATE cards SET updated_at = datetime('now'), updated_by = ?1 WHERE id = ?2",
            params![by, id],
        )
        .context("Failed to stamp card update")?;
        tx.commit().context("Failed to commit card update")?;
        self.require_card(id)
    }

    pub fn set_card_status(&self, id: i64, status: ItemStatus, by: &str) -> Result<Card> {
        let count = self
            .conn
            .execute(SET_STATUS_SQL, params![status.as_str(), by, id])
            .context("Failed to update card status")?;
        if count == 0 {
            return Err(BoardError::not_found("Card", id).into());
        }
        self.require_card(id)
    }

    /// Set or clear (`None` / empty) a card's due date.
    pub fn set_card_due_date(&self, id: i64, due_date: Option<&str>, by: &str) -> Result<Card> {
        let due_date = normalize_due_date(due_date)?;
        let count = self
            .conn
            .execute(
                "UPDATE cards SET due_date = ?1, updated_at = datetime('now'), updated_by = ?2
                 WHERE id = ?3",
                params![due_date, by, id],
            )
            .context("Failed to update card due date")?;
        if count == 0 {
            return Err(BoardError::not_found("Card", id).into());
        }
        self.require_card(id)
    }

    /// Delete a card with its comments and sprint memberships.
    pub fn delete_card(&self, id: i64) -> Result<bool> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        tx.execute(
            "DELETE FROM sprint_items WHERE item_type = 'card' AND item_id = ?1",
            params![id],
        )
        .context("Failed to remove card from sprints")?;
        let count = tx
            .execute("DELETE FROM cards WHERE id = ?1", params![id])
            .context("Failed to delete card")?;
        tx.commit().context("Failed to commit card delete")?;
        Ok(count > 0)
    }

    /// Cards not `done` whose due date lies before `today`.
    pub fn overdue_cards(&self, today: NaiveDate) -> Result<Vec<Card>> {
        let sql = format!(
            "SELECT {} FROM cards WHERE due_date IS NOT NULL AND status != 'done' ORDER BY due_date, id",
            CARD_COLUMNS
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("Failed to prepare overdue_cards")?;
        let rows = stmt
            .query_map([], CardRow::from_row)
            .context("Failed to query overdue cards")?;
        let mut cards = Vec::new();
        for row in rows {
            let card = row.context("Failed to read card row")?.into_card()?;
            if dates::is_overdue(card.due_date.as_deref(), today) {
                cards.push(card);
            }
        }
        Ok(cards)
    }

    // ── Comments ──────────────────────────────────────────────────────

    /// Post a comment and notify every existing user it mentions.
    pub fn add_comment(
        &self,
        card_id: i64,
        author: &str,
        content: &str,
    ) -> Result<(Comment, Vec<Notification>)> {
        if content.trim().is_empty() {
            return Err(BoardError::invalid("Comment content is required").into());
        }
        self.require_card(card_id)?;
        let mentions = extract_mentions(content);
        let encoded = serde_json::to_string(&mentions).context("Failed to encode mentions")?;

        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        tx.execute(
            "INSERT INTO comments (card_id, author, content, mentions) VALUES (?1, ?2, ?3, ?4)",
            params![card_id, author, content, encoded],
        )
        .context("Failed to insert comment")?;
        let comment_id = tx.last_insert_rowid();

        let mut notification_ids = Vec::new();
        let message = format!("{} mentioned you in a comment", author);
        for username in &mentions {
            let user_id: Option<i64> = tx
                .query_row(
                    "SELECT id FROM users WHERE username = ?1",
                    params![username],
                    |row| row.get(0),
                )
                .optional()
                .context("Failed to look up mentioned user")?;
            if let Some(user_id) = user_id {
                tx.execute(
                    "INSERT INTO notifications (user_id, kind, message, card_id)
                     VALUES (?1, 'mention', ?2, ?3)",
                    params![user_id, message, card_id],
                )
                .context("Failed to insert mention notification")?;
                notification_ids.push(tx.last_insert_rowid());
            }
        }
        tx.commit().context("Failed to commit comment")?;

        let comment = self
            .get_comment(comment_id)?
            .context("Comment not found after insert")?;
        let mut notifications = Vec::with_capacity(notification_ids.len());
        for id in notification_ids {
            notifications.push(
                self.get_notification(id)?
                    .context("Notification not found after insert")?,
            );
        }
        Ok((comment, notifications))
    }

    fn get_comment(&self, id: i64) -> Result<Option<Comment>> {
        let sql = format!("SELECT {} FROM comments WHERE id = ?1", COMMENT_COLUMNS);
        let row = self
            .conn
            .query_row(&sql, params![id], CommentRow::from_row)
            .optional()
            .context("Failed to query comment")?;
        row.map(CommentRow::into_comment).transpose()
    }

    pub fn list_comments(&self, card_id: i64) -> Result<Vec<Comment>> {
        self.require_card(card_id)?;
        let sql = format!(
            "SELECT {} FROM comments WHERE card_id = ?1 ORDER BY id",
            COMMENT_COLUMNS
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("Failed to prepare list_comments")?;
        let rows = stmt
            .query_map(params![card_id], CommentRow::from_row)
            .context("Failed to query comments")?;
        let mut comments = Vec::new();
        for row in rows {
            comments.push(row.context("Failed to read comment row")?.into_comment()?);
        }
        Ok(comments)
    }

    // ── Notifications ─────────────────────────────────────────────────

    fn get_notification(&self, id: i64) -> Result<Option<Notification>> {
        let sql = format!(
            "SELECT {} FROM notifications WHERE id = ?1",
            NOTIFICATION_COLUMNS
        );
        let row = self
            .conn
            .query_row(&sql, params![id], NotificationRow::from_row)
            .optional()
            .context("Failed to query notification")?;
        row.map(NotificationRow::into_notification).transpose()
    }

    /// Tell a card's assignee about it, optionally with a note.
    pub fn notify_assignee(
        &self,
        card_id: i64,
        sender: &str,
        note: Option<&str>,
    ) -> Result<Notification> {
        let card = self.require_card(card_id)?;
        let assignee = card
            .assignee
            .as_deref()
            .ok_or_else(|| BoardError::invalid("Card has no assignee"))?;
        let user = self.get_user_by_username(assignee)?.ok_or_else(|| {
            BoardError::invalid(format!("Assignee '{}' is not a registered user", assignee))
        })?;

        let mut message = format!("{} sent you card #{}: {}", sender, card.id, card.title);
        if let Some(note) = note.map(str::trim).filter(|n| !n.is_empty()) {
            message.push_str(" - ");
            message.push_str(note);
        }
        self.conn
            .execute(
                "INSERT INTO notifications (user_id, kind, message, card_id)
                 VALUES (?1, 'assignment', ?2, ?3)",
                params![user.id, message, card.id],
            )
            .context("Failed to insert assignment notification")?;
        let id = self.conn.last_insert_rowid();
        self.get_notification(id)?
            .context("Notification not found after insert")
    }

    /// Newest first.
    pub fn list_notifications(&self, user_id: i64) -> Result<Vec<Notification>> {
        let sql = format!(
            "SELECT {} FROM notifications WHERE user_id = ?1 ORDER BY id DESC",
            NOTIFICATION_COLUMNS
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("Failed to prepare list_notifications")?;
        let rows = stmt
            .query_map(params![user_id], NotificationRow::from_row)
            .context("Failed to query notifications")?;
        let mut notifications = Vec::new();
        for row in rows {
            notifications.push(
                row.context("Failed to read notification row")?
                    .into_notification()?,
            );
        }
        Ok(notifications)
    }

    /// Mark one of the user's notifications read. Other users'
    /// notifications are reported as missing.
    pub fn mark_notification_read(&self, id: i64, user_id: i64) -> Result<()> {
        let count = self
            .conn
            .execute(
                "UPDATE notifications SET read = 1 WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
            )
            .context("Failed to mark notification read")?;
        if count == 0 {
            return Err(BoardError::not_found("Notification", id).into());
        }
        Ok(())
    }

    /// Users who receive the overdue digest.
    pub fn digest_recipients(&self) -> Result<Vec<User>> {
        Ok(self
            .list_users(&UserFilter::default())?
            .into_iter()
            .filter(|u| u.email_notifications && u.email.as_deref().is_some_and(|e| !e.is_empty()))
            .collect())
    }
}
