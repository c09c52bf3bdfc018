//! Read-only aggregate views over the board.

use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::params;

use super::BoardDb;
use super::cards::{CARD_COLUMNS, CardRow};
use crate::board::dates;
use crate::board::models::*;

const SEARCH_DESCRIPTION_LIMIT: usize = 100;
const ACTIVITY_CARDS: usize = 10;
const ACTIVITY_COMMENTS: usize = 5;
const ACTIVITY_LIMIT: usize = 15;

fn truncate(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

impl BoardDb {
    fn comment_counts(&self) -> Result<HashMap<i64, i64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT card_id, COUNT(*) FROM comments GROUP BY card_id")
            .context("Failed to prepare comment_counts")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))
            .context("Failed to count comments")?;
        let mut counts = HashMap::new();
        for row in rows {
            let (card_id, count) = row.context("Failed to read comment count")?;
            counts.insert(card_id, count);
        }
        Ok(counts)
    }

    fn card_views(&self, cards: Vec<Card>, today: NaiveDate) -> Result<Vec<CardView>> {
        let counts = self.comment_counts()?;
        Ok(cards
            .into_iter()
            .map(|card| {
                let due = card.due_date.as_deref();
                CardView {
                    comment_count: counts.get(&card.id).copied().unwrap_or(0),
                    due_status: dates::due_status(due, today),
                    due_class: dates::due_class(due, today),
                    card,
                }
            })
            .collect())
    }

    /// Kanban columns for one project.
    pub fn board(&self, project_id: i64, today: NaiveDate) -> Result<BoardView> {
        let project = self.require_project(project_id)?;
        let cards = self.list_cards(&CardFilter {
            project_id: Some(project_id),
            ..Default::default()
        })?;
        let mut board = BoardView {
            project,
            todo: Vec::new(),
            in_progress: Vec::new(),
            done: Vec::new(),
            epics: self.list_epics(Some(project_id))?,
            stories: self.list_stories(Some(project_id), None)?,
        };
        for view in self.card_views(cards, today)? {
            match view.card.status {
                ItemStatus::Todo => board.todo.push(view),
                ItemStatus::InProgress => board.in_progress.push(view),
                ItemStatus::Done => board.done.push(view),
            }
        }
        Ok(board)
    }

    /// Every `todo` card of a non-archived project.
    pub fn backlog(&self, today: NaiveDate) -> Result<Vec<CardView>> {
        let sql = format!(
            "SELECT {} FROM cards
             WHERE status = 'todo'
               AND project_id IN (SELECT id FROM projects WHERE archived = 0)
             ORDER BY id",
            CARD_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql).context("Failed to prepare backlog")?;
        let rows = stmt
            .query_map([], CardRow::from_row)
            .context("Failed to query backlog")?;
        let mut cards = Vec::new();
        for row in rows {
            cards.push(row.context("Failed to read card row")?.into_card()?);
        }
        self.card_views(cards, today)
    }

    /// Project → epics → stories → cards, plus stories without an epic and
    /// cards without a story.
    pub fn hierarchy(&self, project_id: i64) -> Result<Hierarchy> {
        let project = self.require_project(project_id)?;
        let epics = self.list_epics(Some(project_id))?;
        let stories = self.list_stories(Some(project_id), None)?;
        let cards = self.list_cards(&CardFilter {
            project_id: Some(project_id),
            ..Default::default()
        })?;

        let mut cards_by_story: HashMap<i64, Vec<Card>> = HashMap::new();
        let mut orphan_cards = Vec::new();
        for card in cards {
            match card.story_id {
                Some(sid) => cards_by_story.entry(sid).or_default().push(card),
                None => orphan_cards.push(card),
            }
        }

        let mut stories_by_epic: HashMap<i64, Vec<StoryNode>> = HashMap::new();
        let mut orphan_stories = Vec::new();
        for story in stories {
            let node = StoryNode {
                cards: cards_by_story.remove(&story.id).unwrap_or_default(),
                story,
            };
            match node.story.epic_id {
                Some(eid) => stories_by_epic.entry(eid).or_default().push(node),
                None => orphan_stories.push(node),
            }
        }

        let epics = epics
            .into_iter()
            .map(|epic| EpicNode {
                stories: stories_by_epic.remove(&epic.id).unwrap_or_default(),
                epic,
            })
            .collect();

        Ok(Hierarchy {
            project,
            epics,
            orphan_stories,
            orphan_cards,
        })
    }

    /// Card counts by status across every project.
    pub fn card_stats(&self) -> Result<CardStats> {
        self.conn
            .query_row(
                "SELECT
                    COALESCE(SUM(status = 'todo'), 0),
                    COALESCE(SUM(status = 'in_progress'), 0),
                    COALESCE(SUM(status = 'done'), 0),
                    COUNT(*)
                 FROM cards",
                [],
                |row| {
                    Ok(CardStats {
                        todo: row.get(0)?,
                        in_progress: row.get(1)?,
                        done: row.get(2)?,
                        total: row.get(3)?,
                    })
                },
            )
            .context("Failed to compute card stats")
    }

    pub fn dashboard(&self) -> Result<Dashboard> {
        Ok(Dashboard {
            projects: self.list_projects(Some(false))?,
            stats: self.card_stats()?,
        })
    }

    /// Recently touched cards and recent comments, newest first.
    pub fn activity(&self) -> Result<Vec<Activity>> {
        let sql = format!(
            "SELECT {} FROM cards ORDER BY COALESCE(updated_at, created_at) DESC, id DESC LIMIT ?1",
            CARD_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql).context("Failed to prepare activity")?;
        let rows = stmt
            .query_map(params![ACTIVITY_CARDS as i64], CardRow::from_row)
            .context("Failed to query recent cards")?;
        let mut activities = Vec::new();
        for row in rows {
            let card = row.context("Failed to read card row")?.into_card()?;
            let edited = card.updated_at.is_some();
            activities.push(Activity::CardUpdate {
                card_id: card.id,
                user: if edited {
                    card.updated_by.clone()
                } else {
                    card.created_by.clone()
                }
                .unwrap_or_default(),
                timestamp: card.last_touched().to_string(),
                action: if edited { "updated" } else { "created" },
                title: card.title,
            });
        }

        let mut stmt = self
            .conn
            .prepare(
                "SELECT c.card_id, k.title, c.author, c.created_at
                 FROM comments c JOIN cards k ON k.id = c.card_id
                 ORDER BY c.created_at DESC, c.id DESC LIMIT ?1",
            )
            .context("Failed to prepare recent comments")?;
        let rows = stmt
            .query_map(params![ACTIVITY_COMMENTS as i64], |row| {
                Ok(Activity::Comment {
                    card_id: row.get(0)?,
                    card_title: row.get(1)?,
                    user: row.get(2)?,
                    timestamp: row.get(3)?,
                })
            })
            .context("Failed to query recent comments")?;
        for row in rows {
            activities.push(row.context("Failed to read comment activity")?);
        }

        activities.sort_by(|a, b| b.timestamp().cmp(a.timestamp()));
        activities.truncate(ACTIVITY_LIMIT);
        Ok(activities)
    }

    /// Case-insensitive substring search over cards, epics and stories.
    pub fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        let is_match = |title: &str, desc: &str| {
            title.to_lowercase().contains(&needle) || desc.to_lowercase().contains(&needle)
        };
        let hit = |kind, id, title: &str, desc: &str| SearchHit {
            kind,
            id,
            title: title.to_string(),
            description: truncate(desc, SEARCH_DESCRIPTION_LIMIT),
        };

        let mut hits = Vec::new();
        for card in self.list_cards(&CardFilter::default())? {
            if is_match(&card.title, &card.description) {
                hits.push(hit(SearchKind::Card, card.id, &card.title, &card.description));
            }
        }
        for epic in self.list_epics(None)? {
            if is_match(&epic.title, &epic.description) {
                hits.push(hit(SearchKind::Epic, epic.id, &epic.title, &epic.description));
            }
        }
        for story in self.list_stories(None, None)? {
            if is_match(&story.title, &story.description) {
                hits.push(hit(SearchKind::Story, story.id, &story.title, &story.description));
            }
        }
        Ok(hits)
    }
}
