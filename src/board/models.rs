use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ── Users ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::User => "user",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "user" => Ok(Self::User),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    Pending,
    Active,
    Suspended,
    Inactive,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Suspended => "suspended",
            Self::Inactive => "inactive",
        }
    }

    /// Message shown when an account in this status tries to log in.
    pub fn login_refusal(&self) -> Option<&'static str> {
        match self {
            Self::Active => None,
            Self::Pending => Some("Your account is pending admin approval."),
            Self::Suspended => Some("Your account has been suspended."),
            Self::Inactive => Some("Your account is inactive."),
        }
    }
}

impl FromStr for UserStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            "suspended" => Ok(Self::Suspended),
            "inactive" => Ok(Self::Inactive),
            _ => Err(format!("Invalid user status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default = "default_role")]
    pub role: Role,
    #[serde(default = "default_user_status")]
    pub status: UserStatus,
    #[serde(default = "default_true")]
    pub email_notifications: bool,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub last_login: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_role() -> Role {
    Role::User
}

/// Accounts from before approval existed were usable.
fn default_user_status() -> UserStatus {
    UserStatus::Active
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn display(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.username)
    }
}

/// Bulk admin action over a set of users.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BulkAction {
    Approve,
    Activate,
    Reject,
    Suspend,
}

impl BulkAction {
    pub fn target_status(&self) -> UserStatus {
        match self {
            Self::Approve | Self::Activate => UserStatus::Active,
            Self::Reject => UserStatus::Inactive,
            Self::Suspend => UserStatus::Suspended,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserFilter {
    pub status: Option<UserStatus>,
    pub role: Option<Role>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserStats {
    pub total: i64,
    pub active: i64,
    pub pending: i64,
    pub admins: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamMember {
    pub id: i64,
    pub username: String,
    pub display_name: String,
}

// ── Projects ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub archived_at: Option<String>,
    #[serde(default)]
    pub archived_by: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default = "default_budget")]
    pub budget: f64,
}

pub fn default_budget() -> f64 {
    100_000.0
}

// ── Work items ───────────────────────────────────────────────────────

/// Status shared by cards, stories and epics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Todo,
    /// Older epics were stored as `active`.
    #[serde(alias = "active")]
    InProgress,
    Done,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::Done => "done",
        }
    }
}

impl FromStr for ItemStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "todo" => Ok(Self::Todo),
            "in_progress" => Ok(Self::InProgress),
            "done" => Ok(Self::Done),
            _ => Err(format!("Invalid status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    #[serde(alias = "Low")]
    Low,
    #[serde(alias = "Medium")]
    Medium,
    #[serde(alias = "High")]
    High,
    #[serde(alias = "Critical")]
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            _ => Err(format!("Invalid priority: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Epic {
    pub id: i64,
    pub project_id: i64,
    #[serde(alias = "name")]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_status")]
    pub status: ItemStatus,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Story {
    pub id: i64,
    #[serde(default)]
    pub epic_id: Option<i64>,
    pub project_id: i64,
    #[serde(alias = "name")]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub story_points: Option<i64>,
    #[serde(default = "default_status")]
    pub status: ItemStatus,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub created_at: String,
}

fn default_status() -> ItemStatus {
    ItemStatus::Todo
}

fn default_priority() -> Priority {
    Priority::Medium
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Card {
    pub id: i64,
    pub project_id: i64,
    #[serde(default)]
    pub epic_id: Option<i64>,
    #[serde(default)]
    pub story_id: Option<i64>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_status")]
    pub status: ItemStatus,
    #[serde(default = "default_priority")]
    pub priority: Priority,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub assignee: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub due_date: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub updated_by: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,
}

impl Card {
    /// `updated_at` if the card was ever edited, else `created_at`.
    pub fn last_touched(&self) -> &str {
        self.updated_at.as_deref().unwrap_or(&self.created_at)
    }
}

/// Older snapshots store "no value" as `""`.
fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CardFilter {
    pub project_id: Option<i64>,
    pub status: Option<ItemStatus>,
    pub assignee: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewCard {
    #[serde(default)]
    pub project_id: Option<i64>,
    #[serde(default)]
    pub epic_id: Option<i64>,
    #[serde(default)]
    pub story_id: Option<i64>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: Option<ItemStatus>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
}

/// Partial card edit. For the nullable links, an explicit `null` detaches
/// while an absent field leaves the link alone.
/// A new `story_id` without an `epic_id` moves the card under the story's epic.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CardUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<ItemStatus>,
    pub priority: Option<Priority>,
    pub assignee: Option<String>,
    pub due_date: Option<String>,
    pub labels: Option<Vec<String>>,
    #[serde(default, deserialize_with = "present")]
    pub epic_id: Option<Option<i64>>,
    #[serde(default, deserialize_with = "present")]
    pub story_id: Option<Option<i64>>,
}

fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Serialize)]
pub struct Label {
    pub id: &'static str,
    pub name: &'static str,
    pub color: &'static str,
}

pub const PREDEFINED_LABELS: [Label; 4] = [
    Label { id: "bug", name: "Bug", color: "#ff5630" },
    Label { id: "feature", name: "Feature", color: "#0052cc" },
    Label { id: "urgent", name: "Urgent", color: "#ff8b00" },
    Label { id: "enhancement", name: "Enhancement", color: "#36b37e" },
];

pub fn label_by_id(id: &str) -> Option<&'static Label> {
    PREDEFINED_LABELS.iter().find(|l| l.id == id)
}

// ── Comments & notifications ─────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub card_id: i64,
    pub author: String,
    pub content: String,
    #[serde(default)]
    pub mentions: Vec<String>,
    #[serde(default)]
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Mention,
    Assignment,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mention => "mention",
            Self::Assignment => "assignment",
        }
    }
}

impl FromStr for NotificationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mention" => Ok(Self::Mention),
            "assignment" => Ok(Self::Assignment),
            _ => Err(format!("Invalid notification kind: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub message: String,
    #[serde(default)]
    pub card_id: Option<i64>,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub created_at: String,
}

// ── Sprints ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SprintStatus {
    Planning,
    Active,
    Completed,
}

impl SprintStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::Active => "active",
            Self::Completed => "completed",
        }
    }
}

impl FromStr for SprintStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "planning" => Ok(Self::Planning),
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            _ => Err(format!("Invalid sprint status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SprintItemKind {
    Epic,
    Story,
    #[serde(alias = "issue")]
    Card,
}

impl SprintItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Epic => "epic",
            Self::Story => "story",
            Self::Card => "card",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Epic => "Epic",
            Self::Story => "Story",
            Self::Card => "Card",
        }
    }
}

impl FromStr for SprintItemKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "epic" => Ok(Self::Epic),
            "story" => Ok(Self::Story),
            "card" | "issue" => Ok(Self::Card),
            _ => Err(format!("Invalid sprint item type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SprintItem {
    #[serde(rename = "type")]
    pub kind: SprintItemKind,
    pub id: i64,
    #[serde(default)]
    pub added_by: Option<String>,
    #[serde(default)]
    pub added_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sprint {
    pub id: i64,
    pub project_id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub goal: Option<String>,
    #[serde(default)]
    pub story_points: Option<i64>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    pub status: SprintStatus,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub items: Vec<SprintItem>,
}

impl Sprint {
    pub fn item_ids(&self, kind: SprintItemKind) -> Vec<i64> {
        self.items
            .iter()
            .filter(|i| i.kind == kind)
            .map(|i| i.id)
            .collect()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewSprint {
    pub project_id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub goal: Option<String>,
    #[serde(default)]
    pub story_points: Option<i64>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SprintUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub goal: Option<String>,
    pub story_points: Option<i64>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// Items to attach to a sprint, grouped by kind. Ids already in the sprint
/// are skipped.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SprintItemsRequest {
    #[serde(default)]
    pub epic_ids: Vec<i64>,
    #[serde(default)]
    pub story_ids: Vec<i64>,
    #[serde(default, alias = "issue_ids")]
    pub card_ids: Vec<i64>,
}

impl SprintItemsRequest {
    pub fn iter(&self) -> impl Iterator<Item = (SprintItemKind, i64)> + '_ {
        let epics = self.epic_ids.iter().map(|id| (SprintItemKind::Epic, *id));
        let stories = self.story_ids.iter().map(|id| (SprintItemKind::Story, *id));
        let cards = self.card_ids.iter().map(|id| (SprintItemKind::Card, *id));
        epics.chain(stories).chain(cards)
    }
}

/// A sprint item resolved to the record it points at.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum SprintItemDetail {
    Epic(Epic),
    Story(Story),
    Card(Card),
}

// ── Mind map ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MindMap {
    pub project_id: i64,
    #[serde(default)]
    pub nodes: serde_json::Value,
    #[serde(default)]
    pub connections: serde_json::Value,
    #[serde(default)]
    pub updated_at: Option<String>,
}

// ── Views ────────────────────────────────────────────────────────────

/// A card decorated for list and board rendering.
#[derive(Debug, Clone, Serialize)]
pub struct CardView {
    #[serde(flatten)]
    pub card: Card,
    pub comment_count: i64,
    pub due_status: &'static str,
    pub due_class: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct BoardView {
    pub project: Project,
    pub todo: Vec<CardView>,
    pub in_progress: Vec<CardView>,
    pub done: Vec<CardView>,
    pub epics: Vec<Epic>,
    pub stories: Vec<Story>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoryNode {
    pub story: Story,
    pub cards: Vec<Card>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EpicNode {
    pub epic: Epic,
    pub stories: Vec<StoryNode>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Hierarchy {
    pub project: Project,
    pub epics: Vec<EpicNode>,
    pub orphan_stories: Vec<StoryNode>,
    pub orphan_cards: Vec<Card>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CardStats {
    pub todo: i64,
    pub in_progress: i64,
    pub done: i64,
    pub total: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub projects: Vec<Project>,
    pub stats: CardStats,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Activity {
    CardUpdate {
        card_id: i64,
        title: String,
        user: String,
        timestamp: String,
        action: &'static str,
    },
    Comment {
        card_id: i64,
        card_title: String,
        user: String,
        timestamp: String,
    },
}

impl Activity {
    pub fn timestamp(&self) -> &str {
        match self {
            Self::CardUpdate { timestamp, .. } | Self::Comment { timestamp, .. } => timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SearchKind {
    Card,
    Epic,
    Story,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    #[serde(rename = "type")]
    pub kind: SearchKind,
    pub id: i64,
    pub title: String,
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_parses_legacy_capitalized() {
        assert_eq!(Priority::from_str("Medium").unwrap(), Priority::Medium);
        assert_eq!(Priority::from_str("high").unwrap(), Priority::High);
        assert!(Priority::from_str("urgent").is_err());

        let p: Priority = serde_json::from_str("\"Critical\"").unwrap();
        assert_eq!(p, Priority::Critical);
        assert_eq!(serde_json::to_string(&p).unwrap(), "\"critical\"");
    }

    #[test]
    fn test_item_status_round_trips_through_str() {
        for status in [ItemStatus::Todo, ItemStatus::InProgress, ItemStatus::Done] {
            assert_eq!(ItemStatus::from_str(status.as_str()).unwrap(), status);
        }
        assert!(ItemStatus::from_str("blocked").is_err());
    }

    #[test]
    fn test_login_refusal_messages() {
        assert_eq!(UserStatus::Active.login_refusal(), None);
        assert_eq!(
            UserStatus::Pending.login_refusal(),
            Some("Your account is pending admin approval.")
        );
        assert_eq!(
            UserStatus::Suspended.login_refusal(),
            Some("Your account has been suspended.")
        );
        assert_eq!(UserStatus::Inactive.login_refusal(), Some("Your account is inactive."));
    }

    #[test]
    fn test_bulk_action_targets() {
        assert_eq!(BulkAction::Approve.target_status(), UserStatus::Active);
        assert_eq!(BulkAction::Activate.target_status(), UserStatus::Active);
        assert_eq!(BulkAction::Reject.target_status(), UserStatus::Inactive);
        assert_eq!(BulkAction::Suspend.target_status(), UserStatus::Suspended);
    }

    #[test]
    fn test_card_deserializes_legacy_empty_strings() {
        let card: Card = serde_json::from_value(serde_json::json!({
            "id": 3,
            "project_id": 1,
            "title": "Fix login",
            "status": "todo",
            "priority": "Medium",
            "assignee": "",
            "due_date": "",
            "created_at": "2024-01-01 10:00:00"
        }))
        .unwrap();
        assert_eq!(card.assignee, None);
        assert_eq!(card.due_date, None);
        assert_eq!(card.priority, Priority::Medium);
        assert_eq!(card.last_touched(), "2024-01-01 10:00:00");
    }

    #[test]
    fn test_epic_accepts_name_alias() {
        let epic: Epic = serde_json::from_value(serde_json::json!({
            "id": 1, "project_id": 1, "name": "Checkout"
        }))
        .unwrap();
        assert_eq!(epic.title, "Checkout");
        assert_eq!(epic.status, ItemStatus::Todo);
    }

    #[test]
    fn test_legacy_epic_status_and_user_defaults() {
        let epic: Epic = serde_json::from_value(serde_json::json!({
            "id": 1, "project_id": 1, "title": "Main", "status": "active"
        }))
        .unwrap();
        assert_eq!(epic.status, ItemStatus::InProgress);

        let user: User =
            serde_json::from_value(serde_json::json!({"id": 2, "username": "old"})).unwrap();
        assert_eq!(user.role, Role::User);
        assert_eq!(user.status, UserStatus::Active);
        assert!(user.email_notifications);
    }

    #[test]
    fn test_sprint_item_kind_accepts_issue() {
        assert_eq!(SprintItemKind::from_str("issue").unwrap(), SprintItemKind::Card);
        let kind: SprintItemKind = serde_json::from_str("\"issue\"").unwrap();
        assert_eq!(kind, SprintItemKind::Card);
    }

    #[test]
    fn test_sprint_item_detail_serialization() {
        let epic = Epic {
            id: 9,
            project_id: 1,
            title: "Payments".into(),
            description: String::new(),
            status: ItemStatus::Todo,
            created_by: None,
            created_at: "2024-01-01".into(),
        };
        let json = serde_json::to_value(SprintItemDetail::Epic(epic)).unwrap();
        assert_eq!(json["type"], "epic");
        assert_eq!(json["data"]["title"], "Payments");
    }

    #[test]
    fn test_card_update_distinguishes_null_from_absent() {
        let update: CardUpdate =
            serde_json::from_value(serde_json::json!({"story_id": null, "title": "T"})).unwrap();
        assert_eq!(update.story_id, Some(None));
        assert_eq!(update.epic_id, None);
        assert_eq!(update.title.as_deref(), Some("T"));

        let update: CardUpdate = serde_json::from_value(serde_json::json!({"epic_id": 4})).unwrap();
        assert_eq!(update.epic_id, Some(Some(4)));
    }

    #[test]
    fn test_predefined_labels() {
        assert_eq!(label_by_id("bug").unwrap().color, "#ff5630");
        assert_eq!(label_by_id("enhancement").unwrap().color, "#36b37e");
        assert!(label_by_id("wontfix").is_none());
    }
}
