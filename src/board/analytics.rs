//! Project health, workload and forecast figures derived from cards.
//!
//! Everything here is a pure function of the project and card lists plus
//! the current date, so handlers load once and compute synchronously.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use serde::Serialize;

use super::dates;
use super::db::BoardDb;
use super::models::{Card, CardFilter, ItemStatus, Project};

pub const RESOURCE_CAPACITY: u32 = 40;
const UTILIZATION_PER_TASK: u32 = 10;
const AT_RISK_BELOW: f64 = 30.0;
const DAYS_PER_PERCENT: f64 = 2.0;
const VELOCITY_MONTHS: u32 = 6;

/// Projects and cards the figures are computed from.
#[derive(Debug, Clone, Default)]
pub struct BoardData {
    pub projects: Vec<Project>,
    pub cards: Vec<Card>,
}

impl BoardData {
    pub fn load(db: &BoardDb) -> Result<Self> {
        Ok(Self {
            projects: db.list_projects(None)?,
            cards: db.list_cards(&CardFilter::default())?,
        })
    }

    fn cards_of(&self, project_id: i64) -> impl Iterator<Item = &Card> {
        self.cards.iter().filter(move |c| c.project_id == project_id)
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn percent_done(done: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        done as f64 / total as f64 * 100.0
    }
}

fn progress(done: usize, total: usize) -> f64 {
    round1(percent_done(done, total))
}

fn card_overdue(card: &Card, today: NaiveDate) -> bool {
    card.status != ItemStatus::Done && dates::is_overdue(card.due_date.as_deref(), today)
}

// ── Gantt ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct GanttProject {
    pub id: i64,
    pub name: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub progress: f64,
    /// Cards of the project that carry a due date.
    pub cards: Vec<Card>,
}

pub fn gantt(data: &BoardData) -> Vec<GanttProject> {
    data.projects
        .iter()
        .filter(|p| !p.archived)
        .map(|p| {
            let cards: Vec<&Card> = data.cards_of(p.id).collect();
            let done = cards.iter().filter(|c| c.status == ItemStatus::Done).count();
            GanttProject {
                id: p.id,
                name: p.name.clone(),
                start_date: p.start_date.clone(),
                end_date: p.end_date.clone(),
                progress: progress(done, cards.len()),
                cards: cards
                    .into_iter()
                    .filter(|c| c.due_date.is_some())
                    .cloned()
                    .collect(),
            }
        })
        .collect()
}

// ── Project health ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum HealthStatus {
    OnTrack,
    AtRisk,
    Overdue,
    Completed,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectHealth {
    pub id: i64,
    pub name: String,
    pub status: HealthStatus,
    pub progress: f64,
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub overdue_tasks: usize,
    pub budget: f64,
    pub spent: f64,
}

/// Health of every project that has at least one card.
pub fn project_health(data: &BoardData, today: NaiveDate) -> Vec<ProjectHealth> {
    let mut out = Vec::new();
    for project in &data.projects {
        let cards: Vec<&Card> = data.cards_of(project.id).collect();
        if cards.is_empty() {
            continue;
        }
        let total = cards.len();
        let done = cards.iter().filter(|c| c.status == ItemStatus::Done).count();
        let overdue = cards.iter().filter(|c| card_overdue(c, today)).count();
        // Status follows the exact ratio; only the reported figure is rounded.
        let exact = percent_done(done, total);
        let status = if overdue > 0 {
            HealthStatus::Overdue
        } else if exact < AT_RISK_BELOW {
            HealthStatus::AtRisk
        } else if done == total {
            HealthStatus::Completed
        } else {
            HealthStatus::OnTrack
        };
        let progress = round1(exact);
        out.push(ProjectHealth {
            id: project.id,
            name: project.name.clone(),
            status,
            progress,
            total_tasks: total,
            completed_tasks: done,
            overdue_tasks: overdue,
            budget: project.budget,
            spent: round1(progress * project.budget / 100.0),
        });
    }
    out
}

// ── Resources ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ResourceUsage {
    pub name: String,
    pub utilization: u32,
    pub capacity: u32,
    pub total_tasks: u32,
    pub completed_tasks: u32,
    pub in_progress_tasks: u32,
    pub overdue_tasks: u32,
}

/// Workload per assignee, sorted by name. Unassigned cards are ignored.
pub fn resource_utilization(data: &BoardData, today: NaiveDate) -> Vec<ResourceUsage> {
    let mut by_name: BTreeMap<&str, ResourceUsage> = BTreeMap::new();
    for card in &data.cards {
        let Some(name) = card.assignee.as_deref().filter(|a| !a.trim().is_empty()) else {
            continue;
        };
        let usage = by_name.entry(name).or_insert_with(|| ResourceUsage {
            name: name.to_string(),
            utilization: 0,
            capacity: RESOURCE_CAPACITY,
            total_tasks: 0,
            completed_tasks: 0,
            in_progress_tasks: 0,
            overdue_tasks: 0,
        });
        usage.total_tasks += 1;
        match card.status {
            ItemStatus::Done => usage.completed_tasks += 1,
            ItemStatus::InProgress => usage.in_progress_tasks += 1,
            ItemStatus::Todo => {}
        }
        if card_overdue(card, today) {
            usage.overdue_tasks += 1;
        }
    }
    by_name
        .into_values()
        .map(|mut u| {
            u.utilization = (u.total_tasks * UTILIZATION_PER_TASK).min(100);
            u
        })
        .collect()
}

// ── Forecast ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Predictive {
    pub average_progress: f64,
    pub estimated_completion: Option<String>,
    pub budget_variance: f64,
    pub risk_score: f64,
}

pub fn predictive(health: &[ProjectHealth], today: NaiveDate) -> Predictive {
    if health.is_empty() {
        return Predictive {
            average_progress: 0.0,
            estimated_completion: None,
            budget_variance: 0.0,
            risk_score: 0.0,
        };
    }
    let count = health.len() as f64;
    let avg = health.iter().map(|p| p.progress).sum::<f64>() / count;
    let days_remaining = ((100.0 - avg) * DAYS_PER_PERCENT).max(1.0);
    let estimated = today + Duration::days(days_remaining.round() as i64);

    let budget: f64 = health.iter().map(|p| p.budget).sum();
    let spent: f64 = health.iter().map(|p| p.spent).sum();
    let variance = if budget > 0.0 {
        (spent - budget) / budget * 100.0
    } else {
        0.0
    };

    let overdue = health
        .iter()
        .filter(|p| p.status == HealthStatus::Overdue)
        .count() as f64;
    let at_risk = health
        .iter()
        .filter(|p| p.status == HealthStatus::AtRisk)
        .count() as f64;
    let risk = ((overdue * 2.0 + at_risk) / count * 50.0 + variance.abs()).min(100.0);

    Predictive {
        average_progress: round1(avg),
        estimated_completion: Some(estimated.format(dates::DATE_FORMAT).to_string()),
        budget_variance: round1(variance),
        risk_score: risk.round(),
    }
}

// ── Velocity ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct VelocityPoint {
    /// `YYYY-MM`
    pub month: String,
    pub completed: u32,
}

fn month_key(date: NaiveDate) -> String {
    format!("{:04}-{:02}", date.year(), date.month())
}

fn months_back(date: NaiveDate, n: u32) -> NaiveDate {
    let total = date.year() * 12 + date.month0() as i32 - n as i32;
    NaiveDate::from_ymd_opt(total.div_euclid(12), total.rem_euclid(12) as u32 + 1, 1)
        .unwrap_or(date)
}

/// Cards completed per calendar month, oldest first, ending with the
/// current month.
pub fn velocity(data: &BoardData, today: NaiveDate) -> Vec<VelocityPoint> {
    let mut points: Vec<VelocityPoint> = (0..VELOCITY_MONTHS)
        .rev()
        .map(|n| VelocityPoint {
            month: month_key(months_back(today, n)),
            completed: 0,
        })
        .collect();
    for card in &data.cards {
        let Some(done_on) = card.completed_at.as_deref().and_then(completed_date) else {
            continue;
        };
        let key = month_key(done_on);
        if let Some(point) = points.iter_mut().find(|p| p.month == key) {
            point.completed += 1;
        }
    }
    points
}

fn completed_date(stamp: &str) -> Option<NaiveDate> {
    stamp.get(..10).and_then(dates::parse_date)
}

// ── Reports ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    ProjectHealth,
    ResourceUtilization,
    RiskAssessment,
}

impl std::str::FromStr for ReportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "project-health" => Ok(Self::ProjectHealth),
            "resource-utilization" => Ok(Self::ResourceUtilization),
            "risk-assessment" => Ok(Self::RiskAssessment),
            other => Err(format!("Unknown report type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq, Default)]
pub struct HealthSummary {
    pub total_projects: usize,
    pub on_track: usize,
    pub at_risk: usize,
    pub overdue: usize,
    pub completed: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq, Default)]
pub struct ResourceSummary {
    pub total_resources: usize,
    pub over_utilized: usize,
    pub high_utilization: usize,
    pub normal_utilization: usize,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RiskType {
    Project,
    Resource,
    Budget,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize)]
pub struct Risk {
    #[serde(rename = "type")]
    pub kind: RiskType,
    pub severity: Severity,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq, Default)]
pub struct RiskSummary {
    pub total_risks: usize,
    pub high_severity: usize,
    pub medium_severity: usize,
    pub low_severity: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ReportBody {
    ProjectHealth {
        projects: Vec<ProjectHealth>,
        summary: HealthSummary,
    },
    ResourceUtilization {
        resources: Vec<ResourceUsage>,
        summary: ResourceSummary,
    },
    RiskAssessment {
        risks: Vec<Risk>,
        risk_score: f64,
        summary: RiskSummary,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub title: &'static str,
    pub generated_at: String,
    #[serde(flatten)]
    pub body: ReportBody,
}

pub fn report(kind: ReportKind, data: &BoardData, now: NaiveDateTime) -> Report {
    let today = now.date();
    let (title, body) = match kind {
        ReportKind::ProjectHealth => {
            let projects = project_health(data, today);
            let count = |s| projects.iter().filter(|p| p.status == s).count();
            let summary = HealthSummary {
                total_projects: projects.len(),
                on_track: count(HealthStatus::OnTrack),
                at_risk: count(HealthStatus::AtRisk),
                overdue: count(HealthStatus::Overdue),
                completed: count(HealthStatus::Completed),
            };
            ("Project Health Report", ReportBody::ProjectHealth { projects, summary })
        }
        ReportKind::ResourceUtilization => {
            let resources = resource_utilization(data, today);
            let summary = ResourceSummary {
                total_resources: resources.len(),
                over_utilized: resources.iter().filter(|r| r.utilization > 90).count(),
                high_utilization: resources
                    .iter()
                    .filter(|r| r.utilization > 80 && r.utilization <= 90)
                    .count(),
                normal_utilization: resources.iter().filter(|r| r.utilization <= 80).count(),
            };
            (
                "Resource Utilization Report",
                ReportBody::ResourceUtilization { resources, summary },
            )
        }
        ReportKind::RiskAssessment => {
            let health = project_health(data, today);
            let forecast = predictive(&health, today);
            let risks = assess_risks(&health, &resource_utilization(data, today), &forecast);
            let count = |s| risks.iter().filter(|r| r.severity == s).count();
            let summary = RiskSummary {
                total_risks: risks.len(),
                high_severity: count(Severity::High),
                medium_severity: count(Severity::Medium),
                low_severity: count(Severity::Low),
            };
            (
                "Risk Assessment Report",
                ReportBody::RiskAssessment {
                    risk_score: forecast.risk_score,
                    risks,
                    summary,
                },
            )
        }
    };
    Report {
        title,
        generated_at: now.format("%Y-%m-%dT%H:%M:%S").to_string(),
        body,
    }
}

fn assess_risks(health: &[ProjectHealth], resources: &[ResourceUsage], forecast: &Predictive) -> Vec<Risk> {
    let mut risks = Vec::new();
    for project in health {
        match project.status {
            HealthStatus::Overdue => risks.push(Risk {
                kind: RiskType::Project,
                severity: Severity::High,
                description: format!(
                    "Project {} is overdue with {} overdue tasks",
                    project.name, project.overdue_tasks
                ),
            }),
            HealthStatus::AtRisk => risks.push(Risk {
                kind: RiskType::Project,
                severity: Severity::Medium,
                description: format!(
                    "Project {} is at risk with {}% completion",
                    project.name, project.progress
                ),
            }),
            _ => {}
        }
    }
    for resource in resources.iter().filter(|r| r.utilization > 90) {
        risks.push(Risk {
            kind: RiskType::Resource,
            severity: Severity::High,
            description: format!(
                "Resource {} is over-utilized at {}%",
                resource.name, resource.utilization
            ),
        });
    }
    if forecast.budget_variance > 10.0 {
        risks.push(Risk {
            kind: RiskType::Budget,
            severity: Severity::High,
            description: format!(
                "Budget variance of {}% exceeds acceptable threshold",
                forecast.budget_variance
            ),
        });
    }
    risks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        dates::parse_date(s).unwrap()
    }

    fn project(id: i64, name: &str) -> Project {
        serde_json::from_value(serde_json::json!({"id": id, "name": name})).unwrap()
    }

    fn card(id: i64, project_id: i64, status: &str, assignee: Option<&str>, due: Option<&str>) -> Card {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "project_id": project_id,
            "title": format!("Card {}", id),
            "status": status,
            "assignee": assignee,
            "due_date": due,
        }))
        .unwrap()
    }

    fn sample() -> BoardData {
        BoardData {
            projects: vec![project(1, "Alpha"), project(2, "Beta"), project(3, "Empty")],
            cards: vec![
                card(1, 1, "done", Some("ann"), None),
                card(2, 1, "in_progress", Some("ann"), Some("2024-05-20")),
                card(3, 2, "todo", Some("bob"), Some("2024-05-01")),
                card(4, 2, "done", None, Some("2024-04-01")),
            ],
        }
    }

    #[test]
    fn test_project_health_statuses() {
        let health = project_health(&sample(), day("2024-05-10"));
        assert_eq!(health.len(), 2, "projects without cards are skipped");
        assert_eq!(health[0].name, "Alpha");
        assert_eq!(health[0].status, HealthStatus::OnTrack);
        assert_eq!(health[0].progress, 50.0);
        assert_eq!(health[0].spent, 50_000.0);
        assert_eq!(health[1].status, HealthStatus::Overdue);
        assert_eq!(health[1].overdue_tasks, 1, "done cards are never overdue");
    }

    #[test]
    fn test_health_at_risk_and_completed() {
        let mut data = sample();
        data.cards = vec![
            card(1, 1, "todo", None, None),
            card(2, 1, "todo", None, None),
            card(3, 1, "todo", None, None),
            card(4, 1, "done", None, None),
            card(5, 2, "done", None, None),
        ];
        let health = project_health(&data, day("2024-05-10"));
        assert_eq!(health[0].status, HealthStatus::AtRisk);
        assert_eq!(health[0].progress, 25.0);
        assert_eq!(health[1].status, HealthStatus::Completed);
    }

    #[test]
    fn test_health_status_uses_exact_ratio() {
        let near_done: Vec<Card> = (1..=2500)
            .map(|id| card(id, 1, if id == 1 { "todo" } else { "done" }, None, None))
            .collect();
        let data = BoardData {
            projects: vec![project(1, "Alpha")],
            cards: near_done,
        };
        let health = project_health(&data, day("2024-05-10"));
        assert_eq!(health[0].progress, 100.0);
        assert_eq!(health[0].status, HealthStatus::OnTrack);

        // 2999 of 10000 rounds up to 30.0 but is still below the threshold.
        let data = BoardData {
            projects: vec![project(1, "Alpha")],
            cards: (1..=10_000)
                .map(|id| card(id, 1, if id <= 2999 { "done" } else { "todo" }, None, None))
                .collect(),
        };
        let health = project_health(&data, day("2024-05-10"));
        assert_eq!(health[0].progress, 30.0);
        assert_eq!(health[0].status, HealthStatus::AtRisk);
    }

    #[test]
    fn test_resource_utilization() {
        let mut data = sample();
        for id in 10..20 {
            data.cards.push(card(id, 1, "todo", Some("bob"), None));
        }
        let resources = resource_utilization(&data, day("2024-05-10"));
        assert_eq!(resources.len(), 2);
        assert_eq!(resources[0].name, "ann");
        assert_eq!(resources[0].utilization, 20);
        assert_eq!(resources[0].completed_tasks, 1);
        assert_eq!(resources[0].in_progress_tasks, 1);
        assert_eq!(resources[1].utilization, 100, "capped at 100");
        assert_eq!(resources[1].overdue_tasks, 1);
        assert_eq!(resources[1].capacity, RESOURCE_CAPACITY);
    }

    #[test]
    fn test_predictive_empty() {
        let p = predictive(&[], day("2024-05-10"));
        assert_eq!(p.estimated_completion, None);
        assert_eq!(p.budget_variance, 0.0);
        assert_eq!(p.risk_score, 0.0);
    }

    #[test]
    fn test_predictive_figures() {
        let today = day("2024-05-10");
        let health = project_health(&sample(), today);
        let p = predictive(&health, today);
        // Both projects are half done.
        assert_eq!(p.average_progress, 50.0);
        assert_eq!(p.estimated_completion.as_deref(), Some("2024-08-18"));
        assert_eq!(p.budget_variance, -50.0);
        // One overdue of two: (2 / 2) * 50 + 50
        assert_eq!(p.risk_score, 100.0);
    }

    #[test]
    fn test_gantt_skips_archived_and_undated() {
        let mut data = sample();
        data.projects[1].archived = true;
        let rows = gantt(&data);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].progress, 50.0);
        assert_eq!(rows[0].cards.len(), 1);
        assert_eq!(rows[1].name, "Empty");
        assert_eq!(rows[1].progress, 0.0);
    }

    #[test]
    fn test_velocity_buckets_by_month() {
        let mut data = sample();
        data.cards[0].completed_at = Some("2024-05-02 10:00:00".into());
        data.cards[3].completed_at = Some("2024-01-15 08:00:00".into());
        data.cards[1].completed_at = Some("2023-10-01 08:00:00".into());
        let points = velocity(&data, day("2024-05-10"));
        let months: Vec<&str> = points.iter().map(|p| p.month.as_str()).collect();
        assert_eq!(months, ["2023-12", "2024-01", "2024-02", "2024-03", "2024-04", "2024-05"]);
        assert_eq!(points[1].completed, 1);
        assert_eq!(points[5].completed, 1);
        assert_eq!(points.iter().map(|p| p.completed).sum::<u32>(), 2);
    }

    #[test]
    fn test_risk_report() {
        let now = day("2024-05-10").and_hms_opt(12, 0, 0).unwrap();
        let report = report(ReportKind::RiskAssessment, &sample(), now);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["title"], "Risk Assessment Report");
        assert_eq!(json["summary"]["high_severity"], 1);
        assert_eq!(json["risks"][0]["type"], "project");
        assert_eq!(json["risk_score"], 100.0);
    }

    #[test]
    fn test_resource_report_summary() {
        let now = day("2024-05-10").and_hms_opt(12, 0, 0).unwrap();
        let report = report(ReportKind::ResourceUtilization, &sample(), now);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["summary"]["total_resources"], 2);
        assert_eq!(json["summary"]["normal_utilization"], 2);
    }

    #[test]
    fn test_report_kind_parse() {
        assert_eq!(
            "project-health".parse::<ReportKind>().unwrap(),
            ReportKind::ProjectHealth
        );
        assert!("performance".parse::<ReportKind>().is_err());
    }
}
