//! Mentions, outgoing mail and the daily overdue digest.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use serde::Serialize;
use tokio::sync::watch;

use super::db::DbHandle;
use super::models::{Card, User, UserStatus};
use crate::config::NotificationsSection;

static MENTION_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"@(\w+)").unwrap());

/// Settings key holding the date of the last digest run.
pub const LAST_DIGEST_KEY: &str = "overdue_digest_last_sent";

/// Usernames mentioned as `@name`, deduplicated, in order of first use.
pub fn extract_mentions(content: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for cap in MENTION_REGEX.captures_iter(content) {
        let name = cap[1].to_string();
        if !seen.contains(&name) {
            seen.push(name);
        }
    }
    seen
}

// ── Mail ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Mail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: &Mail) -> Result<()>;
}

/// Writes mail to the log instead of delivering it.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: &Mail) -> Result<()> {
        tracing::info!(to = %mail.to, subject = %mail.subject, "mail (not delivered, no relay configured)");
        tracing::debug!(body = %mail.body, "mail body");
        Ok(())
    }
}

/// Posts each mail as JSON to an HTTP relay.
pub struct WebhookMailer {
    client: reqwest::Client,
    url: String,
    from: String,
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

impl WebhookMailer {
    pub fn new(url: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            from: from.into(),
        }
    }
}

#[async_trait]
impl Mailer for WebhookMailer {
    async fn send(&self, mail: &Mail) -> Result<()> {
        let payload = WebhookPayload {
            from: &self.from,
            to: &mail.to,
            subject: &mail.subject,
            text: &mail.body,
        };
        self.client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("Failed to reach mail relay {}", self.url))?
            .error_for_status()
            .context("Mail relay returned error status")?;
        Ok(())
    }
}

pub fn mailer_from_config(config: &NotificationsSection) -> Arc<dyn Mailer> {
    match &config.mail_webhook {
        Some(url) => Arc::new(WebhookMailer::new(url.clone(), config.from.clone())),
        None => Arc::new(LogMailer),
    }
}

/// Send a mail, logging rather than returning failures.
pub async fn deliver(mailer: &dyn Mailer, mail: Mail) {
    if let Err(e) = mailer.send(&mail).await {
        tracing::warn!(to = %mail.to, error = %e, "Failed to send mail");
    }
}

pub fn registration_mail(admin_email: &str, new_user: &User, base_url: &str) -> Mail {
    Mail {
        to: admin_email.to_string(),
        subject: format!("New user registration: {}", new_user.username),
        body: format!(
            "A new user registered and is waiting for approval.\n\n\
             Username: {}\nDisplay name: {}\nEmail: {}\n\n\
             Review pending accounts at {}/admin/users?status=pending\n",
            new_user.username,
            new_user.display(),
            new_user.email.as_deref().unwrap_or("-"),
            base_url.trim_end_matches('/'),
        ),
    }
}

/// Mail telling a user their account status changed, if they have an email.
pub fn status_change_mail(user: &User, base_url: &str) -> Option<Mail> {
    let email = user.email.as_deref().filter(|e| !e.is_empty())?;
    let detail = match user.status {
        UserStatus::Active => format!(
            "Your account has been approved. You can now log in at {}/login.",
            base_url.trim_end_matches('/')
        ),
        UserStatus::Suspended => "Your account has been suspended.".to_string(),
        UserStatus::Inactive => "Your account has been deactivated.".to_string(),
        UserStatus::Pending => "Your account is pending admin approval.".to_string(),
    };
    Some(Mail {
        to: email.to_string(),
        subject: format!("Your account is now {}", user.status.as_str()),
        body: format!("Hello {},\n\n{}\n", user.display(), detail),
    })
}

// ── Overdue digest ───────────────────────────────────────────────────

pub fn overdue_digest_mail(
    user: &User,
    cards: &[Card],
    project_names: &HashMap<i64, String>,
    base_url: &str,
    now: NaiveDateTime,
) -> Option<Mail> {
    let email = user.email.as_deref().filter(|e| !e.is_empty())?;
    let mut body = format!(
        "Hello {},\n\nThere are {} overdue cards that need attention:\n\n",
        user.username,
        cards.len()
    );
    for card in cards {
        let project = project_names
            .get(&card.project_id)
            .map(String::as_str)
            .unwrap_or("Unknown");
        body.push_str(&format!(
            "#{} - {}\n  Project: {}\n  Due: {} | Priority: {} | Assignee: {}\n",
            card.id,
            card.title,
            project,
            card.due_date.as_deref().unwrap_or("-"),
            card.priority.as_str(),
            card.assignee.as_deref().unwrap_or("Unassigned"),
        ));
        if !card.description.is_empty() {
            body.push_str(&format!("  {}\n", card.description));
        }
        body.push('\n');
    }
    body.push_str(&format!(
        "View all issues: {}/issues\n\nGenerated on {}\n",
        base_url.trim_end_matches('/'),
        now.format("%Y-%m-%d at %H:%M")
    ));
    Some(Mail {
        to: email.to_string(),
        subject: format!("pmboard: {} overdue cards need attention", cards.len()),
        body,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DigestReport {
    pub overdue_cards: usize,
    pub sent: usize,
    pub failed: usize,
}

/// Mail every opted-in user the list of overdue cards. Sends nothing when
/// no card is overdue.
pub async fn send_overdue_digest(
    db: &DbHandle,
    mailer: &dyn Mailer,
    base_url: &str,
    now: NaiveDateTime,
) -> Result<DigestReport> {
    let today = now.date();
    let (cards, recipients, project_names) = db
        .call(move |db| {
            let cards = db.overdue_cards(today)?;
            let recipients = db.digest_recipients()?;
            let names: HashMap<i64, String> = db
                .list_projects(None)?
                .into_iter()
                .map(|p| (p.id, p.name))
                .collect();
            Ok((cards, recipients, names))
        })
        .await?;

    let mut report = DigestReport {
        overdue_cards: cards.len(),
        ..Default::default()
    };
    if cards.is_empty() {
        tracing::debug!("No overdue cards, digest skipped");
        return Ok(report);
    }
    for user in &recipients {
        let Some(mail) = overdue_digest_mail(user, &cards, &project_names, base_url, now) else {
            continue;
        };
        match mailer.send(&mail).await {
            Ok(()) => {
                tracing::info!(user = %user.username, cards = cards.len(), "Overdue digest sent");
                report.sent += 1;
            }
            Err(e) => {
                tracing::warn!(user = %user.username, error = %e, "Failed to send overdue digest");
                report.failed += 1;
            }
        }
    }
    Ok(report)
}

/// True once per calendar day, at or after `send_at`.
pub fn digest_due(now: NaiveDateTime, send_at: NaiveTime, last_sent: Option<NaiveDate>) -> bool {
    now.time() >= send_at && last_sent.is_none_or(|last| last < now.date())
}

/// Poll until `shutdown` flips, sending the digest once a day.
pub async fn run_overdue_scheduler(
    db: DbHandle,
    mailer: Arc<dyn Mailer>,
    config: NotificationsSection,
    mut shutdown: watch::Receiver<bool>,
) {
    let send_at = match config.send_at_time() {
        Ok(t) => t,
        Err(e) => {
            tracing::error!(error = %e, "Overdue scheduler disabled");
            return;
        }
    };
    let mut interval = tokio::time::interval(Duration::from_secs(config.poll_secs.max(1)));
    tracing::info!(send_at = %config.send_at, poll_secs = config.poll_secs, "Overdue scheduler started");

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.changed() => break,
        }
        let now = Local::now().naive_local();
        let last_sent = match db.call(|db| db.get_setting(LAST_DIGEST_KEY)).await {
            Ok(v) => v.and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read last digest date");
                continue;
            }
        };
        if !digest_due(now, send_at, last_sent) {
            continue;
        }
        match send_overdue_digest(&db, mailer.as_ref(), &config.base_url, now).await {
            Ok(report) => {
                tracing::info!(
                    overdue = report.overdue_cards,
                    sent = report.sent,
                    failed = report.failed,
                    "Overdue digest run finished"
                );
                let day = now.date().format("%Y-%m-%d").to_string();
                if let Err(e) = db.call(move |db| db.set_setting(LAST_DIGEST_KEY, &day)).await {
                    tracing::warn!(error = %e, "Failed to record digest date");
                }
            }
            Err(e) => tracing::warn!(error = %e, "Overdue digest run failed"),
        }
    }
    tracing::info!("Overdue scheduler stopped");
}
