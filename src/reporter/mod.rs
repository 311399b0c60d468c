use crate::analyzer::report::{WeeklySummary, build_weekly_summary, render_html};
use crate::analyzer::trailing_week_start;
use crate::db::{Database, UserRow};
use crate::mailer::{Mailer, OutgoingMail};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

const DIGEST_SUBJECT: &str = "Your Weekly Productivity Report 🚀";

pub trait DigestRenderer: Send + Sync {
    fn render(&self, user: &UserRow, summary: &WeeklySummary) -> Result<String>;
}

pub struct HtmlDigestRenderer;

impl DigestRenderer for HtmlDigestRenderer {
    fn render(&self, user: &UserRow, summary: &WeeklySummary) -> Result<String> {
        Ok(render_html(&user.name, summary))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReportRunSummary {
    pub sent: usize,
    pub skipped: usize,
    pub failed: usize,
}

enum DigestOutcome {
    Sent,
    Skipped,
}

/// Sends the trailing-week digest to every user, one user at a time.
pub struct WeeklyReporter {
    database: Arc<Database>,
    mailer: Arc<dyn Mailer>,
    renderer: Arc<dyn DigestRenderer>,
    mail_from: String,
}

impl WeeklyReporter {
    pub fn new(database: Arc<Database>, mailer: Arc<dyn Mailer>, mail_from: &str) -> Self {
        Self {
            database,
            mailer,
            renderer: Arc::new(HtmlDigestRenderer),
            mail_from: mail_from.to_string(),
        }
    }

    #[cfg(test)]
    pub fn with_renderer(mut self, renderer: Arc<dyn DigestRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn mailer_description(&self) -> String {
        self.mailer.describe()
    }

    /// Fails only when the user list cannot be loaded. Errors for a single
    /// user are logged and counted, and the batch moves on.
    pub async fn run(&self, today: NaiveDate) -> Result<ReportRunSummary> {
        info!(date = %today, "running weekly report generation");

        let users = self
            .database
            .list_users()
            .context("Failed to load users for weekly reports")?;

        let mut summary = ReportRunSummary::default();

        for user in &users {
            match self.send_digest(user, today).await {
                Ok(DigestOutcome::Sent) => {
                    summary.sent += 1;
                    info!(user_id = user.id, email = %user.email, "weekly report sent");
                }
                Ok(DigestOutcome::Skipped) => {
                    summary.skipped += 1;
                }
                Err(error) => {
                    summary.failed += 1;
                    error!(
                        user_id = user.id,
                        email = %user.email,
                        error = %format!("{error:#}"),
                        "weekly report failed for user"
                    );
                }
            }
        }

        info!(
            users = users.len(),
            sent = summary.sent,
            skipped = summary.skipped,
            failed = summary.failed,
            "weekly report generation finished"
        );

        Ok(summary)
    }

    async fn send_digest(&self, user: &UserRow, today: NaiveDate) -> Result<DigestOutcome> {
        let from = trailing_week_start(today);
        let activities = self.database.activities_since(user.id, from)?;

        let Some(summary) = build_weekly_summary(&activities, from, today) else {
            return Ok(DigestOutcome::Skipped);
        };

        let html = self
            .renderer
            .render(user, &summary)
            .context("Failed to render weekly digest")?;

        self.mailer
            .send(&OutgoingMail {
                from: self.mail_from.clone(),
                to: user.email.clone(),
                subject: DIGEST_SUBJECT.to_string(),
                html,
            })
            .await
            .context("Failed to send weekly digest")?;

        Ok(DigestOutcome::Sent)
    }
}
