use crate::error::{CleanupError, Result};
use crate::records::{RemovedSubscription, UnlicensedUser};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use tracing::info;

pub const REMOVED_SUBSCRIPTIONS_FILE: &str = "removed_subscriptions.csv";
pub const UNLICENSED_USERS_FILE: &str = "unlicensed_users.csv";
pub const FAILED_RUN_FILE: &str = "removed_subscriptions-failed.csv";

#[derive(Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct SubscriptionRow<'a> {
    site_name: &'a str,
    user_name: &'a str,
    user_role: &'a str,
    last_login: String,
    subject: &'a str,
    view_name: &'a str,
    view_url: String,
}

impl<'a> From<&'a RemovedSubscription> for SubscriptionRow<'a> {
    fn from(row: &'a RemovedSubscription) -> Self {
        Self {
            site_name: &row.site_name,
            user_name: &row.user_name,
            user_role: &row.site_role,
            last_login: row.last_login.to_string(),
            subject: &row.subject,
            view_name: &row.view_name,
            view_url: row.view_link_html(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct UserRow<'a> {
    site_name: &'a str,
    user_name: &'a str,
    user_email: &'a str,
    user_role: &'a str,
    last_login: String,
    user_fullname: &'a str,
    site_content_url: &'a str,
    user_id: &'a str,
}

impl<'a> From<&'a UnlicensedUser> for UserRow<'a> {
    fn from(user: &'a UnlicensedUser) -> Self {
        Self {
            site_name: &user.site_name,
            user_name: &user.user_name,
            user_email: user.user_email.as_deref().unwrap_or(""),
            user_role: &user.site_role,
            last_login: user.last_login.to_string(),
            user_fullname: user.full_name.as_deref().unwrap_or(""),
            site_content_url: &user.site_content_url,
            user_id: &user.user_id,
        }
    }
}

/// Writes run reports into one directory, replacing files from earlier runs.
pub struct ReportWriter {
    dir: PathBuf,
}

impl ReportWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn write_removed(&self, rows: &[RemovedSubscription]) -> Result<PathBuf> {
        self.write(REMOVED_SUBSCRIPTIONS_FILE, rows.iter().map(SubscriptionRow::from))
    }

    pub fn write_unlicensed(&self, users: &[UnlicensedUser]) -> Result<PathBuf> {
        self.write(UNLICENSED_USERS_FILE, users.iter().map(UserRow::from))
    }

    /// Snapshot written by the removal stage regardless of how it went.
    pub fn write_failed_run(&self, rows: &[RemovedSubscription]) -> Result<PathBuf> {
        self.write(FAILED_RUN_FILE, rows.iter().map(SubscriptionRow::from))
    }

    fn write<T: Serialize>(&self, file_name: &str, rows: impl Iterator<Item = T>) -> Result<PathBuf> {
        let path = self.dir.join(file_name);
        let report_err = |source: csv::Error| CleanupError::Report {
            path: path.clone(),
            source,
        };

        fs::create_dir_all(&self.dir).map_err(|e| report_err(e.into()))?;
        let mut writer = csv::Writer::from_path(&path).map_err(report_err)?;
        let mut count = 0usize;
        for row in rows {
            writer.serialize(row).map_err(report_err)?;
            count += 1;
        }
        writer.flush().map_err(|e| report_err(e.into()))?;

        info!(action = "write", component = "report", path = ?path, rows = count, "Report written");
        Ok(path)
    }
}
