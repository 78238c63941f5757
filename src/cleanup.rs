use crate::config::Config;
use crate::error::Result;
use crate::notify::{Mailer, Notifier};
use crate::records::RunSummary;
use crate::remove::{remove_subscriptions, RemoveOptions};
use crate::report::ReportWriter;
use crate::scan::find_unlicensed_users;
use crate::server::TableauServer;
use crate::sweep::{retention_threshold, sweep_logs};
use std::time::{Instant, SystemTime};
use tracing::{error, info, warn};

const BANNER: &str = "###############";

#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub dry_run: bool,
    /// Reference time for log retention.
    pub now: SystemTime,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            now: SystemTime::now(),
        }
    }
}

/// Runs the cleanup and, if it fails, tells the admin list.
pub fn execute(
    config: &Config,
    server: &dyn TableauServer,
    mailer: &dyn Mailer,
    options: RunOptions,
) -> Result<RunSummary> {
    info!("{} Subscription CleanUp Operation Started {}", BANNER, BANNER);

    match run(config, server, mailer, options) {
        Ok(summary) => {
            info!("{} Subscription CleanUp Operation Completed {}", BANNER, BANNER);
            Ok(summary)
        }
        Err(e) => {
            error!(action = "abort", component = "cleanup", error = %e, "Cleanup run failed");
            notify_failure(config, mailer, options.dry_run);
            info!("{} Subscription CleanUp Operation Failed {}", BANNER, BANNER);
            Err(e)
        }
    }
}

pub fn notify_failure(config: &Config, mailer: &dyn Mailer, dry_run: bool) {
    if dry_run {
        info!(action = "dry_run", component = "notifier", "Skipping failure email");
        return;
    }
    let notifier = Notifier::new(mailer, &config.smtp, &config.tableau.server_url);
    if let Err(e) = notifier.send_admin_failure() {
        error!(action = "send", component = "notifier", error = %e, "Failed to send failure email to admin team");
    }
}

/// Sweep, scan, remove, notify, report. Item-level failures are absorbed by
/// the stages; only stage-level failures come back as `Err`.
pub fn run(
    config: &Config,
    server: &dyn TableauServer,
    mailer: &dyn Mailer,
    options: RunOptions,
) -> Result<RunSummary> {
    let start_time = Instant::now();
    let mut summary = RunSummary {
        dry_run: options.dry_run,
        ..RunSummary::default()
    };

    let threshold = retention_threshold(options.now, config.paths.log_retention_days);
    match sweep_logs(&config.paths.log_dir, threshold) {
        Ok(report) => info!(
            action = "complete",
            component = "log_sweep",
            deleted = report.deleted.len(),
            skipped = report.skipped_non_files,
            "Log sweep completed"
        ),
        Err(e) => error!(action = "abort", component = "log_sweep", error = %e, "Error while deleting log files"),
    }

    let reports = ReportWriter::new(&config.paths.report_dir);
    let users = match find_unlicensed_users(server, &config.tableau.site) {
        Ok(users) => users,
        Err(e) => {
            // Leave an empty snapshot so the failed run is visible next to the reports
            if let Err(report_err) = reports.write_failed_run(&[]) {
                error!(action = "write", component = "report", error = %report_err, "Failed to write failed-run report");
            }
            return Err(e);
        }
    };
    summary.users_scanned = users.len();

    let removal = remove_subscriptions(
        server,
        config.server_base(),
        &users,
        RemoveOptions {
            dry_run: options.dry_run,
        },
    );
    summary.subscriptions_removed = removal.removed.len();

    reports.write_failed_run(&removal.removed)?;
    summary.reports_written += 1;

    if removal.is_empty() {
        info!(action = "complete", component = "cleanup", "No subscriptions removed, nothing to report");
        return Ok(summary);
    }

    if options.dry_run {
        info!(
            action = "dry_run",
            component = "notifier",
            recipients = removal.payloads.len(),
            "Skipping user and admin emails"
        );
    } else {
        let notifier = Notifier::new(mailer, &config.smtp, &config.tableau.server_url);
        summary.emails_sent = notifier.send_user_notices(&removal.payloads);
        match notifier.send_admin_success(&removal.removed) {
            Ok(()) => summary.emails_sent += 1,
            Err(e) => error!(
                action = "send",
                component = "notifier",
                error = %e,
                "Failed to send completion email to admin team"
            ),
        }
    }

    let without_email = removal.removed.iter().filter(|r| r.user_email.is_none()).count();
    if without_email > 0 {
        warn!(
            action = "notify",
            component = "cleanup",
            subscriptions = without_email,
            "Removed subscriptions of users without an email address"
        );
    }

    reports.write_removed(&removal.removed)?;
    reports.write_unlicensed(&users)?;
    summary.reports_written += 2;

    info!(
        action = "complete",
        component = "cleanup",
        users = summary.users_scanned,
        removed = summary.subscriptions_removed,
        emails = summary.emails_sent,
        duration_ms = start_time.elapsed().as_millis(),
        "Cleanup completed"
    );
    Ok(summary)
}

pub fn print_summary(summary: &RunSummary) {
    let mode = if summary.dry_run { " (dry run)" } else { "" };
    println!("\n--- Subscription Cleanup{} ---", mode);
    println!("Unlicensed users found: {}", summary.users_scanned);
    if summary.dry_run {
        println!("Subscriptions that would be removed: {}", summary.subscriptions_removed);
    } else {
        println!("Subscriptions removed: {}", summary.subscriptions_removed);
    }
    println!("Emails sent: {}", summary.emails_sent);
    println!("Reports written: {}", summary.reports_written);
    println!("Done!");
}
