//! Rendering of the per-run report and the notification seam.

use chrono::{DateTime, Local, TimeDelta};

use crate::identity::ServerIdentity;
use crate::pipelines::PipelineOutcome;

/// Receives the rendered report. Transport (mail, chat, ...) is an external
/// concern; the core only produces content.
pub trait Notifier {
    fn notify(&self, subject: &str, body: &str);
}

/// Default transport: the report lands in the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, subject: &str, body: &str) {
        log::info!(target: "notify", "{subject}\n{body}");
    }
}

/// Sends an immediate failure notification with the standard warning subject.
pub fn send_failure(notifier: &dyn Notifier, body: &str) {
    notifier.notify(&subject(false, Local::now()), body);
}

/// Subject line for a run notification.
///
/// Runs are scheduled around midnight, so six hours back still names the day
/// whose data was backed up.
pub fn subject(success: bool, now: DateTime<Local>) -> String {
    let backup_day = (now - TimeDelta::hours(6)).format("%a %d");
    if success {
        format!("{backup_day} - Backup success ^_^")
    } else {
        format!("WARNING: {} BACKUP FAILED!", backup_day.to_string().to_uppercase())
    }
}

/// Identity and addressing metadata of one run.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub identity: ServerIdentity,
    pub endpoint: String,
    pub bucket: String,
    pub restic_repository: String,
}

/// Renders the summary handed to the notifier. Pure formatting, no side
/// effects.
pub fn render(
    databases: &PipelineOutcome,
    volumes: &PipelineOutcome,
    context: &RunContext,
) -> String {
    let success = databases.success && volumes.success;
    let mut report = String::new();

    report.push_str(if success {
        "All backups were successful.\n"
    } else {
        "Some backups FAILED.\n"
    });
    report.push_str(&format!("\nServer: {}\n", context.identity));
    report.push_str(&format!("S3 endpoint: {}\n", context.endpoint));
    report.push_str(&format!("S3 bucket: {}\n", context.bucket));
    report.push_str(&format!("Restic repository: {}\n", context.restic_repository));

    report.push_str("\nDatabase dumps:\n");
    if databases.names.is_empty() {
        report.push_str("  (none)\n");
    }
    for name in &databases.names {
        report.push_str(&format!("  - {name}\n"));
    }

    report.push_str("\nVolume paths:\n");
    if volumes.names.is_empty() {
        report.push_str("  (none)\n");
    }
    for path in &volumes.names {
        report.push_str(&format!("  - {path}\n"));
    }

    let failures = databases.failures.iter().chain(&volumes.failures);
    if failures.clone().next().is_some() {
        report.push_str("\nFailures:\n");
        for failure in failures {
            report.push_str(&format!("  - {failure}\n"));
        }
    }

    report.push_str(&format!(
        "\nInspect the snapshot repository with:\n  restic -r {repo} snapshots\n  restic -r {repo} mount /mnt/restic\n",
        repo = context.restic_repository
    ));

    report
}
