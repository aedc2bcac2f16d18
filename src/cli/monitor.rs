use crate::cli::{ensure_parent, RunError};
use crate::config::{Config, ConfigError};
use crate::monitor::{
    FreshnessMonitor, HourlyOutcome, HourlyReporter, Notifier, ReportLog, SmtpNotifier,
    TEST_MAIL_BODY, TEST_MAIL_SUBJECT,
};
use chrono::Local;
use std::sync::Arc;
use tracing::info;

/// One freshness scan, then one hourly-summary pass unless `skip_hourly`.
pub async fn run(config: &Config, test_mail: bool, skip_hourly: bool) -> Result<(), RunError> {
    let monitor = config
        .monitor
        .as_ref()
        .ok_or(ConfigError::MissingSection("monitor"))?;

    let notifier: Arc<dyn Notifier> = Arc::new(SmtpNotifier::new(monitor.email.clone()));

    if test_mail {
        notifier.send_html(TEST_MAIL_SUBJECT, TEST_MAIL_BODY).await?;
        println!("Test email sent to {}", monitor.email.recipients.join(", "));
        return Ok(());
    }

    for path in [
        &monitor.status_file,
        &monitor.report_file,
        &monitor.hour_state_file,
    ] {
        ensure_parent(path);
    }

    let report = ReportLog::new(monitor.report_file.clone());

    let freshness = FreshnessMonitor::new(monitor, report.clone(), notifier.clone());
    let outcome = freshness.run_pass(Local::now()).await?;
    info!(
        origins = outcome.statuses.len(),
        alerts = outcome.alerts.len(),
        recoveries = outcome.recoveries.len(),
        "Freshness pass complete"
    );

    if skip_hourly {
        return Ok(());
    }

    let hourly = HourlyReporter::new(monitor, report, notifier)?;
    match hourly.run_pass(Local::now()).await? {
        HourlyOutcome::Reported(summary) => info!(
            hour = %summary.hour,
            files = summary.entries.len(),
            lines = summary.total_lines,
            "Hourly summary reported"
        ),
        other => info!(outcome = ?other, "No hourly summary this pass"),
    }

    Ok(())
}
