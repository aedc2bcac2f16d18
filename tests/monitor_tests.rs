use async_trait::async_trait;
use chrono::{Local, TimeZone};
use logsync::config::{HourlySummaryConfig, MonitorConfig};
use logsync::monitor::{
    FreshnessMonitor, HourState, HourlyOutcome, HourlyReporter, Notifier, NotifyError, ReportLog,
    SourceState, StatusStore,
};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
    fail: bool,
}

impl RecordingNotifier {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn subjects(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(s, _)| s.clone()).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_html(&self, subject: &str, html: &str) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .unwrap()
            .push((subject.to_string(), html.to_string()));
        if self.fail {
            return Err(NotifyError::Closed("test"));
        }
        Ok(())
    }
}

fn monitor_config(dir: &Path) -> MonitorConfig {
    MonitorConfig {
        log_base_dir: dir.join("incoming"),
        status_file: dir.join("state/status.json"),
        report_file: dir.join("state/report.log"),
        linecount_file: dir.join("linecount.log"),
        hour_state_file: dir.join("state/hour.json"),
        threshold: Duration::from_secs(5 * 60),
        ..MonitorConfig::default()
    }
}

fn touch(path: &Path, age: Duration) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, "x\n").unwrap();
    std::fs::File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(SystemTime::now() - age)
        .unwrap();
}

#[tokio::test]
async fn test_freshness_alerts_recovers_and_persists() {
    let dir = TempDir::new().unwrap();
    let config = monitor_config(dir.path());
    let base = config.log_base_dir.clone();

    touch(&base.join("10.0.0.1/fresh.log"), Duration::from_secs(30));
    touch(&base.join("10.0.0.2/stale.log"), Duration::from_secs(3600));
    std::fs::create_dir_all(base.join("10.0.0.3")).unwrap();
    std::fs::create_dir_all(base.join("not-an-ip")).unwrap();

    let notifier = Arc::new(RecordingNotifier::default());
    let report = ReportLog::new(config.report_file.clone());
    let monitor = FreshnessMonitor::new(&config, report, notifier.clone());

    let outcome = monitor.run_pass(Local::now()).await.unwrap();
    assert_eq!(outcome.statuses.len(), 3);
    assert_eq!(outcome.statuses["10.0.0.1"].status, SourceState::Active);
    assert_eq!(outcome.statuses["10.0.0.2"].status, SourceState::Inactive);
    assert_eq!(outcome.statuses["10.0.0.3"].status, SourceState::Missing);
    assert_eq!(
        notifier.subjects(),
        vec!["ALERT: 2 server(s) inactive/missing >5 min"]
    );

    // Second pass: only the missing origin alerts again.
    monitor.run_pass(Local::now()).await.unwrap();
    assert_eq!(
        notifier.subjects()[1],
        "ALERT: 1 server(s) inactive/missing >5 min"
    );

    // Both come back.
    touch(&base.join("10.0.0.2/new.log"), Duration::ZERO);
    touch(&base.join("10.0.0.3/first.log"), Duration::ZERO);
    let outcome = monitor.run_pass(Local::now()).await.unwrap();
    assert_eq!(outcome.recoveries, vec!["10.0.0.2", "10.0.0.3"]);
    assert_eq!(
        notifier.subjects()[2],
        "RECOVERY: 2 server(s) active again"
    );
    assert_eq!(notifier.subjects().len(), 3);

    let stored = StatusStore::new(config.status_file.clone()).load();
    assert_eq!(stored, outcome.statuses);
    assert_eq!(stored["10.0.0.2"].latest_file.as_deref(), Some("new.log"));

    let report = std::fs::read_to_string(&config.report_file).unwrap();
    assert!(report.contains("No log files found for server 10.0.0.3"));
    assert!(report.contains("Scanned 3 servers | Inactive: 2"));
    assert!(report.contains("Scanned 3 servers | Inactive: 0"));
    assert!(report.contains("INFO: 2 servers recovered. Email sent."));
}

#[tokio::test]
async fn test_failed_notification_still_persists_status() {
    let dir = TempDir::new().unwrap();
    let config = monitor_config(dir.path());
    std::fs::create_dir_all(config.log_base_dir.join("10.0.0.9")).unwrap();

    let notifier = Arc::new(RecordingNotifier::failing());
    let monitor = FreshnessMonitor::new(
        &config,
        ReportLog::new(config.report_file.clone()),
        notifier.clone(),
    );

    monitor.run_pass(Local::now()).await.unwrap();

    assert_eq!(notifier.subjects().len(), 1);
    let stored = StatusStore::new(config.status_file.clone()).load();
    assert_eq!(stored["10.0.0.9"].status, SourceState::Missing);
}

#[cfg(unix)]
#[tokio::test]
async fn test_unreadable_origin_is_reported_and_left_out() {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().unwrap();
    let config = monitor_config(dir.path());
    let base = config.log_base_dir.clone();
    touch(&base.join("10.0.0.1/fresh.log"), Duration::from_secs(30));
    touch(&base.join("10.0.0.4/old.log"), Duration::from_secs(30));

    let notifier = Arc::new(RecordingNotifier::default());
    let monitor = FreshnessMonitor::new(
        &config,
        ReportLog::new(config.report_file.clone()),
        notifier.clone(),
    );
    let first = monitor.run_pass(Local::now()).await.unwrap();
    assert_eq!(first.statuses["10.0.0.4"].status, SourceState::Active);

    let locked = base.join("10.0.0.4");
    std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();
    if std::fs::read_dir(&locked).is_ok() {
        // Privileged users read through the mode bits.
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();
        return;
    }

    let outcome = monitor.run_pass(Local::now()).await;
    std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();
    let outcome = outcome.unwrap();

    assert!(!outcome.statuses.contains_key("10.0.0.4"));
    assert_eq!(outcome.statuses["10.0.0.1"].status, SourceState::Active);
    assert!(outcome.missing.is_empty());
    assert!(outcome.alerts.is_empty());
    assert!(notifier.subjects().is_empty());

    let report = std::fs::read_to_string(&config.report_file).unwrap();
    assert!(report.contains("Error reading directory"));
    assert!(!StatusStore::new(config.status_file.clone())
        .load()
        .contains_key("10.0.0.4"));
}

const LEDGER: &str = "\
2024-01-01 12:01:02 | MyGP_accessLog_24010111_00-19_1-2-3-4.log | lines: 120
2024-01-01 12:01:03 | MyGP_accessLog_24010111_20-39_1-2-3-4.log | lines=30
2024-01-01 11:01:03 | MyGP_accessLog_24010110_40-59_1-2-3-4.log | lines: 7
";

fn local(hour: u32, minute: u32) -> chrono::DateTime<Local> {
    Local
        .with_ymd_and_hms(2024, 1, 1, hour, minute, 0)
        .single()
        .unwrap()
}

fn reporter(config: &MonitorConfig, notifier: Arc<RecordingNotifier>) -> HourlyReporter {
    HourlyReporter::new(config, ReportLog::new(config.report_file.clone()), notifier).unwrap()
}

fn hour_state(config: &MonitorConfig) -> HourState {
    let text = std::fs::read_to_string(&config.hour_state_file).unwrap();
    serde_json::from_str(&text).unwrap()
}

#[tokio::test]
async fn test_hourly_summary_is_sent_once_per_hour() {
    let dir = TempDir::new().unwrap();
    let config = monitor_config(dir.path());
    std::fs::write(&config.linecount_file, LEDGER).unwrap();

    let notifier = Arc::new(RecordingNotifier::default());
    let reporter = reporter(&config, notifier.clone());

    let first = reporter.run_pass(local(12, 20)).await.unwrap();
    match first {
        HourlyOutcome::Reported(summary) => {
            assert_eq!(summary.hour, "24010111");
            assert_eq!(summary.entries.len(), 2);
            assert_eq!(summary.total_lines, 150);
        }
        other => panic!("expected a report, got {other:?}"),
    }

    let second = reporter.run_pass(local(12, 40)).await.unwrap();
    assert_eq!(second, HourlyOutcome::AlreadyReported("24010111".to_string()));

    assert_eq!(
        notifier.subjects(),
        vec!["HOURLY SUMMARY 24010111: 2 files, 150 lines"]
    );
    assert_eq!(
        hour_state(&config).last_reported_hour.as_deref(),
        Some("24010111")
    );
}

#[tokio::test]
async fn test_hourly_waits_for_grace_period() {
    let dir = TempDir::new().unwrap();
    let config = monitor_config(dir.path());
    std::fs::write(&config.linecount_file, LEDGER).unwrap();

    let notifier = Arc::new(RecordingNotifier::default());
    let reporter = reporter(&config, notifier.clone());

    assert_eq!(
        reporter.run_pass(local(12, 14)).await.unwrap(),
        HourlyOutcome::TooEarly
    );
    assert!(notifier.subjects().is_empty());
    assert!(!config.hour_state_file.exists());
}

#[tokio::test]
async fn test_hourly_without_ledger_or_entries_keeps_state() {
    let dir = TempDir::new().unwrap();
    let config = monitor_config(dir.path());
    let notifier = Arc::new(RecordingNotifier::default());
    let reporter = reporter(&config, notifier.clone());

    assert_eq!(
        reporter.run_pass(local(12, 30)).await.unwrap(),
        HourlyOutcome::NoLedger
    );

    std::fs::write(&config.linecount_file, LEDGER).unwrap();
    assert_eq!(
        reporter.run_pass(local(15, 30)).await.unwrap(),
        HourlyOutcome::NoEntries("24010114".to_string())
    );
    assert!(!config.hour_state_file.exists());

    // The ledger catches up later and the hour can still be reported.
    assert!(matches!(
        reporter.run_pass(local(12, 45)).await.unwrap(),
        HourlyOutcome::Reported(_)
    ));
    assert_eq!(notifier.subjects().len(), 1);
}

#[tokio::test]
async fn test_hourly_disabled() {
    let dir = TempDir::new().unwrap();
    let config = MonitorConfig {
        hourly_summary: HourlySummaryConfig {
            enabled: false,
            send_after_minutes: 0,
        },
        ..monitor_config(dir.path())
    };
    std::fs::write(&config.linecount_file, LEDGER).unwrap();

    let notifier = Arc::new(RecordingNotifier::default());
    assert_eq!(
        reporter(&config, notifier.clone())
            .run_pass(local(12, 30))
            .await
            .unwrap(),
        HourlyOutcome::Disabled
    );
    assert!(notifier.subjects().is_empty());
}

#[tokio::test]
async fn test_hourly_failed_send_still_records_hour() {
    let dir = TempDir::new().unwrap();
    let config = monitor_config(dir.path());
    std::fs::write(&config.linecount_file, LEDGER).unwrap();

    let notifier = Arc::new(RecordingNotifier::failing());
    let reporter = reporter(&config, notifier.clone());

    assert!(matches!(
        reporter.run_pass(local(12, 20)).await.unwrap(),
        HourlyOutcome::Reported(_)
    ));
    assert_eq!(
        hour_state(&config).last_reported_hour.as_deref(),
        Some("24010111")
    );
}
