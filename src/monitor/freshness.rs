use crate::config::types::MonitorConfig;
use crate::monitor::notify::{escape_html, Notifier};
use crate::monitor::report_log::ReportLog;
use crate::monitor::status::{previous_state, SourceState, SourceStatus, StatusMap, StatusStore};
use crate::monitor::MonitorError;
use chrono::{DateTime, Local};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, SystemTime};

pub const LAST_SEEN_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// What one origin directory looked like during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    Latest { file: String, modified: SystemTime },
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlertEntry {
    pub origin: String,
    /// `None` when the origin has no files at all.
    pub latest_file: Option<String>,
    pub last_seen: Option<String>,
    pub age_minutes: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanOutcome {
    pub statuses: StatusMap,
    pub alerts: Vec<AlertEntry>,
    pub recoveries: Vec<String>,
    pub missing: Vec<String>,
}

impl ScanOutcome {
    pub fn down_count(&self) -> usize {
        self.statuses.values().filter(|s| s.status.is_down()).count()
    }
}

/// Computes the next status map from the previous one.
///
/// `missing` origins alert on every scan; `inactive` origins alert only on
/// the scan that moves them into `inactive`. Either one turning `active`
/// again is a recovery.
pub fn evaluate(
    previous: &StatusMap,
    observations: &BTreeMap<String, Observation>,
    now: SystemTime,
    threshold: Duration,
) -> ScanOutcome {
    let mut outcome = ScanOutcome::default();

    for (origin, observation) in observations {
        let prev = previous_state(previous, origin);

        let (file, modified) = match observation {
            Observation::Empty => {
                outcome.missing.push(origin.clone());
                outcome.alerts.push(AlertEntry {
                    origin: origin.clone(),
                    latest_file: None,
                    last_seen: None,
                    age_minutes: None,
                });
                outcome.statuses.insert(
                    origin.clone(),
                    SourceStatus {
                        latest_file: None,
                        last_seen: None,
                        status: SourceState::Missing,
                    },
                );
                continue;
            }
            Observation::Latest { file, modified } => (file, *modified),
        };

        let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
        let last_seen = DateTime::<Local>::from(modified)
            .format(LAST_SEEN_FORMAT)
            .to_string();

        let status = if age > threshold {
            if prev != SourceState::Inactive {
                outcome.alerts.push(AlertEntry {
                    origin: origin.clone(),
                    latest_file: Some(file.clone()),
                    last_seen: Some(last_seen.clone()),
                    age_minutes: Some(round_tenth(age.as_secs_f64() / 60.0)),
                });
            }
            SourceState::Inactive
        } else {
            if prev.is_down() {
                outcome.recoveries.push(origin.clone());
            }
            SourceState::Active
        };

        outcome.statuses.insert(
            origin.clone(),
            SourceStatus {
                latest_file: Some(file.clone()),
                last_seen: Some(last_seen),
                status,
            },
        );
    }

    outcome
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn origin_dir_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d{1,3}(\.\d{1,3}){3}$").expect("static regex"))
}

/// Lists origin directories (dotted IPv4 names) under `base_dir` in sorted
/// order. Directories that cannot be read are reported and left out.
pub fn scan_origins(
    base_dir: &Path,
    report: &ReportLog,
) -> Result<BTreeMap<String, Observation>, MonitorError> {
    let entries = std::fs::read_dir(base_dir).map_err(|source| MonitorError::Io {
        path: base_dir.to_path_buf(),
        source,
    })?;

    let mut observations = BTreeMap::new();
    for entry in entries.flatten() {
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if !origin_dir_pattern().is_match(&name) {
            continue;
        }
        if !entry.path().is_dir() {
            continue;
        }

        match latest_file(&entry.path()) {
            Ok(Some((file, modified))) => {
                observations.insert(name, Observation::Latest { file, modified });
            }
            Ok(None) => {
                observations.insert(name, Observation::Empty);
            }
            Err(e) => {
                report.record(&format!(
                    "Error reading directory {}: {}",
                    entry.path().display(),
                    e
                ));
            }
        }
    }

    Ok(observations)
}

/// Newest regular file in `dir` by modification time.
fn latest_file(dir: &Path) -> std::io::Result<Option<(String, SystemTime)>> {
    let mut latest: Option<(SystemTime, String)> = None;

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let metadata = match entry.metadata() {
            Ok(m) if m.is_file() => m,
            _ => continue,
        };
        let Ok(modified) = metadata.modified() else {
            continue;
        };
        let name = entry.file_name().to_string_lossy().into_owned();

        let candidate = (modified, name);
        if latest.as_ref().map_or(true, |current| candidate > *current) {
            latest = Some(candidate);
        }
    }

    Ok(latest.map(|(modified, name)| (name, modified)))
}

pub fn threshold_label(threshold: Duration) -> String {
    let secs = threshold.as_secs();
    if secs % 60 == 0 {
        format!("{}", secs / 60)
    } else {
        format!("{:.1}", threshold.as_secs_f64() / 60.0)
    }
}

pub fn alert_subject(count: usize, threshold: Duration) -> String {
    format!(
        "ALERT: {count} server(s) inactive/missing >{} min",
        threshold_label(threshold)
    )
}

pub fn recovery_subject(count: usize) -> String {
    format!("RECOVERY: {count} server(s) active again")
}

pub fn render_alert(outcome: &ScanOutcome, generated_at: DateTime<Local>) -> String {
    let mut html = String::from(
        "<html><body style=\"font-family:Arial, sans-serif;\">\n\
         <h3>Inactive / Missing Servers</h3>\n\
         <table border=\"1\" cellpadding=\"6\" cellspacing=\"0\" style=\"border-collapse:collapse;\">\n\
         <thead style=\"background-color:#f2f2f2;\">\n\
         <tr><th>Server</th><th>Last File</th><th>Last Seen</th><th>Age (min)</th></tr>\n\
         </thead><tbody>\n",
    );

    for alert in &outcome.alerts {
        let age = alert
            .age_minutes
            .map(|a| format!("{a:.1}"))
            .unwrap_or_else(|| "-".to_string());
        html.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td align='center'>{}</td></tr>\n",
            escape_html(&alert.origin),
            escape_html(alert.latest_file.as_deref().unwrap_or("No log files")),
            escape_html(alert.last_seen.as_deref().unwrap_or("-")),
            age,
        ));
    }
    html.push_str("</tbody></table>\n");

    if !outcome.missing.is_empty() {
        let names: Vec<String> = outcome.missing.iter().map(|m| escape_html(m)).collect();
        html.push_str(&format!(
            "<p><b>Missing servers (no logs at all):</b><br>{}</p>\n",
            names.join("<br>")
        ));
    }

    html.push_str(&format!(
        "<p>Generated at: {}</p></body></html>",
        generated_at.format(LAST_SEEN_FORMAT)
    ));
    html
}

pub fn render_recovery(recoveries: &[String], generated_at: DateTime<Local>) -> String {
    let mut html = String::from(
        "<html><body style=\"font-family:Arial, sans-serif;\">\n<h3>Recovered Servers</h3><ul>\n",
    );
    for origin in recoveries {
        html.push_str(&format!("<li>{}</li>\n", escape_html(origin)));
    }
    html.push_str(&format!(
        "</ul><p>Generated at: {}</p></body></html>",
        generated_at.format(LAST_SEEN_FORMAT)
    ));
    html
}

/// One scan over the origin directories, alerting and persisting the result.
pub struct FreshnessMonitor {
    base_dir: std::path::PathBuf,
    threshold: Duration,
    store: StatusStore,
    report: ReportLog,
    notifier: Arc<dyn Notifier>,
}

impl FreshnessMonitor {
    pub fn new(config: &MonitorConfig, report: ReportLog, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            base_dir: config.log_base_dir.clone(),
            threshold: config.threshold,
            store: StatusStore::new(config.status_file.clone()),
            report,
            notifier,
        }
    }

    pub async fn run_pass(&self, now: DateTime<Local>) -> Result<ScanOutcome, MonitorError> {
        let previous = self.store.load();
        let observations = scan_origins(&self.base_dir, &self.report)?;
        let outcome = evaluate(&previous, &observations, now.into(), self.threshold);

        for origin in &outcome.missing {
            self.report
                .record(&format!("No log files found for server {origin}"));
        }
        self.report.record(&format!(
            "Scanned {} servers | Inactive: {}",
            outcome.statuses.len(),
            outcome.down_count()
        ));

        if !outcome.alerts.is_empty() {
            let subject = alert_subject(outcome.alerts.len(), self.threshold);
            let html = render_alert(&outcome, now);
            match self.notifier.send_html(&subject, &html).await {
                Ok(()) => self.report.record(&format!(
                    "ALERT: {} inactive/missing servers. Email sent.",
                    outcome.alerts.len()
                )),
                Err(e) => self.report.record(&format!(
                    "ALERT: {} inactive/missing servers. Failed to send email: {e}",
                    outcome.alerts.len()
                )),
            }
        }

        if !outcome.recoveries.is_empty() {
            let subject = recovery_subject(outcome.recoveries.len());
            let html = render_recovery(&outcome.recoveries, now);
            match self.notifier.send_html(&subject, &html).await {
                Ok(()) => self.report.record(&format!(
                    "INFO: {} servers recovered. Email sent.",
                    outcome.recoveries.len()
                )),
                Err(e) => self.report.record(&format!(
                    "INFO: {} servers recovered. Failed to send email: {e}",
                    outcome.recoveries.len()
                )),
            }
        }

        self.store.save(&outcome.statuses)?;
        Ok(outcome)
    }
}
