use crate::config::types::MonitorConfig;
use crate::monitor::notify::{escape_html, Notifier};
use crate::monitor::report_log::ReportLog;
use crate::monitor::MonitorError;
use crate::storage::json_file::{load_or_default, save_atomic};
use chrono::{DateTime, Duration as ChronoDuration, Local, NaiveDateTime, Timelike};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

/// Persisted marker of the last hour a summary went out for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourState {
    #[serde(default)]
    pub last_reported_hour: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    /// The trimmed ledger line.
    pub raw: String,
    pub timestamp: String,
    pub detail: String,
    pub line_count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HourlySummary {
    pub hour: String,
    pub entries: Vec<LedgerEntry>,
    pub total_lines: u64,
}

impl HourlySummary {
    pub fn subject(&self) -> String {
        format!(
            "HOURLY SUMMARY {}: {} files, {} lines",
            self.hour,
            self.entries.len(),
            self.total_lines
        )
    }

    pub fn render(&self, generated_at: DateTime<Local>) -> String {
        let mut html = format!(
            "<html><body style=\"font-family:Arial, sans-serif;\">\n\
             <h3>Hourly Summary for {hour}</h3>\n\
             <p><b>Total files:</b> {files}<br>\n\
             <b>Total lines:</b> {lines}<br>\n\
             Generated at: {generated}</p>\n\
             <table border=\"1\" cellpadding=\"6\" cellspacing=\"0\" style=\"border-collapse:collapse;\">\n\
             <thead style=\"background-color:#f2f2f2;\">\n\
             <tr><th>Timestamp</th><th>Log File / Info</th><th>Line Count</th></tr>\n\
             </thead><tbody>\n",
            hour = self.hour,
            files = self.entries.len(),
            lines = self.total_lines,
            generated = generated_at.format("%Y-%m-%d %H:%M:%S"),
        );

        for entry in &self.entries {
            let count = entry
                .line_count
                .map(|c| c.to_string())
                .unwrap_or_else(|| "-".to_string());
            html.push_str(&format!(
                "<tr><td>{}</td><td>{}</td><td align='center'>{}</td></tr>\n",
                escape_html(&entry.timestamp),
                escape_html(&entry.detail),
                count
            ));
        }

        html.push_str("</tbody></table>\n</body></html>");
        html
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HourlyOutcome {
    Disabled,
    /// Still inside the grace period of the current hour.
    TooEarly,
    AlreadyReported(String),
    NoLedger,
    NoEntries(String),
    Reported(HourlySummary),
}

/// `YYMMDDHH` of the hour before `now`.
pub fn target_hour(now: NaiveDateTime) -> String {
    (now - ChronoDuration::hours(1))
        .format("%y%m%d%H")
        .to_string()
}

fn count_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)lines?\s*[:=]\s*(\d+)").expect("static regex"))
}

/// Matches the hour key embedded in a bucket file name.
pub fn hour_pattern(file_prefix: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(r"{}_(\d{{8}})_\d{{2}}-\d{{2}}_", regex::escape(file_prefix)))
}

/// Ledger entries whose bucket file belongs to `hour`.
pub fn collect_entries(ledger: &str, hour_pattern: &Regex, hour: &str) -> Vec<LedgerEntry> {
    ledger
        .lines()
        .filter(|line| {
            hour_pattern
                .captures(line)
                .is_some_and(|caps| &caps[1] == hour)
        })
        .map(|line| {
            let raw = line.trim().to_string();
            let parts: Vec<&str> = raw.split('|').map(str::trim).collect();
            let timestamp = parts
                .first()
                .filter(|p| !p.is_empty())
                .unwrap_or(&"-")
                .to_string();
            let detail = if parts.len() > 1 {
                parts[1..].join(" | ")
            } else {
                "-".to_string()
            };
            let line_count = count_pattern()
                .captures(&raw)
                .and_then(|caps| caps[1].parse().ok());

            LedgerEntry {
                raw,
                timestamp,
                detail,
                line_count,
            }
        })
        .collect()
}

/// Sends one summary per completed hour from the line-count ledger.
pub struct HourlyReporter {
    enabled: bool,
    send_after_minutes: u32,
    ledger_path: PathBuf,
    state_path: PathBuf,
    hour_pattern: Regex,
    report: ReportLog,
    notifier: Arc<dyn Notifier>,
}

impl HourlyReporter {
    pub fn new(
        config: &MonitorConfig,
        report: ReportLog,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, MonitorError> {
        Ok(Self {
            enabled: config.hourly_summary.enabled,
            send_after_minutes: config.hourly_summary.send_after_minutes,
            ledger_path: config.linecount_file.clone(),
            state_path: config.hour_state_file.clone(),
            hour_pattern: hour_pattern(&config.file_prefix)?,
            report,
            notifier,
        })
    }

    pub fn load_state(&self) -> HourState {
        load_or_default(&self.state_path)
    }

    pub async fn run_pass(&self, now: DateTime<Local>) -> Result<HourlyOutcome, MonitorError> {
        if !self.enabled {
            return Ok(HourlyOutcome::Disabled);
        }
        if now.minute() < self.send_after_minutes {
            return Ok(HourlyOutcome::TooEarly);
        }

        let hour = target_hour(now.naive_local());
        let mut state = self.load_state();
        if state.last_reported_hour.as_deref() == Some(hour.as_str()) {
            tracing::debug!(hour = %hour, "Hour already reported");
            return Ok(HourlyOutcome::AlreadyReported(hour));
        }

        let ledger = match std::fs::read_to_string(&self.ledger_path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.report
                    .record("No linecount log found. Skipping hourly summary.");
                return Ok(HourlyOutcome::NoLedger);
            }
            Err(source) => {
                return Err(MonitorError::Io {
                    path: self.ledger_path.clone(),
                    source,
                })
            }
        };

        let entries = collect_entries(&ledger, &self.hour_pattern, &hour);
        if entries.is_empty() {
            self.report
                .record(&format!("No linecount entries found for hour {hour}"));
            return Ok(HourlyOutcome::NoEntries(hour));
        }

        let summary = HourlySummary {
            total_lines: entries.iter().filter_map(|e| e.line_count).sum(),
            hour: hour.clone(),
            entries,
        };

        match self
            .notifier
            .send_html(&summary.subject(), &summary.render(now))
            .await
        {
            Ok(()) => self.report.record(&format!(
                "Hourly summary sent for {} | Files: {} | Lines: {}",
                hour,
                summary.entries.len(),
                summary.total_lines
            )),
            Err(e) => self.report.record(&format!(
                "Hourly summary for {hour} could not be sent: {e}"
            )),
        }

        state.last_reported_hour = Some(hour);
        save_atomic(&self.state_path, &state)?;

        Ok(HourlyOutcome::Reported(summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn naive(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    #[test]
    fn test_target_hour_is_previous_hour() {
        assert_eq!(target_hour(naive(1, 12, 20)), "24010111");
        assert_eq!(target_hour(naive(2, 0, 15)), "24010123");
    }

    #[test]
    fn test_collect_entries_filters_and_parses() {
        let ledger = "\
2024-01-01 12:01:02 | MyGP_accessLog_24010111_00-19_1-2-3-4.log | lines: 120
2024-01-01 12:01:03 | MyGP_accessLog_24010111_20-39_1-2-3-4.log | Lines=30
2024-01-01 12:01:04 | MyGP_accessLog_24010110_40-59_1-2-3-4.log | lines: 999
2024-01-01 12:01:05 | MyGP_accessLog_24010111_40-59_5-6-7-8.log | no count
garbage line
";
        let pattern = hour_pattern("MyGP_accessLog").unwrap();
        let entries = collect_entries(ledger, &pattern, "24010111");

        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].timestamp, "2024-01-01 12:01:02");
        assert_eq!(
            entries[0].detail,
            "MyGP_accessLog_24010111_00-19_1-2-3-4.log | lines: 120"
        );
        assert_eq!(entries[0].line_count, Some(120));
        assert_eq!(entries[1].line_count, Some(30));
        assert_eq!(entries[2].line_count, None);
    }

    #[test]
    fn test_prefix_is_matched_literally() {
        let pattern = hour_pattern("a.b").unwrap();
        assert!(pattern.is_match("a.b_24010111_00-19_x"));
        assert!(!pattern.is_match("axb_24010111_00-19_x"));
    }

    #[test]
    fn test_summary_subject_and_rows() {
        let pattern = hour_pattern("MyGP_accessLog").unwrap();
        let entries = collect_entries(
            "ts | MyGP_accessLog_24010111_00-19_x.log | lines: 5\n",
            &pattern,
            "24010111",
        );
        let summary = HourlySummary {
            hour: "24010111".to_string(),
            total_lines: 5,
            entries,
        };

        assert_eq!(summary.subject(), "HOURLY SUMMARY 24010111: 1 files, 5 lines");
        let html = summary.render(Local::now());
        assert!(html.contains(
            "<tr><td>ts</td><td>MyGP_accessLog_24010111_00-19_x.log | lines: 5</td><td align='center'>5</td></tr>"
        ));
    }
}
