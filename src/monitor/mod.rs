pub mod freshness;
pub mod hourly;
pub mod notify;
pub mod report_log;
pub mod status;

use crate::storage::json_file::StateFileError;
use std::path::PathBuf;
use thiserror::Error;

pub use freshness::{evaluate, FreshnessMonitor, Observation, ScanOutcome};
pub use hourly::{HourState, HourlyOutcome, HourlyReporter, HourlySummary};
pub use notify::{Notifier, NotifyError, SmtpNotifier};
pub use report_log::ReportLog;
pub use status::{SourceState, SourceStatus, StatusMap, StatusStore};

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("state file error: {0}")]
    State(#[from] StateFileError),

    #[error("invalid ledger pattern: {0}")]
    Pattern(#[from] regex::Error),
}

pub const TEST_MAIL_SUBJECT: &str = "TEST SMTP from Server Log Monitor";

pub const TEST_MAIL_BODY: &str =
    "<html><body><p>This is a test email from the server log monitor</p></body></html>";
