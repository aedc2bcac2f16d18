use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub shipper: Option<ShipperConfig>,
    #[serde(default)]
    pub ingestor: Option<IngestorConfig>,
    #[serde(default)]
    pub monitor: Option<MonitorConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

// ===== Shipper =====

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipperConfig {
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
    #[serde(default = "default_offset_file")]
    pub offset_file: PathBuf,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_receiver_url")]
    pub receiver_url: String,
    #[serde(default = "default_debounce", with = "humantime_serde")]
    pub debounce: Duration,
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: usize,
    #[serde(default = "default_retry_wait", with = "humantime_serde")]
    pub retry_wait: Duration,
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Overrides the address resolved from the local hostname.
    #[serde(default)]
    pub origin_address: Option<String>,
    #[serde(default = "default_noise_markers")]
    pub noise_markers: Vec<String>,
}

impl Default for ShipperConfig {
    fn default() -> Self {
        Self {
            log_file: default_log_file(),
            offset_file: default_offset_file(),
            chunk_size: default_chunk_size(),
            receiver_url: default_receiver_url(),
            debounce: default_debounce(),
            poll_interval: default_poll_interval(),
            retry_attempts: default_retry_attempts(),
            retry_wait: default_retry_wait(),
            request_timeout: default_request_timeout(),
            origin_address: None,
            noise_markers: default_noise_markers(),
        }
    }
}

fn default_log_file() -> PathBuf {
    PathBuf::from("/app/log/nginx/access.log")
}

fn default_offset_file() -> PathBuf {
    PathBuf::from("/app/log/nginx/log-shipper/latest.offset")
}

fn default_chunk_size() -> usize {
    10000
}

fn default_receiver_url() -> String {
    "http://127.0.0.1:5000/upload".to_string()
}

fn default_debounce() -> Duration {
    Duration::from_secs(1)
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_retry_attempts() -> usize {
    600
}

fn default_retry_wait() -> Duration {
    Duration::from_secs(6)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

pub fn default_noise_markers() -> Vec<String> {
    vec![
        "/health.php".to_string(),
        "nginx/".to_string(),
        "health check".to_string(),
    ]
}

// ===== Ingestor =====

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestorConfig {
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
    #[serde(default = "default_time_windows")]
    pub time_windows: Vec<TimeWindowConfig>,
    #[serde(default = "default_fallback_window")]
    pub fallback_window: String,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    #[serde(default = "default_fsync")]
    pub fsync: bool,
}

impl Default for IngestorConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            listen: default_listen(),
            file_prefix: default_file_prefix(),
            time_windows: default_time_windows(),
            fallback_window: default_fallback_window(),
            max_body_bytes: default_max_body_bytes(),
            fsync: default_fsync(),
        }
    }
}

/// Inclusive minute range mapped to a window label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindowConfig {
    pub start: u32,
    pub end: u32,
    pub label: String,
}

fn default_base_dir() -> PathBuf {
    PathBuf::from("/app/log/access-log-reciever/")
}

fn default_listen() -> String {
    "0.0.0.0:5000".to_string()
}

pub fn default_file_prefix() -> String {
    "MyGP_accessLog".to_string()
}

pub fn default_time_windows() -> Vec<TimeWindowConfig> {
    [(0, 19), (20, 39), (40, 59)]
        .into_iter()
        .map(|(start, end)| TimeWindowConfig {
            start,
            end,
            label: format!("{:02}-{:02}", start, end),
        })
        .collect()
}

pub fn default_fallback_window() -> String {
    "00-59".to_string()
}

fn default_max_body_bytes() -> usize {
    64 * 1024 * 1024
}

fn default_fsync() -> bool {
    true
}

// ===== Monitor =====

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_base_dir")]
    pub log_base_dir: PathBuf,
    #[serde(default = "default_status_file")]
    pub status_file: PathBuf,
    #[serde(default = "default_report_file")]
    pub report_file: PathBuf,
    #[serde(default = "default_linecount_file")]
    pub linecount_file: PathBuf,
    #[serde(default = "default_hour_state_file")]
    pub hour_state_file: PathBuf,
    #[serde(default = "default_threshold", with = "humantime_serde")]
    pub threshold: Duration,
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub hourly_summary: HourlySummaryConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            log_base_dir: default_base_dir(),
            status_file: default_status_file(),
            report_file: default_report_file(),
            linecount_file: default_linecount_file(),
            hour_state_file: default_hour_state_file(),
            threshold: default_threshold(),
            file_prefix: default_file_prefix(),
            email: EmailConfig::default(),
            hourly_summary: HourlySummaryConfig::default(),
        }
    }
}

fn default_status_file() -> PathBuf {
    PathBuf::from("/tmp/receiver_status.json")
}

fn default_report_file() -> PathBuf {
    PathBuf::from("/tmp/receiver_status_report.log")
}

fn default_linecount_file() -> PathBuf {
    PathBuf::from("/tmp/linecount-report.log")
}

fn default_hour_state_file() -> PathBuf {
    PathBuf::from("/tmp/last_hour_state.json")
}

fn default_threshold() -> Duration {
    Duration::from_secs(5 * 60)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default = "default_from_address")]
    pub from_address: String,
    #[serde(default = "default_recipients")]
    pub recipients: Vec<String>,
    #[serde(default = "default_subject_prefix")]
    pub subject_prefix: String,
    #[serde(default = "default_smtp_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: default_smtp_host(),
            smtp_port: default_smtp_port(),
            from_address: default_from_address(),
            recipients: default_recipients(),
            subject_prefix: default_subject_prefix(),
            timeout: default_smtp_timeout(),
        }
    }
}

fn default_smtp_host() -> String {
    "localhost".to_string()
}

fn default_smtp_port() -> u16 {
    25
}

fn default_from_address() -> String {
    "noreply@localhost".to_string()
}

fn default_recipients() -> Vec<String> {
    vec!["admin@localhost".to_string()]
}

fn default_subject_prefix() -> String {
    "[Log Monitor]".to_string()
}

fn default_smtp_timeout() -> Duration {
    Duration::from_secs(15)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HourlySummaryConfig {
    #[serde(default = "default_hourly_enabled")]
    pub enabled: bool,
    #[serde(default = "default_send_after_minutes")]
    pub send_after_minutes: u32,
}

impl Default for HourlySummaryConfig {
    fn default() -> Self {
        Self {
            enabled: default_hourly_enabled(),
            send_after_minutes: default_send_after_minutes(),
        }
    }
}

fn default_hourly_enabled() -> bool {
    true
}

fn default_send_after_minutes() -> u32 {
    15
}

// ===== Logging =====

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Append log output here instead of stderr.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
