use crate::config::types::{IngestorConfig, TimeWindowConfig};
use chrono::{NaiveDateTime, Timelike};
use std::net::IpAddr;
use std::path::{Path, PathBuf};

/// Ordered minute ranges; the first range containing a minute names its window.
#[derive(Debug, Clone)]
pub struct WindowTable {
    windows: Vec<TimeWindowConfig>,
    fallback: String,
}

impl WindowTable {
    pub fn new(windows: Vec<TimeWindowConfig>, fallback: impl Into<String>) -> Self {
        Self {
            windows,
            fallback: fallback.into(),
        }
    }

    pub fn label_for(&self, minute: u32) -> &str {
        self.windows
            .iter()
            .find(|w| w.start <= minute && minute <= w.end)
            .map(|w| w.label.as_str())
            .unwrap_or(self.fallback.as_str())
    }
}

/// Identifies one append-only bucket file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketKey {
    /// `YYMMDDHH` of the line's embedded timestamp.
    pub hour_bucket: String,
    pub window_label: String,
    pub origin_id: String,
}

/// Maps `(timestamp, origin)` to a bucket file under `<base>/<host>/`.
#[derive(Debug, Clone)]
pub struct BucketResolver {
    base_dir: PathBuf,
    file_prefix: String,
    windows: WindowTable,
}

impl BucketResolver {
    pub fn new(base_dir: impl Into<PathBuf>, file_prefix: impl Into<String>, windows: WindowTable) -> Self {
        Self {
            base_dir: base_dir.into(),
            file_prefix: file_prefix.into(),
            windows,
        }
    }

    pub fn from_config(config: &IngestorConfig) -> Self {
        Self::new(
            config.base_dir.clone(),
            config.file_prefix.clone(),
            WindowTable::new(config.time_windows.clone(), config.fallback_window.clone()),
        )
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn key(&self, timestamp: &NaiveDateTime, origin_id: &str) -> BucketKey {
        BucketKey {
            hour_bucket: hour_bucket(timestamp),
            window_label: self.windows.label_for(timestamp.minute()).to_string(),
            origin_id: origin_id.to_string(),
        }
    }

    pub fn file_name(&self, key: &BucketKey) -> String {
        format!(
            "{}_{}_{}_{}.log",
            self.file_prefix, key.hour_bucket, key.window_label, key.origin_id
        )
    }

    pub fn path(&self, host: &str, key: &BucketKey) -> PathBuf {
        self.base_dir.join(host).join(self.file_name(key))
    }

    pub fn resolve(&self, host: &str, timestamp: &NaiveDateTime, origin_id: &str) -> PathBuf {
        self.path(host, &self.key(timestamp, origin_id))
    }
}

/// `YYMMDDHH` key shared by bucket file names and the hourly rollup.
pub fn hour_bucket(timestamp: &NaiveDateTime) -> String {
    timestamp.format("%y%m%d%H").to_string()
}

/// Path-safe form of a peer address: `1.2.3.4` becomes `1-2-3-4`.
pub fn origin_id(addr: IpAddr) -> String {
    addr.to_canonical().to_string().replace(['.', ':'], "-")
}
