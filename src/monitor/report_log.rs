use chrono::Local;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Operator-facing report file: one timestamped line per event.
#[derive(Debug, Clone)]
pub struct ReportLog {
    path: PathBuf,
}

impl ReportLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends `text` to the report file. Write failures are logged only.
    pub fn record(&self, text: &str) {
        tracing::info!(report = %self.path.display(), "{text}");

        let line = format!("{}  {}\n", Local::now().format("%Y-%m-%d %H:%M:%S"), text);
        if let Err(e) = self.append(&line) {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to write report line");
        }
    }

    fn append(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_record_appends_timestamped_lines() {
        let dir = TempDir::new().unwrap();
        let log = ReportLog::new(dir.path().join("reports/monitor.log"));

        log.record("Scanned 2 servers | Inactive: 0");
        log.record("second");

        let content = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        // "YYYY-MM-DD HH:MM:SS" then two spaces.
        assert_eq!(&lines[0][19..21], "  ");
        assert!(lines[0].ends_with("Scanned 2 servers | Inactive: 0"));
        assert!(lines[1].ends_with("  second"));
    }
}
