use crate::storage::json_file::{load_or_default, save_atomic, StateFileError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceState {
    Active,
    Inactive,
    Missing,
    #[default]
    #[serde(other)]
    Unknown,
}

impl SourceState {
    /// States that raise an alert and later allow a recovery notice.
    pub fn is_down(self) -> bool {
        matches!(self, SourceState::Inactive | SourceState::Missing)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceStatus {
    #[serde(default)]
    pub latest_file: Option<String>,
    #[serde(default)]
    pub last_seen: Option<String>,
    #[serde(default)]
    pub status: SourceState,
}

/// Per-origin status keyed by origin directory name.
pub type StatusMap = BTreeMap<String, SourceStatus>;

/// Status snapshot persisted between monitor passes.
pub struct StatusStore {
    path: PathBuf,
}

impl StatusStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> StatusMap {
        load_or_default(&self.path)
    }

    /// Replaces the stored snapshot with `statuses`.
    pub fn save(&self, statuses: &StatusMap) -> Result<(), StateFileError> {
        save_atomic(&self.path, statuses)
    }
}

pub fn previous_state(statuses: &StatusMap, origin: &str) -> SourceState {
    statuses
        .get(origin)
        .map(|s| s.status)
        .unwrap_or(SourceState::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_wire_format_uses_lowercase_states() {
        let mut map = StatusMap::new();
        map.insert(
            "10.0.0.1".to_string(),
            SourceStatus {
                latest_file: Some("a.log".to_string()),
                last_seen: Some("2024-01-01 11:05:00".to_string()),
                status: SourceState::Inactive,
            },
        );
        map.insert(
            "10.0.0.2".to_string(),
            SourceStatus {
                latest_file: None,
                last_seen: None,
                status: SourceState::Missing,
            },
        );

        let json = serde_json::to_value(&map).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "10.0.0.1": {"latest_file": "a.log", "last_seen": "2024-01-01 11:05:00", "status": "inactive"},
                "10.0.0.2": {"latest_file": null, "last_seen": null, "status": "missing"}
            })
        );
    }

    #[test]
    fn test_unrecognised_state_reads_as_unknown() {
        let map: StatusMap = serde_json::from_str(
            r#"{"10.0.0.1": {"status": "sleeping"}, "10.0.0.2": {"status": "active"}, "10.0.0.3": {}}"#,
        )
        .unwrap();
        assert_eq!(previous_state(&map, "10.0.0.1"), SourceState::Unknown);
        assert_eq!(previous_state(&map, "10.0.0.2"), SourceState::Active);
        assert_eq!(previous_state(&map, "10.0.0.3"), SourceState::Unknown);
        assert_eq!(previous_state(&map, "10.0.0.9"), SourceState::Unknown);
    }

    #[test]
    fn test_store_replaces_snapshot() {
        let dir = TempDir::new().unwrap();
        let store = StatusStore::new(dir.path().join("state/status.json"));
        assert!(store.load().is_empty());

        let mut first = StatusMap::new();
        first.insert("10.0.0.1".to_string(), SourceStatus::default());
        first.insert("10.0.0.2".to_string(), SourceStatus::default());
        store.save(&first).unwrap();

        let mut second = StatusMap::new();
        second.insert(
            "10.0.0.3".to_string(),
            SourceStatus {
                status: SourceState::Active,
                ..SourceStatus::default()
            },
        );
        store.save(&second).unwrap();

        assert_eq!(store.load(), second);
    }

    #[test]
    fn test_corrupt_store_loads_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("status.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(StatusStore::new(path).load().is_empty());
    }
}
