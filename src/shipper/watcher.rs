use crate::shipper::debounce::{stopped, Debouncer};
use crate::storage::checkpoint::FileIdentity;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use tokio::sync::watch;

/// What the watcher compares between polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Snapshot {
    identity: FileIdentity,
    len: u64,
    modified: Option<SystemTime>,
}

/// Polls a file's metadata and signals the debouncer whenever it changes
/// (growth, truncation, touch, rotation, or appearance).
pub struct PollingWatcher {
    path: PathBuf,
    interval: Duration,
    last: Option<Snapshot>,
}

impl PollingWatcher {
    pub fn new(path: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            path: path.into(),
            interval: interval.max(Duration::from_millis(10)),
            last: None,
        }
    }

    pub async fn run(mut self, debouncer: Debouncer, mut shutdown: watch::Receiver<bool>) {
        // Baseline so existing content (already drained) is not reported as a change.
        self.last = self.snapshot().await;
        tracing::info!(path = %self.path.display(), "Watching for changes");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = stopped(&mut shutdown) => {
                    tracing::info!(path = %self.path.display(), "Stopped watching");
                    return;
                }
                _ = ticker.tick() => {
                    if self.poll().await {
                        debouncer.signal();
                    }
                }
            }
        }
    }

    /// Returns true when the file looks different from the previous poll.
    async fn poll(&mut self) -> bool {
        let current = self.snapshot().await;
        let changed = current.is_some() && current != self.last;
        self.last = current;
        changed
    }

    async fn snapshot(&self) -> Option<Snapshot> {
        match tokio::fs::metadata(&self.path).await {
            Ok(metadata) => Some(Snapshot {
                identity: FileIdentity::from_metadata(&metadata),
                len: metadata.len(),
                modified: metadata.modified().ok(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to stat watched file");
                self.last
            }
        }
    }
}
