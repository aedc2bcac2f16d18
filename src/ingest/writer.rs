use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Error)]
#[error("failed to append to {path}: {source}")]
pub struct WriteError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Appends line groups to bucket files. Appends to the same path are
/// serialized so a batch lands as one contiguous block.
#[derive(Debug, Default)]
pub struct BucketWriter {
    locks: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
    fsync: bool,
}

impl BucketWriter {
    pub fn new(fsync: bool) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            fsync,
        }
    }

    fn lock_for(&self, path: &Path) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(path.to_path_buf()).or_default().clone()
    }

    /// Drops the entry for `path` once no other append holds or awaits it.
    fn release(&self, path: &Path, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        let idle = locks
            .get(path)
            .is_some_and(|entry| Arc::ptr_eq(entry, &lock) && Arc::strong_count(&lock) == 2);
        if idle {
            locks.remove(path);
        }
    }

    #[cfg(test)]
    fn tracked_paths(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Appends `lines`, each followed by a newline, in one write.
    pub async fn append(&self, path: &Path, lines: &[&str]) -> Result<(), WriteError> {
        if lines.is_empty() {
            return Ok(());
        }

        let err = |source: std::io::Error| WriteError {
            path: path.to_path_buf(),
            source,
        };

        let mut block = String::with_capacity(lines.iter().map(|l| l.len() + 1).sum());
        for line in lines {
            block.push_str(line);
            block.push('\n');
        }

        let lock = self.lock_for(path);
        let guard = lock.lock().await;
        let result = self.write_block(path, &block).await.map_err(err);
        drop(guard);
        self.release(path, lock);
        result?;

        tracing::debug!(path = %path.display(), lines = lines.len(), "Appended to bucket");
        Ok(())
    }

    async fn write_block(&self, path: &Path, block: &str) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(block.as_bytes()).await?;
        file.flush().await?;
        if self.fsync {
            file.sync_data().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_append_creates_directories_and_accumulates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("h1").join("bucket.log");
        let writer = BucketWriter::new(false);

        writer.append(&path, &["a", "b"]).await.unwrap();
        writer.append(&path, &["c"]).await.unwrap();
        writer.append(&path, &[]).await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a\nb\nc\n");
    }

    #[tokio::test]
    async fn test_idle_bucket_locks_are_released() {
        let dir = TempDir::new().unwrap();
        let writer = BucketWriter::new(false);

        for bucket in 0..500 {
            let path = dir.path().join(format!("bucket-{bucket}.log"));
            writer.append(&path, &["line"]).await.unwrap();
        }
        assert_eq!(writer.tracked_paths(), 0);

        // A failed append releases its entry too.
        let blocked = dir.path().join("bucket-0.log/child.log");
        assert!(writer.append(&blocked, &["line"]).await.is_err());
        assert_eq!(writer.tracked_paths(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_stay_contiguous() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shared.log");
        let writer = Arc::new(BucketWriter::new(true));

        let mut handles = Vec::new();
        for task in 0..16 {
            let writer = writer.clone();
            let path = path.clone();
            handles.push(tokio::spawn(async move {
                let lines: Vec<String> = (0..50).map(|i| format!("t{task}-{i}")).collect();
                let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
                writer.append(&path, &refs).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(writer.tracked_paths(), 0);

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 16 * 50);

        // Each task's block is uninterrupted and in order.
        for block in lines.chunks(50) {
            let task = block[0].split('-').next().unwrap();
            for (i, line) in block.iter().enumerate() {
                assert_eq!(*line, format!("{task}-{i}"));
            }
        }
    }
}
