use crate::storage::checkpoint::{CheckpointError, CheckpointStore, FileCheckpoint, FileIdentity};
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TailError {
    #[error("io error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("chunk [{start}, {end}) does not start at checkpoint offset {offset}")]
    StaleChunk { start: u64, end: u64, offset: u64 },
}

pub type Result<T> = std::result::Result<T, TailError>;

/// Recognises synthetic health-check requests. A line is noise only when it
/// contains every marker.
#[derive(Debug, Clone)]
pub struct NoiseFilter {
    markers: Vec<String>,
}

impl NoiseFilter {
    pub fn new(markers: Vec<String>) -> Self {
        Self { markers }
    }

    pub fn is_noise(&self, line: &str) -> bool {
        !self.markers.is_empty() && self.markers.iter().all(|m| line.contains(m.as_str()))
    }
}

/// Lines read from `[start_offset, end_offset)`. Noise lines inside the range
/// are consumed but not carried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub lines: Vec<String>,
    pub start_offset: u64,
    pub end_offset: u64,
}

impl Chunk {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Newline-joined body sent on the wire.
    pub fn payload(&self) -> String {
        self.lines.join("\n")
    }

    pub fn last_line(&self) -> Option<&str> {
        self.lines.last().map(String::as_str)
    }
}

/// Reads a single log file in bounded chunks from a persisted checkpoint.
pub struct Tailer {
    path: PathBuf,
    chunk_size: usize,
    noise: NoiseFilter,
    store: CheckpointStore,
    checkpoint: FileCheckpoint,
}

impl Tailer {
    /// Restores the checkpoint from `store`. When no identity was persisted the
    /// file currently at `path` is adopted and the stored offset is kept.
    pub fn new(
        path: impl Into<PathBuf>,
        chunk_size: usize,
        noise: NoiseFilter,
        store: CheckpointStore,
    ) -> Result<Self> {
        let path = path.into();
        let mut checkpoint = store.load()?;

        if checkpoint.identity.is_none() {
            checkpoint.identity = FileIdentity::of_path(&path).map_err(|source| TailError::Io {
                path: path.clone(),
                source,
            })?;
        }

        Ok(Self {
            path,
            chunk_size: chunk_size.max(1),
            noise,
            store,
            checkpoint,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn checkpoint(&self) -> FileCheckpoint {
        self.checkpoint
    }

    /// Reads up to `chunk_size` retained lines after the checkpoint.
    ///
    /// Returns `None` when the file is absent or has no complete unread line.
    /// A returned chunk may hold zero lines if its whole range was noise.
    pub fn read_next_chunk(&mut self) -> Result<Option<Chunk>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "Log file not found");
                return Ok(None);
            }
            Err(e) => return Err(self.io_error(e)),
        };
        let metadata = file.metadata().map_err(|e| self.io_error(e))?;
        let identity = FileIdentity::from_metadata(&metadata);

        if self.checkpoint.identity != Some(identity) {
            tracing::info!(
                path = %self.path.display(),
                previous_offset = self.checkpoint.byte_offset,
                "Detected file rotation, resetting offset"
            );
            self.checkpoint = FileCheckpoint {
                identity: Some(identity),
                byte_offset: 0,
            };
            self.store.save(&self.checkpoint)?;
        }

        let start_offset = self.checkpoint.byte_offset;
        if metadata.len() < start_offset {
            tracing::warn!(
                path = %self.path.display(),
                offset = start_offset,
                file_len = metadata.len(),
                "Checkpoint is past end of file with unchanged identity; waiting for rotation"
            );
            return Ok(None);
        }

        let mut reader = BufReader::new(file);
        reader
            .seek(SeekFrom::Start(start_offset))
            .map_err(|e| self.io_error(e))?;

        let mut lines = Vec::new();
        let mut consumed = 0u64;
        let mut buf = Vec::new();

        while lines.len() < self.chunk_size {
            buf.clear();
            let n = reader
                .read_until(b'\n', &mut buf)
                .map_err(|e| self.io_error(e))?;
            if n == 0 || buf.last() != Some(&b'\n') {
                // EOF, or a line the writer has not finished yet.
                break;
            }
            consumed += n as u64;

            let line = String::from_utf8_lossy(&buf[..n - 1]);
            if self.noise.is_noise(&line) {
                continue;
            }
            lines.push(line.into_owned());
        }

        if consumed == 0 {
            return Ok(None);
        }

        Ok(Some(Chunk {
            lines,
            start_offset,
            end_offset: start_offset + consumed,
        }))
    }

    /// Advances and persists the checkpoint past an acknowledged chunk.
    pub fn commit(&mut self, chunk: &Chunk) -> Result<()> {
        if chunk.start_offset != self.checkpoint.byte_offset {
            return Err(TailError::StaleChunk {
                start: chunk.start_offset,
                end: chunk.end_offset,
                offset: self.checkpoint.byte_offset,
            });
        }

        self.checkpoint.byte_offset = chunk.end_offset;
        self.store.save(&self.checkpoint)?;
        Ok(())
    }

    /// Whether bytes past the checkpoint are waiting to be read.
    pub fn has_unread(&self) -> Result<bool> {
        let metadata = match std::fs::metadata(&self.path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(self.io_error(e)),
        };

        if self.checkpoint.identity != Some(FileIdentity::from_metadata(&metadata)) {
            return Ok(metadata.len() > 0);
        }
        Ok(metadata.len() > self.checkpoint.byte_offset)
    }

    fn io_error(&self, source: std::io::Error) -> TailError {
        TailError::Io {
            path: self.path.clone(),
            source,
        }
    }
}
