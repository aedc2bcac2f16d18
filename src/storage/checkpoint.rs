use super::json_file::{write_atomic, StateFileError};
use std::fs::{self, Metadata};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("failed to read checkpoint '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write checkpoint: {0}")]
    Write(#[from] StateFileError),
}

pub type Result<T> = std::result::Result<T, CheckpointError>;

/// `(device, inode)` fingerprint of an open file. A change means the path now
/// names a different file (rotation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileIdentity {
    pub device_id: u64,
    pub inode_id: u64,
}

impl FileIdentity {
    pub fn from_metadata(metadata: &Metadata) -> Self {
        let (device_id, inode_id) = device_and_inode(metadata);
        Self {
            device_id,
            inode_id,
        }
    }

    /// Identity of the file currently at `path`, or `None` when nothing is there.
    pub fn of_path(path: &Path) -> std::io::Result<Option<Self>> {
        match fs::metadata(path) {
            Ok(metadata) => Ok(Some(Self::from_metadata(&metadata))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn encode(&self) -> String {
        format!("{} {}", self.device_id, self.inode_id)
    }

    fn decode(text: &str) -> Option<Self> {
        let mut parts = text.split_whitespace();
        let device_id = parts.next()?.parse().ok()?;
        let inode_id = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self {
            device_id,
            inode_id,
        })
    }
}

/// Shipping progress. `byte_offset` is only meaningful while `identity`
/// matches the file currently at the tailed path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileCheckpoint {
    pub identity: Option<FileIdentity>,
    pub byte_offset: u64,
}

/// Persists a [`FileCheckpoint`] as two small files: the offset as a plain
/// integer at `offset_path`, and the identity at `<offset_path>.id`.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    offset_path: PathBuf,
    identity_path: PathBuf,
}

impl CheckpointStore {
    pub fn new(offset_path: impl Into<PathBuf>) -> Self {
        let offset_path = offset_path.into();
        let mut identity_name = offset_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        identity_name.push(".id");
        let identity_path = offset_path.with_file_name(identity_name);

        Self {
            offset_path,
            identity_path,
        }
    }

    pub fn offset_path(&self) -> &Path {
        &self.offset_path
    }

    pub fn load(&self) -> Result<FileCheckpoint> {
        let byte_offset = match self.read_optional(&self.offset_path)? {
            Some(text) => match text.trim().parse::<u64>() {
                Ok(offset) => {
                    tracing::info!(offset, path = %self.offset_path.display(), "Loaded last offset");
                    offset
                }
                Err(_) => {
                    tracing::warn!(
                        path = %self.offset_path.display(),
                        content = %text.trim(),
                        "Offset file is not an integer, starting from offset 0"
                    );
                    0
                }
            },
            None => {
                tracing::info!(path = %self.offset_path.display(), "Offset file not found, starting from offset 0");
                0
            }
        };

        let identity = self
            .read_optional(&self.identity_path)?
            .and_then(|text| FileIdentity::decode(&text));

        Ok(FileCheckpoint {
            identity,
            byte_offset,
        })
    }

    /// Writes the offset before the identity. An interrupted save leaves the
    /// previous identity beside the new offset, which reads back as a rotation.
    pub fn save(&self, checkpoint: &FileCheckpoint) -> Result<()> {
        write_atomic(
            &self.offset_path,
            checkpoint.byte_offset.to_string().as_bytes(),
        )?;
        if let Some(identity) = checkpoint.identity {
            write_atomic(&self.identity_path, identity.encode().as_bytes())?;
        }
        tracing::debug!(offset = checkpoint.byte_offset, "Saved offset");
        Ok(())
    }

    fn read_optional(&self, path: &Path) -> Result<Option<String>> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(CheckpointError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

#[cfg(unix)]
fn device_and_inode(metadata: &Metadata) -> (u64, u64) {
    use std::os::unix::fs::MetadataExt;
    (metadata.dev(), metadata.ino())
}

#[cfg(not(unix))]
fn device_and_inode(metadata: &Metadata) -> (u64, u64) {
    // No inode on this platform; creation time is the closest stable proxy.
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    if let Ok(created) = metadata.created() {
        created.hash(&mut hasher);
    }
    (0, hasher.finish())
}
