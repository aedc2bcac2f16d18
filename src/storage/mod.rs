pub mod checkpoint;
pub mod json_file;

pub use checkpoint::{CheckpointError, CheckpointStore, FileCheckpoint, FileIdentity};
pub use json_file::{load_or_default, save_atomic, StateFileError};
