pub mod debounce;
pub mod delivery;
pub mod runner;
pub mod tailer;
pub mod watcher;

pub use debounce::{DebounceWorker, Debouncer};
pub use delivery::{retry_fixed, DeliveryClient, DeliveryOutcome, RetryOutcome, UploadBatch};
pub use runner::{PassOutcome, Shipper, ShipperError, ShipperRunner};
pub use tailer::{Chunk, NoiseFilter, Tailer};
pub use watcher::PollingWatcher;
