pub mod api;
pub mod bucket;
pub mod line;
pub mod server;
pub mod writer;

pub use api::{ApiError, IngestState, UploadRequest};
pub use bucket::{hour_bucket, origin_id, BucketKey, BucketResolver, WindowTable};
pub use line::{AccessLine, LineError};
pub use server::{router, serve, start_server, IngestError};
pub use writer::{BucketWriter, WriteError};
