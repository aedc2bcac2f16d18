use crate::config::types::ShipperConfig;
use crate::shipper::debounce::Debouncer;
use crate::shipper::delivery::{resolve_origin, DeliveryClient, DeliveryError, DeliveryOutcome};
use crate::shipper::tailer::{NoiseFilter, TailError, Tailer};
use crate::shipper::watcher::PollingWatcher;
use crate::storage::checkpoint::CheckpointStore;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum ShipperError {
    #[error("tail error: {0}")]
    Tail(#[from] TailError),

    #[error("delivery client error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Result of one read-then-deliver pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// Nothing new to read.
    Idle,
    /// The range held only noise; the checkpoint moved without a request.
    Skipped { end_offset: u64 },
    Delivered { lines: usize, end_offset: u64 },
    /// Delivery gave up; the checkpoint is unchanged and the same bytes are
    /// read again on the next pass.
    Deferred { start_offset: u64 },
}

/// Tailer plus delivery client. Callers hold it behind one mutex so that
/// passes never overlap and offsets only move forward.
pub struct Shipper {
    tailer: Tailer,
    client: DeliveryClient,
}

impl Shipper {
    pub fn new(tailer: Tailer, client: DeliveryClient) -> Self {
        Self { tailer, client }
    }

    pub fn tailer(&self) -> &Tailer {
        &self.tailer
    }

    /// Reads one chunk, delivers it, and commits the checkpoint on success only.
    pub async fn process_once(&mut self) -> Result<PassOutcome, TailError> {
        let Some(chunk) = self.tailer.read_next_chunk()? else {
            return Ok(PassOutcome::Idle);
        };

        if chunk.is_empty() {
            self.tailer.commit(&chunk)?;
            return Ok(PassOutcome::Skipped {
                end_offset: chunk.end_offset,
            });
        }

        match self.client.deliver(&chunk).await {
            DeliveryOutcome::Success => {
                self.tailer.commit(&chunk)?;
                Ok(PassOutcome::Delivered {
                    lines: chunk.len(),
                    end_offset: chunk.end_offset,
                })
            }
            DeliveryOutcome::Exhausted => Ok(PassOutcome::Deferred {
                start_offset: chunk.start_offset,
            }),
        }
    }

    /// Ships everything already in the file, one checkpointed chunk at a time.
    /// Stops early if a chunk cannot be delivered.
    pub async fn drain_backlog(&mut self) -> Result<usize, TailError> {
        info!(
            path = %self.tailer.path().display(),
            offset = self.tailer.checkpoint().byte_offset,
            "Draining backlog"
        );

        let mut chunks = 0;
        loop {
            match self.process_once().await? {
                PassOutcome::Idle => break,
                PassOutcome::Deferred { start_offset } => {
                    warn!(start_offset, "Backlog drain interrupted by delivery failure");
                    break;
                }
                PassOutcome::Skipped { .. } | PassOutcome::Delivered { .. } => chunks += 1,
            }
        }

        info!(chunks, "Finished draining backlog");
        Ok(chunks)
    }

    pub fn has_unread(&self) -> Result<bool, TailError> {
        self.tailer.has_unread()
    }
}

pub struct ShipperRunner {
    config: Arc<ShipperConfig>,
}

impl ShipperRunner {
    pub fn new(config: ShipperConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub async fn build_shipper(&self) -> Result<Shipper, ShipperError> {
        let config = &self.config;

        if let Some(parent) = config.offset_file.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!(path = %parent.display(), error = %e, "Could not create offset directory");
            }
        }

        let origin = resolve_origin(config).await;
        info!(
            log_file = %config.log_file.display(),
            receiver_url = %config.receiver_url,
            chunk_size = config.chunk_size,
            origin = %origin,
            "Starting log shipper"
        );

        let client = DeliveryClient::new(config, origin)?;
        let tailer = Tailer::new(
            config.log_file.clone(),
            config.chunk_size,
            NoiseFilter::new(config.noise_markers.clone()),
            CheckpointStore::new(config.offset_file.clone()),
        )?;

        Ok(Shipper::new(tailer, client))
    }

    /// Drains the backlog, then follows the file until `shutdown` turns true.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<(), ShipperError> {
        let mut shipper = self.build_shipper().await?;
        shipper.drain_backlog().await?;
        let shipper = Arc::new(Mutex::new(shipper));

        let (debouncer, worker) = Debouncer::new(self.config.debounce);

        let watcher = PollingWatcher::new(self.config.log_file.clone(), self.config.poll_interval);
        let watcher_handle = tokio::spawn(watcher.run(debouncer.clone(), shutdown.clone()));

        let rearm = debouncer.clone();
        let action = move || {
            let shipper = shipper.clone();
            let rearm = rearm.clone();
            async move {
                let mut shipper = shipper.lock().await;
                match shipper.process_once().await {
                    Ok(PassOutcome::Idle) => {}
                    Ok(PassOutcome::Deferred { start_offset }) => {
                        warn!(start_offset, "Chunk deferred until the next change");
                    }
                    Ok(PassOutcome::Skipped { .. }) | Ok(PassOutcome::Delivered { .. }) => {
                        // More complete lines may be waiting behind a full chunk.
                        match shipper.has_unread() {
                            Ok(true) => rearm.signal(),
                            Ok(false) => {}
                            Err(e) => warn!(error = %e, "Could not check for unread data"),
                        }
                    }
                    Err(e) => error!(error = %e, "Processing pass failed"),
                }
            }
        };

        worker.run(action, shutdown).await;
        drop(debouncer);
        watcher_handle.await?;

        info!("Shutting down log shipper");
        Ok(())
    }
}
