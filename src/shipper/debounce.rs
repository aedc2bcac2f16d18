//! Trailing-edge debounce.
//!
//! [`Debouncer::signal`] may be called from any task. The paired
//! [`DebounceWorker`] fires its action once signals have stopped for the full
//! quiet interval; every new signal pushes the fire back to `now + quiet`.
//! The worker awaits each action to completion before looking at the next
//! signal, so at most one action runs at a time and signals that land during
//! a run schedule a fresh fire afterwards instead of being lost.

use std::future::Future;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, Instant};

#[derive(Debug, Clone)]
pub struct Debouncer {
    tx: mpsc::UnboundedSender<()>,
}

#[derive(Debug)]
pub struct DebounceWorker {
    rx: mpsc::UnboundedReceiver<()>,
    quiet: Duration,
}

impl Debouncer {
    pub fn new(quiet: Duration) -> (Self, DebounceWorker) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, DebounceWorker { rx, quiet })
    }

    /// Records a change and (re)schedules the fire.
    pub fn signal(&self) {
        // A closed channel means the worker has shut down.
        let _ = self.tx.send(());
    }
}

impl DebounceWorker {
    /// Runs until `shutdown` turns true or every [`Debouncer`] handle is dropped.
    /// A pending (not yet started) fire is cancelled by shutdown; a running
    /// action is allowed to finish.
    pub async fn run<F, Fut>(mut self, mut action: F, mut shutdown: watch::Receiver<bool>)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ()>,
    {
        loop {
            tokio::select! {
                _ = stopped(&mut shutdown) => return,
                signal = self.rx.recv() => {
                    if signal.is_none() {
                        return;
                    }
                }
            }

            let mut deadline = Instant::now() + self.quiet;
            loop {
                tokio::select! {
                    _ = stopped(&mut shutdown) => return,
                    _ = sleep_until(deadline) => break,
                    signal = self.rx.recv() => match signal {
                        Some(()) => deadline = Instant::now() + self.quiet,
                        None => break,
                    },
                }
            }

            action().await;
        }
    }
}

/// Resolves once shutdown is requested or the sender is gone.
pub(crate) async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|&stop| stop).await;
}
