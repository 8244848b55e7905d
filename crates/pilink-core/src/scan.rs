//! Discovery scanning and directory ingestion.
//!
//! A [`Scanner`] pushes [`ScanEvent`]s into a channel; [`ingest`] drains the
//! channel into the shared [`DeviceDirectory`](crate::directory::DeviceDirectory).
//! Keeping a single writer makes interleaved single and batch results
//! impossible to race.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::directory::SharedDirectory;
use crate::error::{PilinkError, Result};
use crate::types::PeerIdentity;

/// Capacity of the scan event channel.
pub const SCAN_CHANNEL_CAPACITY: usize = 128;

/// Something a scan reported.
#[derive(Debug, Clone)]
pub enum ScanEvent {
    /// A single peer was seen.
    Discovered(PeerIdentity),
    /// Several peers were reported at once.
    Batch(Vec<PeerIdentity>),
    /// The scan stopped because of an error.
    Failed(String),
}

/// Source of discovery results.
#[async_trait]
pub trait Scanner: Send + Sync {
    /// Start scanning and send results to `events` until stopped.
    ///
    /// # Errors
    ///
    /// Returns `PlatformUnavailable` or `ScanFailed` if the scan could not
    /// be started.
    async fn start(&self, events: mpsc::Sender<ScanEvent>) -> Result<ScanHandle>;
}

/// Running scan. Dropping the handle leaves the scan running.
#[derive(Debug)]
pub struct ScanHandle {
    task: JoinHandle<()>,
}

impl ScanHandle {
    /// Wrap the task driving a scan.
    #[must_use]
    pub fn new(task: JoinHandle<()>) -> Self {
        Self { task }
    }

    /// Stop the scan.
    pub fn stop(&self) {
        self.task.abort();
    }

    /// Returns `true` once the scan task has ended.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Apply scan events to `directory` until the channel closes.
///
/// Failures are converted to `ScanFailed` and handed to `on_failure`.
pub async fn ingest<F>(
    directory: SharedDirectory,
    mut events: mpsc::Receiver<ScanEvent>,
    mut on_failure: F,
) where
    F: FnMut(PilinkError) + Send,
{
    while let Some(event) = events.recv().await {
        match event {
            ScanEvent::Discovered(peer) => {
                directory.write().await.add_discovered(peer);
            }
            ScanEvent::Batch(peers) => {
                let reported = peers.len();
                let inserted = directory.write().await.add_discovered_batch(peers);
                debug!(reported, inserted, "Applied discovery batch");
            }
            ScanEvent::Failed(reason) => {
                warn!(%reason, "Scan failed");
                on_failure(PilinkError::ScanFailed(reason));
            }
        }
    }
    info!("Scan event channel closed");
}
