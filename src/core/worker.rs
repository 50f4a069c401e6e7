//! Per-file transfer pipeline
//!
//! A `TransferWorker` moves one file from the source to the destination:
//! open the download, couple it to the upload through a private
//! `StreamBridge`, and retry the whole file on transient failures.

use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use tokio_util::sync::CancellationToken;

use crate::core::config::MirrorConfig;
use crate::core::error::{Error, Result};
use crate::core::model::{TransferResult, TransferTask, DRY_RUN_REASON};
use crate::core::retry::backoff_delay;
use crate::core::source::SourceBrowser;
use crate::core::store::ObjectStore;
use crate::core::stream::{pump, StreamBridge};

/// Tuning knobs for a worker
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// Attempts per file, including the first
    pub retry_bound: u32,
    pub retry_base_delay: Duration,
    pub buffer_size: usize,
    pub bridge_capacity: usize,
    /// Longest silence tolerated from a download before the attempt fails
    pub read_timeout: Duration,
    /// Report tasks without transferring them
    pub dry_run: bool,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self::from(&MirrorConfig::default())
    }
}

impl From<&MirrorConfig> for WorkerOptions {
    fn from(config: &MirrorConfig) -> Self {
        Self {
            retry_bound: config.retry_bound,
            retry_base_delay: config.retry_base_delay(),
            buffer_size: config.buffer_size,
            bridge_capacity: config.bridge_capacity,
            read_timeout: config.read_timeout(),
            dry_run: config.dry_run,
        }
    }
}

/// Executes one task's download→upload pipeline
pub struct TransferWorker {
    source: Arc<dyn SourceBrowser>,
    store: Arc<dyn ObjectStore>,
    options: WorkerOptions,
    cancel: CancellationToken,
}

impl TransferWorker {
    pub fn new(
        source: Arc<dyn SourceBrowser>,
        store: Arc<dyn ObjectStore>,
        options: WorkerOptions,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            store,
            options,
            cancel,
        }
    }

    /// Run one task to a final result; never returns an error
    pub async fn run(&self, task: TransferTask) -> TransferResult {
        let key = task.destination_key.clone();

        if self.options.dry_run {
            info!("[DRY RUN] Would transfer {} -> {key}", task.source_id);
            return TransferResult::skipped(key, DRY_RUN_REASON);
        }

        let mut attempt = 1;
        loop {
            if self.cancel.is_cancelled() {
                return TransferResult::failed(key, Error::Cancelled);
            }

            let outcome = tokio::select! {
                _ = self.cancel.cancelled() => Err(Error::Cancelled),
                result = self.transfer_once(&task) => result,
            };

            match outcome {
                Ok(bytes) => {
                    info!("Transferred {key} ({bytes} bytes)");
                    return TransferResult::succeeded(key, bytes);
                }
                Err(e) if e.is_skip() => {
                    info!("Skipping {key}: {e}");
                    return TransferResult::skipped(key, "not exportable");
                }
                Err(e) if e.is_retryable() && attempt < self.options.retry_bound => {
                    let delay = backoff_delay(self.options.retry_base_delay, attempt);
                    warn!(
                        "⚠️  {key}: {e} (attempt {attempt}/{}). Retrying in {}ms...",
                        self.options.retry_bound,
                        delay.as_millis()
                    );
                    tokio::select! {
                        _ = self.cancel.cancelled() => {
                            return TransferResult::failed(key, Error::Cancelled);
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_fatal() {
                        warn!("❌ Fatal error while transferring {key}, cancelling run: {e}");
                        self.cancel.cancel();
                    } else {
                        warn!("❌ Failed to transfer {key}: {e}");
                    }
                    return TransferResult::failed(key, e);
                }
            }
        }
    }

    /// One attempt: fresh download, fresh bridge, one upload
    async fn transfer_once(&self, task: &TransferTask) -> Result<u64> {
        let download = self
            .source
            .open_download_stream(&task.source_id, &task.mime_type)
            .await?;

        let (writer, reader) = StreamBridge::new(self.options.bridge_capacity);
        let (pumped, stored) = tokio::join!(
            pump(download, writer, self.options.buffer_size, self.options.read_timeout),
            self.store.put_object(&task.destination_key, reader),
        );

        match (pumped, stored) {
            (Ok(sent), Ok(written)) => {
                if sent != written {
                    return Err(Error::Destination(format!(
                        "{}: stored {written} bytes but downloaded {sent}",
                        task.destination_key
                    )));
                }
                Ok(written)
            }
            // a broken download is the root cause of whatever the store saw
            (Err(e @ Error::Transient(_)), _) => Err(e),
            (_, Err(e)) => Err(e),
            (Err(e), Ok(_)) => Err(e),
        }
    }
}
