//! High-level mirror run
//!
//! Wires walker, scheduler, workers and aggregator together for one
//! invocation and turns whatever happens into a `RunSummary`.

use std::sync::Arc;

use log::{error, info};
use tokio_util::sync::CancellationToken;

use crate::core::config::MirrorConfig;
use crate::core::error::Error;
use crate::core::model::TransferStatus;
use crate::core::scheduler::Scheduler;
use crate::core::source::SourceBrowser;
use crate::core::store::ObjectStore;
use crate::core::stream::ProgressCallback;
use crate::core::summary::{ResultAggregator, RunSummary};
use crate::core::walker::TreeWalker;
use crate::core::worker::{TransferWorker, WorkerOptions};

/// One configured mirror from a source tree into an object store
pub struct Mirror {
    source: Arc<dyn SourceBrowser>,
    store: Arc<dyn ObjectStore>,
    config: MirrorConfig,
    progress: Option<ProgressCallback>,
}

impl Mirror {
    pub fn new(source: Arc<dyn SourceBrowser>, store: Arc<dyn ObjectStore>, config: MirrorConfig) -> Self {
        Self {
            source,
            store,
            config,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Run the mirror to completion; always yields a summary
    pub async fn run(&self) -> RunSummary {
        let cancel = CancellationToken::new();
        let worker = Arc::new(TransferWorker::new(
            Arc::clone(&self.source),
            Arc::clone(&self.store),
            WorkerOptions::from(&self.config),
            cancel.clone(),
        ));

        let mut scheduler = Scheduler::new(worker, self.config.concurrency_limit, cancel.clone());
        if let Some(ref progress) = self.progress {
            scheduler = scheduler.with_progress(Arc::clone(progress));
        }

        info!(
            "Mirroring {} into {} with {} workers",
            self.config.root_node_id,
            self.store.describe(),
            scheduler.limit()
        );

        let mut walker = TreeWalker::new(
            Arc::clone(&self.source),
            self.config.collision_policy,
            cancel.clone(),
        );
        let walked = walker.walk(&self.config.root_node_id, &mut scheduler).await;

        let mut aggregator = ResultAggregator::new();
        let results = match walked {
            Ok(stats) => {
                info!(
                    "Discovery finished: {} folders, {} files submitted, waiting for transfers",
                    stats.folders_visited, stats.files_submitted
                );
                scheduler.drain().await
            }
            Err(ref e) => {
                error!("❌ Run aborted: {e}");
                if !matches!(e, Error::Cancelled) {
                    aggregator.mark_fatal(e);
                }
                scheduler.abort().await
            }
        };

        // a worker may have hit a fatal error and cancelled the run
        if cancel.is_cancelled() {
            for result in &results {
                if let TransferStatus::Failed(ref e) = result.status {
                    if e.is_fatal() {
                        aggregator.mark_fatal(e);
                    }
                }
            }
            aggregator.mark_fatal(&Error::Cancelled);
        }

        aggregator.record_all(results);
        aggregator.summary()
    }
}
