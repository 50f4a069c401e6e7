//! Bounded-concurrency dispatch of transfer tasks
//!
//! The scheduler owns a semaphore with one permit per allowed concurrent
//! worker. `submit` waits for a permit before spawning, which makes it the
//! single backpressure point between discovery and transfer.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use log::{debug, warn};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::core::error::{Error, Result};
use crate::core::model::{TransferResult, TransferTask};
use crate::core::stream::ProgressCallback;
use crate::core::worker::TransferWorker;

pub struct Scheduler {
    worker: Arc<TransferWorker>,
    permits: Arc<Semaphore>,
    limit: usize,
    running: JoinSet<TransferResult>,
    results: Vec<TransferResult>,
    submitted: u64,
    /// Worker results collected so far; walker-recorded results excluded
    completed: u64,
    cancel: CancellationToken,
    progress: Option<ProgressCallback>,
}

impl Scheduler {
    pub fn new(worker: Arc<TransferWorker>, limit: usize, cancel: CancellationToken) -> Self {
        let limit = limit.max(1);
        Self {
            worker,
            permits: Arc::new(Semaphore::new(limit)),
            limit,
            running: JoinSet::new(),
            results: Vec::new(),
            submitted: 0,
            completed: 0,
            cancel,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Number of workers currently holding a permit
    pub fn in_flight(&self) -> usize {
        self.limit - self.permits.available_permits()
    }

    /// Dispatch a task, suspending only while every permit is taken
    ///
    /// Fails with `Cancelled` if the run is cancelled while waiting.
    pub async fn submit(&mut self, task: TransferTask) -> Result<()> {
        self.collect_finished();

        let permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(Error::Cancelled),
            permit = self.permits.clone().acquire_owned() => {
                permit.map_err(|_| Error::Cancelled)?
            }
        };

        debug!("Dispatching {} ({} in flight)", task.destination_key, self.in_flight());

        let worker = Arc::clone(&self.worker);
        self.submitted += 1;
        self.running.spawn(async move {
            let key = task.destination_key.clone();
            let result = AssertUnwindSafe(worker.run(task))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    TransferResult::failed(
                        key,
                        Error::Destination("transfer worker panicked".to_string()),
                    )
                });
            drop(permit);
            result
        });

        Ok(())
    }

    /// Deposit a result produced outside a worker (listing failure, collision)
    pub fn record(&mut self, result: TransferResult) {
        self.results.push(result);
    }

    /// Move finished workers into the result list without waiting
    fn collect_finished(&mut self) {
        while let Some(joined) = self.running.try_join_next() {
            self.accept(joined);
        }
    }

    fn accept(&mut self, joined: std::result::Result<TransferResult, tokio::task::JoinError>) {
        match joined {
            Ok(result) => {
                self.results.push(result);
                self.completed += 1;
                if let Some(ref progress) = self.progress {
                    progress(self.completed, self.submitted);
                }
            }
            // only reachable through abort(); the run is already failing
            Err(e) => warn!("⚠️  Transfer task ended abnormally: {e}"),
        }
    }

    /// Wait for every submitted task and return all results
    pub async fn drain(mut self) -> Vec<TransferResult> {
        while let Some(joined) = self.running.join_next().await {
            self.accept(joined);
        }
        self.results
    }

    /// Cancel in-flight workers and return whatever already finished
    pub async fn abort(mut self) -> Vec<TransferResult> {
        self.cancel.cancel();
        self.permits.close();
        self.running.abort_all();
        while let Some(joined) = self.running.join_next().await {
            self.accept(joined);
        }
        self.results
    }
}
