//! Run summary aggregation

use std::fmt;

use serde::Serialize;

use crate::core::error::Error;
use crate::core::model::{TransferResult, TransferStatus, DRY_RUN_REASON};

/// Final classification of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    AllSucceeded,
    PartialFailure,
    TotalFailure,
}

impl RunOutcome {
    /// Process exit status for this outcome
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::AllSucceeded => 0,
            RunOutcome::PartialFailure => 1,
            RunOutcome::TotalFailure => 2,
        }
    }
}

/// A key together with why it did not succeed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyReport {
    pub key: String,
    pub reason: String,
}

/// Terminal artifact of one run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub bytes_transferred: u64,
    pub failed_keys: Vec<KeyReport>,
    pub skipped_keys: Vec<KeyReport>,
    pub fatal_error: Option<String>,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.succeeded + self.skipped + self.failed
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Mirror finished: {:?} ({} succeeded, {} skipped, {} failed, {} bytes)",
            self.outcome, self.succeeded, self.skipped, self.failed, self.bytes_transferred
        )?;
        if let Some(ref fatal) = self.fatal_error {
            writeln!(f, "Fatal: {fatal}")?;
        }
        for report in &self.failed_keys {
            writeln!(f, "  FAILED  {}: {}", report.key, report.reason)?;
        }
        for report in &self.skipped_keys {
            writeln!(f, "  SKIPPED {}: {}", report.key, report.reason)?;
        }
        Ok(())
    }
}

/// Order-independent accumulator of transfer results
#[derive(Debug, Default)]
pub struct ResultAggregator {
    succeeded: usize,
    bytes_transferred: u64,
    failed_keys: Vec<KeyReport>,
    skipped_keys: Vec<KeyReport>,
    fatal_error: Option<String>,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, result: TransferResult) {
        self.bytes_transferred += result.bytes_transferred;
        match result.status {
            TransferStatus::Succeeded => self.succeeded += 1,
            TransferStatus::Skipped(reason) => self.skipped_keys.push(KeyReport {
                key: result.destination_key,
                reason,
            }),
            TransferStatus::Failed(error) => self.failed_keys.push(KeyReport {
                key: result.destination_key,
                reason: error.to_string(),
            }),
        }
    }

    pub fn record_all(&mut self, results: impl IntoIterator<Item = TransferResult>) {
        for result in results {
            self.record(result);
        }
    }

    /// Mark the run as aborted; the first fatal error wins
    pub fn mark_fatal(&mut self, error: &Error) {
        if self.fatal_error.is_none() {
            self.fatal_error = Some(error.to_string());
        }
    }

    pub fn summary(mut self) -> RunSummary {
        self.failed_keys.sort_by(|a, b| a.key.cmp(&b.key));
        self.skipped_keys.sort_by(|a, b| a.key.cmp(&b.key));

        let outcome = if self.fatal_error.is_some() {
            RunOutcome::TotalFailure
        } else if self.failed_keys.is_empty()
            && self.skipped_keys.iter().all(|k| k.reason == DRY_RUN_REASON)
        {
            RunOutcome::AllSucceeded
        } else {
            RunOutcome::PartialFailure
        };

        RunSummary {
            outcome,
            succeeded: self.succeeded,
            skipped: self.skipped_keys.len(),
            failed: self.failed_keys.len(),
            bytes_transferred: self.bytes_transferred,
            failed_keys: self.failed_keys,
            skipped_keys: self.skipped_keys,
            fatal_error: self.fatal_error,
        }
    }
}
