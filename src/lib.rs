//! # drive-mirror
//!
//! Mirrors a Google Drive folder tree into an S3 bucket (or a local
//! directory), streaming every file from source to destination without
//! staging it on disk or holding it whole in memory.
//!
//! ## Quick start
//!
//! ```no_run
//! use drive_mirror::{Credential, MirrorConfig};
//!
//! # async fn example() -> drive_mirror::Result<()> {
//! let config = MirrorConfig {
//!     root_node_id: "1AbCdEf".to_string(),
//!     destination_bucket: "my-backup".to_string(),
//!     ..Default::default()
//! };
//! let summary = drive_mirror::mirror(&config, Credential::from_env("DRIVE_ACCESS_TOKEN")?).await?;
//! println!("{summary}");
//! std::process::exit(summary.outcome.exit_code());
//! # }
//! ```
//!
//! Per-file failures never stop a run; they are collected into the
//! [`RunSummary`]. Only an expired credential (or a key collision under
//! [`CollisionPolicy::Abort`]) aborts the whole mirror.

use std::sync::Arc;

use log::info;

mod core;

pub use crate::core::config::{default_concurrency, CollisionPolicy, MirrorConfig, DEFAULT_DRIVE_API_URL};
pub use crate::core::error::{Error, Result};
pub use crate::core::model::{Node, NodeKind, NodePath, TransferResult, TransferStatus, TransferTask};
pub use crate::core::s3::S3Store;
pub use crate::core::source::{Credential, DriveBrowser, SourceBrowser};
pub use crate::core::store::{LocalStore, ObjectStore};
pub use crate::core::stream::{BridgeReader, BridgeWriter, DownloadStream, ProgressCallback, StreamBridge};
pub use crate::core::summary::{KeyReport, ResultAggregator, RunOutcome, RunSummary};
pub use crate::core::{Mirror, Scheduler, TransferWorker, TreeWalker, WalkStats, WorkerOptions};

/// Mirror the configured Drive tree with default wiring
///
/// Errors only for problems detected before any traversal starts
/// (invalid configuration, HTTP client setup). Everything after that
/// is reported through the returned summary.
pub async fn mirror(config: &MirrorConfig, credential: Credential) -> Result<RunSummary> {
    mirror_with_progress(config, credential, None).await
}

/// Like [`mirror`], reporting `(completed, submitted)` file counts as transfers finish
pub async fn mirror_with_progress(
    config: &MirrorConfig,
    credential: Credential,
    progress: Option<ProgressCallback>,
) -> Result<RunSummary> {
    config.validate()?;

    let source: Arc<dyn SourceBrowser> = Arc::new(DriveBrowser::new(&config.drive_api_url, credential)?);
    let store = open_store(config).await;

    let mut mirror = Mirror::new(source, store, config.clone());
    if let Some(progress) = progress {
        mirror = mirror.with_progress(progress);
    }
    Ok(mirror.run().await)
}

/// Pick the destination described by `config`
async fn open_store(config: &MirrorConfig) -> Arc<dyn ObjectStore> {
    if let Some(ref dir) = config.local_destination {
        info!("📁 Writing into local directory {}", dir.display());
        return Arc::new(LocalStore::new(dir.clone()));
    }
    if config.dry_run && config.destination_bucket.is_empty() {
        // workers never reach the store during a dry run
        return Arc::new(LocalStore::new("."));
    }
    Arc::new(
        S3Store::connect(
            &config.destination_bucket,
            &config.destination_region,
            config.access_profile.as_deref(),
        )
        .await,
    )
}
