//! Run configuration for drive-mirror
//!
//! A `MirrorConfig` describes one invocation: where to read from, where to
//! write to, and how hard to push. It can be deserialized from a JSON file and
//! then overridden field by field from the command line.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::core::error::{Error, Result};

/// Public Drive v3 endpoint
pub const DEFAULT_DRIVE_API_URL: &str = "https://www.googleapis.com/drive/v3";

/// What to do when two source files map to the same destination key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollisionPolicy {
    /// Record a failed result for the second writer and keep going
    #[default]
    Report,
    /// Treat the collision as fatal for the run
    Abort,
}

impl FromStr for CollisionPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "report" => Ok(Self::Report),
            "abort" => Ok(Self::Abort),
            other => Err(Error::InvalidInput(format!(
                "unknown collision policy '{other}' (expected 'report' or 'abort')"
            ))),
        }
    }
}

/// Configuration for one mirror run
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    /// Drive id of the folder (or single file) to mirror
    pub root_node_id: String,

    /// Target S3 bucket
    pub destination_bucket: String,

    /// Region of the target bucket
    pub destination_region: String,

    /// Named AWS profile used to resolve credentials
    pub access_profile: Option<String>,

    /// Maximum number of files transferring at once
    pub concurrency_limit: usize,

    /// Attempts per file before a transient failure is final
    pub retry_bound: u32,

    /// First backoff delay; doubles on every retry
    pub retry_base_delay_ms: u64,

    /// Size of each chunk moved through a stream bridge
    pub buffer_size: usize,

    /// Number of chunks a stream bridge holds before the reader suspends
    pub bridge_capacity: usize,

    /// A download that delivers no data for this long is treated as transient
    pub read_timeout_secs: u64,

    pub collision_policy: CollisionPolicy,

    /// Base URL of the Drive API
    pub drive_api_url: String,

    /// Mirror into this local directory instead of S3
    pub local_destination: Option<PathBuf>,

    /// Walk the tree and report keys without transferring anything
    pub dry_run: bool,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            root_node_id: String::new(),
            destination_bucket: String::new(),
            destination_region: "us-east-1".to_string(),
            access_profile: None,
            concurrency_limit: default_concurrency(),
            retry_bound: 3,
            retry_base_delay_ms: 1000,
            buffer_size: 64 * 1024, // 64KB
            bridge_capacity: 8,
            read_timeout_secs: 60,
            collision_policy: CollisionPolicy::default(),
            drive_api_url: DEFAULT_DRIVE_API_URL.to_string(),
            local_destination: None,
            dry_run: false,
        }
    }
}

/// Default pool size: twice the CPU count, capped at 8
pub fn default_concurrency() -> usize {
    std::cmp::min(8, num_cpus::get() * 2).max(1)
}

impl MirrorConfig {
    /// Load a configuration file; fields it omits keep their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|e| {
            Error::InvalidInput(format!("invalid config file {}: {e}", path.display()))
        })
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    /// Reject configurations that cannot produce a meaningful run
    pub fn validate(&self) -> Result<()> {
        if self.root_node_id.trim().is_empty() {
            return Err(Error::InvalidInput("root node id is required".to_string()));
        }
        if self.local_destination.is_none() && !self.dry_run {
            if self.destination_bucket.trim().is_empty() {
                return Err(Error::InvalidInput(
                    "destination bucket is required (or use a local destination)".to_string(),
                ));
            }
            if self.destination_region.trim().is_empty() {
                return Err(Error::InvalidInput("destination region is required".to_string()));
            }
        }
        if self.concurrency_limit == 0 {
            return Err(Error::InvalidInput("concurrency limit must be at least 1".to_string()));
        }
        if self.retry_bound == 0 {
            return Err(Error::InvalidInput("retry bound must be at least 1".to_string()));
        }
        if self.read_timeout_secs == 0 {
            return Err(Error::InvalidInput("read timeout must be at least 1 second".to_string()));
        }
        if self.buffer_size == 0 || self.bridge_capacity == 0 {
            return Err(Error::InvalidInput(
                "buffer size and bridge capacity must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
