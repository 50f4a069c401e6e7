//! Destination stores for drive-mirror
//!
//! An `ObjectStore` consumes one bridge reader per object and either commits
//! the whole object or leaves nothing readable behind.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use log::debug;
use tokio::io::AsyncWriteExt;

use crate::core::error::{Error, Result};
use crate::core::stream::BridgeReader;

/// Flat-keyed sink with atomic commit on successful close
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write the whole body under `key`, returning the number of bytes stored
    async fn put_object(&self, key: &str, body: BridgeReader) -> Result<u64>;

    /// Human-readable description of where objects land
    fn describe(&self) -> String;
}

/// Stores objects as files under a local directory
///
/// Each object is streamed into a hidden temp file next to its final path and
/// renamed into place only after the body was read to a clean EOF.
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a key below the root, refusing keys that would escape it
    fn object_path(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if key.is_empty() || escapes {
            return Err(Error::Destination(format!(
                "key '{key}' cannot be stored below {}",
                self.root.display()
            )));
        }
        Ok(self.root.join(relative))
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.partial"))
}

/// Removes an uncommitted temp file when dropped
///
/// Covers every way a write can end early, including the future being
/// dropped by cancellation or `JoinSet::abort_all`.
struct TempFileGuard {
    path: PathBuf,
    committed: bool,
}

impl TempFileGuard {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            committed: false,
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn commit(&mut self) {
        self.committed = true;
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if !self.committed {
            // may never have been created, or already renamed away
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn put_object(&self, key: &str, mut body: BridgeReader) -> Result<u64> {
        let path = self.object_path(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut guard = TempFileGuard::new(temp_path_for(&path));
        let mut file = tokio::fs::File::create(guard.path()).await?;
        let written = tokio::io::copy(&mut body, &mut file).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(guard.path(), &path).await?;
        guard.commit();
        debug!("Committed {written} bytes to {}", path.display());
        Ok(written)
    }

    fn describe(&self) -> String {
        format!("local directory {}", self.root.display())
    }
}
