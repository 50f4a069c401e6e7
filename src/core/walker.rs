//! Depth-first discovery of the source tree
//!
//! The walker is the only producer of destination keys. It lists one folder at
//! a time, submits every file it finds to the scheduler and pushes sub-folders
//! onto an explicit stack together with their own copy of the path.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

use crate::core::config::CollisionPolicy;
use crate::core::error::{Error, Result};
use crate::core::model::{Node, NodeKind, NodePath, TransferResult, TransferTask};
use crate::core::scheduler::Scheduler;
use crate::core::source::SourceBrowser;

/// Counters describing one traversal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkStats {
    pub folders_visited: usize,
    pub folders_failed: usize,
    pub files_submitted: usize,
    pub collisions: usize,
}

struct Frame {
    folder_id: String,
    path: NodePath,
    is_root: bool,
}

pub struct TreeWalker {
    source: Arc<dyn SourceBrowser>,
    collision_policy: CollisionPolicy,
    cancel: CancellationToken,
    /// destination key -> id of the node that claimed it first
    claimed: HashMap<String, String>,
    visited_folders: HashSet<String>,
    stats: WalkStats,
}

impl TreeWalker {
    pub fn new(
        source: Arc<dyn SourceBrowser>,
        collision_policy: CollisionPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            collision_policy,
            cancel,
            claimed: HashMap::new(),
            visited_folders: HashSet::new(),
            stats: WalkStats::default(),
        }
    }

    /// Discover everything under `root_id` and submit one task per file
    ///
    /// Returns an error only for run-level failures: the root cannot be
    /// enumerated, a fatal credential error, a collision under
    /// `CollisionPolicy::Abort`, or cancellation. Subtree failures are recorded
    /// on the scheduler and traversal continues.
    pub async fn walk(&mut self, root_id: &str, scheduler: &mut Scheduler) -> Result<WalkStats> {
        self.ensure_running()?;

        let root = self.source.get_node(root_id).await.map_err(|e| self.escalate(e))?;

        if root.kind() == NodeKind::File {
            info!("Root {root_id} is a single file: {}", root.name);
            self.dispatch(&root, &NodePath::root(), scheduler).await?;
            return Ok(self.stats);
        }

        let mut stack = vec![Frame {
            folder_id: root.id.clone(),
            path: NodePath::root().child(&root.name),
            is_root: true,
        }];

        while let Some(frame) = stack.pop() {
            self.ensure_running()?;

            if !self.visited_folders.insert(frame.folder_id.clone()) {
                warn!(
                    "⚠️  Folder {} reached twice (at {}); not descending again",
                    frame.folder_id,
                    frame.path.display_key()
                );
                continue;
            }

            info!("Processing folder: {}", frame.path.display_key());

            let listed = self.source.list_children(&frame.folder_id).await;
            let children = match listed {
                Ok(children) => children,
                Err(e) if frame.is_root || e.is_fatal() => return Err(self.escalate(e)),
                Err(e) => {
                    warn!("❌ Skipping subtree {}: {e}", frame.path.display_key());
                    self.stats.folders_failed += 1;
                    scheduler.record(TransferResult::failed(frame.path.display_key(), e));
                    continue;
                }
            };
            self.stats.folders_visited += 1;

            let mut subfolders = Vec::new();
            for child in children {
                match child.kind() {
                    NodeKind::File => self.dispatch(&child, &frame.path, scheduler).await?,
                    NodeKind::Folder => subfolders.push(child),
                }
            }

            // reversed so the first listed sub-folder is explored first
            for folder in subfolders.into_iter().rev() {
                stack.push(Frame {
                    path: frame.path.child(&folder.name),
                    folder_id: folder.id,
                    is_root: false,
                });
            }
        }

        Ok(self.stats)
    }

    /// Claim a destination key for `file` and hand the task to the scheduler
    async fn dispatch(&mut self, file: &Node, path: &NodePath, scheduler: &mut Scheduler) -> Result<()> {
        let task = TransferTask::for_node(file, path);

        if let Some(first) = self.claimed.get(&task.destination_key) {
            warn!(
                "⚠️  Key collision on {}: nodes {} and {}",
                task.destination_key, first, file.id
            );
            self.stats.collisions += 1;
            let error = Error::KeyCollision {
                key: task.destination_key.clone(),
                source_id: file.id.clone(),
            };
            return match self.collision_policy {
                CollisionPolicy::Report => {
                    scheduler.record(TransferResult::failed(task.destination_key, error));
                    Ok(())
                }
                CollisionPolicy::Abort => Err(self.escalate(error)),
            };
        }

        self.claimed.insert(task.destination_key.clone(), file.id.clone());
        debug!("Processing file: {}", task.destination_key);
        self.stats.files_submitted += 1;
        scheduler.submit(task).await
    }

    fn ensure_running(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Run-level failure: stop every other part of the pipeline
    fn escalate(&self, error: Error) -> Error {
        self.cancel.cancel();
        error
    }
}
