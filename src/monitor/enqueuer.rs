//! The `Enqueuer` capability object (§9 Design Notes).
//!
//! The monitor only needs to push paths onto the pipeline's queue; it has
//! no business needing the rest of [`crate::pipeline::BackupPipeline`]'s
//! surface (storage, catalog, crypto). Giving it a narrow capability
//! instead of a reference to the whole pipeline breaks what would
//! otherwise be a monitor-owns-pipeline/pipeline-owns-monitor cycle.

use std::path::PathBuf;
use std::sync::Arc;

use crate::pipeline::BackupPipeline;

pub trait Enqueuer: Send + Sync {
    fn enqueue_many(&self, paths: Vec<PathBuf>);
}

impl Enqueuer for Arc<BackupPipeline> {
    fn enqueue_many(&self, paths: Vec<PathBuf>) {
        self.queue().enqueue_many(paths);
    }
}

/// Narrow capability the monitor uses to check whether a changed path is
/// worth queuing at all, without needing the rest of the pipeline's surface.
pub trait EligibilityCheck: Send + Sync {
    fn is_eligible(&self, path: &std::path::Path) -> bool;
}

impl EligibilityCheck for Arc<BackupPipeline> {
    fn is_eligible(&self, path: &std::path::Path) -> bool {
        self.should_backup(path).is_ok()
    }
}

#[cfg(test)]
pub struct RecordingEnqueuer {
    pub seen: std::sync::Mutex<Vec<PathBuf>>,
}

#[cfg(test)]
impl RecordingEnqueuer {
    pub fn new() -> Self {
        Self {
            seen: std::sync::Mutex::new(Vec::new()),
        }
    }
}

#[cfg(test)]
impl Enqueuer for RecordingEnqueuer {
    fn enqueue_many(&self, paths: Vec<PathBuf>) {
        self.seen.lock().unwrap().extend(paths);
    }
}
