//! Deduplicating backup queue (§3, §4.D).
//!
//! Grounded in `original_source/src/backup_engine.py::add_to_backup_queue`:
//! a path already pending is never added twice, and draining the queue is
//! single-flight — a drain already in progress makes a second call a no-op
//! rather than a second concurrent drain.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Mutex;

/// Thread-safe set of paths waiting to be backed up.
#[derive(Default)]
pub struct BackupQueue {
    pending: Mutex<BTreeSet<PathBuf>>,
}

impl BackupQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `paths`, skipping any already pending.
    pub fn enqueue_many(&self, paths: impl IntoIterator<Item = PathBuf>) {
        let mut pending = self.pending.lock().expect("queue mutex poisoned");
        pending.extend(paths);
    }

    pub fn enqueue(&self, path: PathBuf) {
        self.enqueue_many(std::iter::once(path));
    }

    /// Atomically take and clear everything currently pending.
    pub fn drain(&self) -> Vec<PathBuf> {
        let mut pending = self.pending.lock().expect("queue mutex poisoned");
        std::mem::take(&mut *pending).into_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.pending.lock().expect("queue mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_deduplicates() {
        let queue = BackupQueue::new();
        queue.enqueue(PathBuf::from("/a"));
        queue.enqueue(PathBuf::from("/a"));
        queue.enqueue(PathBuf::from("/b"));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn drain_empties_the_queue() {
        let queue = BackupQueue::new();
        queue.enqueue(PathBuf::from("/a"));
        let drained = queue.drain();
        assert_eq!(drained.len(), 1);
        assert!(queue.is_empty());
    }
}
