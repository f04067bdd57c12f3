//! Restore progress tracking (§9 Design Notes).
//!
//! A blocking callback invoked from inside the restore routine would tie
//! the restore thread directly to whatever is watching it — awkward once
//! the watcher is an HTTP handler on a different thread entirely. Instead,
//! restores publish their progress into a shared, mutex-guarded map keyed
//! by restore id; the dashboard polls it.

use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RestoreProgress {
    pub bytes_done: u64,
    pub bytes_total: u64,
    pub done: bool,
    pub failed: bool,
}

#[derive(Default)]
pub struct ProgressTracker {
    restores: Mutex<HashMap<u64, RestoreProgress>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self, restore_id: u64, bytes_total: u64) {
        self.restores.lock().expect("progress mutex poisoned").insert(
            restore_id,
            RestoreProgress {
                bytes_done: 0,
                bytes_total,
                done: false,
                failed: false,
            },
        );
    }

    pub fn update(&self, restore_id: u64, bytes_done: u64) {
        if let Some(progress) = self.restores.lock().expect("progress mutex poisoned").get_mut(&restore_id) {
            progress.bytes_done = bytes_done;
        }
    }

    pub fn finish(&self, restore_id: u64, failed: bool) {
        if let Some(progress) = self.restores.lock().expect("progress mutex poisoned").get_mut(&restore_id) {
            progress.done = true;
            progress.failed = failed;
        }
    }

    pub fn get(&self, restore_id: u64) -> Option<RestoreProgress> {
        self.restores.lock().expect("progress mutex poisoned").get(&restore_id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_progress_through_completion() {
        let tracker = ProgressTracker::new();
        tracker.start(1, 100);
        tracker.update(1, 50);
        assert_eq!(tracker.get(1).unwrap().bytes_done, 50);
        assert!(!tracker.get(1).unwrap().done);

        tracker.finish(1, false);
        let final_state = tracker.get(1).unwrap();
        assert!(final_state.done);
        assert!(!final_state.failed);
    }

    #[test]
    fn unknown_id_returns_none() {
        let tracker = ProgressTracker::new();
        assert!(tracker.get(999).is_none());
    }
}
