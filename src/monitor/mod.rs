//! File monitor (§4.E).
//!
//! Replaces `watchdog` (`original_source/src/file_monitoring.py`) with the
//! `notify` crate one-for-one: `notify::EventKind::Create`/`Modify`/the
//! rename-to half of `ModifyKind::Name` map to the original's
//! `on_created`/`on_modified`/`on_moved` handlers. Debounce is a single
//! pending-map-plus-timer thread, not one timer per path, so the "one
//! thread owns the pending map" invariant stays simple to reason about
//! (§9 Design Notes: "Thread-timer callbacks").

pub mod enqueuer;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info, warn};

pub use enqueuer::{EligibilityCheck, Enqueuer};

const REJECTED_SUFFIXES: &[&str] = &[".tmp", ".temp", ".swp"];

fn should_process_path(path: &Path) -> bool {
    if !path.exists() || path.is_dir() {
        return false;
    }
    let name = match path.file_name().and_then(|n| n.to_str()) {
        Some(n) => n,
        None => return false,
    };
    if name.starts_with('.') {
        return false;
    }
    REJECTED_SUFFIXES.iter().all(|suffix| !name.ends_with(suffix))
}

struct PendingState {
    pending: HashMap<PathBuf, Instant>,
    stopped: bool,
}

/// Owns the single debounce thread and the map of paths waiting to settle.
struct Debouncer {
    state: Mutex<PendingState>,
    woken: Condvar,
    debounce: Duration,
}

impl Debouncer {
    fn new(debounce: Duration) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(PendingState {
                pending: HashMap::new(),
                stopped: false,
            }),
            woken: Condvar::new(),
            debounce,
        })
    }

    fn touch(&self, path: PathBuf) {
        let mut state = self.state.lock().expect("debouncer mutex poisoned");
        state.pending.insert(path, Instant::now());
        self.woken.notify_all();
    }

    fn stop(&self) {
        let mut state = self.state.lock().expect("debouncer mutex poisoned");
        state.stopped = true;
        self.woken.notify_all();
    }

    /// Runs on its own thread: wakes whenever something is touched or the
    /// debounce interval elapses, and hands back any paths that have been
    /// quiet for at least `debounce`.
    fn run(self: Arc<Self>, eligibility: Arc<dyn EligibilityCheck>, enqueuer: Arc<dyn Enqueuer>) {
        loop {
            let mut state = self.state.lock().expect("debouncer mutex poisoned");
            if state.stopped {
                return;
            }

            let (guard, _timeout) = self
                .woken
                .wait_timeout(state, self.debounce)
                .expect("debouncer mutex poisoned");
            state = guard;
            if state.stopped {
                return;
            }

            let now = Instant::now();
            let ready: Vec<PathBuf> = state
                .pending
                .iter()
                .filter(|(_, touched)| now.duration_since(**touched) >= self.debounce)
                .map(|(path, _)| path.clone())
                .collect();
            for path in &ready {
                state.pending.remove(path);
            }
            drop(state);

            if ready.is_empty() {
                continue;
            }

            let mut to_enqueue = Vec::new();
            for path in ready {
                if should_process_path(&path) && eligibility.is_eligible(&path) {
                    to_enqueue.push(path);
                } else {
                    debug!(?path, "dropping settled path, no longer eligible");
                }
            }
            if !to_enqueue.is_empty() {
                enqueuer.enqueue_many(to_enqueue);
            }
        }
    }
}

pub struct FileMonitor {
    watcher: Mutex<Option<RecommendedWatcher>>,
    watched_directories: Mutex<Vec<PathBuf>>,
    debouncer: Arc<Debouncer>,
    debounce_thread: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl FileMonitor {
    pub fn new(debounce_seconds: u64) -> Self {
        Self {
            watcher: Mutex::new(None),
            watched_directories: Mutex::new(Vec::new()),
            debouncer: Debouncer::new(Duration::from_secs(debounce_seconds)),
            debounce_thread: Mutex::new(None),
        }
    }

    /// Walk every watched directory once, enqueueing anything eligible that
    /// looks like it needs a backup. Mirrors
    /// `file_monitoring.py::perform_initial_scan`.
    pub fn initial_scan(
        &self,
        directories: &[PathBuf],
        eligibility: &dyn EligibilityCheck,
        enqueuer: &dyn Enqueuer,
    ) -> (usize, usize) {
        let mut scanned = 0;
        let mut queued = Vec::new();

        for dir in directories {
            for entry in walkdir::WalkDir::new(dir)
                .into_iter()
                .filter_entry(|e| {
                    e.file_name()
                        .to_str()
                        .map(|n| !n.starts_with('.') || e.depth() == 0)
                        .unwrap_or(true)
                })
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
            {
                scanned += 1;
                let path = entry.path().to_path_buf();
                if eligibility.is_eligible(&path) {
                    queued.push(path);
                }
            }
        }

        let count = queued.len();
        if !queued.is_empty() {
            enqueuer.enqueue_many(queued);
        }
        info!(scanned, queued = count, "initial scan complete");
        (scanned, count)
    }

    /// Start watching `directories` recursively, and spawn the debounce
    /// thread that turns raw filesystem events into queued backups.
    pub fn start(
        &self,
        directories: Vec<PathBuf>,
        eligibility: Arc<dyn EligibilityCheck>,
        enqueuer: Arc<dyn Enqueuer>,
    ) -> notify::Result<()> {
        let debouncer = self.debouncer.clone();
        let mut watcher = notify::recommended_watcher(move |event: notify::Result<Event>| match event {
            Ok(event) => handle_event(&debouncer, event),
            Err(e) => warn!(?e, "watch error"),
        })?;

        for dir in &directories {
            watcher.watch(dir, RecursiveMode::Recursive)?;
        }

        *self.watched_directories.lock().expect("lock poisoned") = directories;
        *self.watcher.lock().expect("lock poisoned") = Some(watcher);

        let debouncer_for_thread = self.debouncer.clone();
        let handle = std::thread::spawn(move || debouncer_for_thread.run(eligibility, enqueuer));
        *self.debounce_thread.lock().expect("lock poisoned") = Some(handle);

        info!("file monitor started");
        Ok(())
    }

    /// Start watching an additional directory while already running. Only
    /// supported while monitoring is active, matching
    /// `file_monitoring.py::add_directory`.
    pub fn add_directory(&self, dir: PathBuf) -> crate::error::Result<()> {
        let mut watcher_guard = self.watcher.lock().expect("lock poisoned");
        let watcher = watcher_guard
            .as_mut()
            .ok_or_else(|| crate::error::BackupError::config("monitor is not running"))?;
        watcher
            .watch(&dir, RecursiveMode::Recursive)
            .map_err(|e| crate::error::BackupError::config(format!("failed to watch {dir:?}: {e}")))?;
        self.watched_directories.lock().expect("lock poisoned").push(dir);
        Ok(())
    }

    /// Not supported: removing a watched directory from a live `notify`
    /// watcher needs the watcher rebuilt, which this monitor doesn't do
    /// while running. Matches `file_monitoring.py::remove_directory`'s own
    /// documented limitation.
    pub fn remove_directory(&self, _dir: &Path) -> bool {
        warn!("removing a watched directory requires a monitor restart; ignoring request");
        false
    }

    pub fn stop(&self) {
        self.debouncer.stop();
        if let Some(handle) = self.debounce_thread.lock().expect("lock poisoned").take() {
            handle.join().ok();
        }
        *self.watcher.lock().expect("lock poisoned") = None;
        info!("file monitor stopped");
    }

    pub fn watched_directories(&self) -> Vec<PathBuf> {
        self.watched_directories.lock().expect("lock poisoned").clone()
    }
}

fn handle_event(debouncer: &Arc<Debouncer>, event: Event) {
    let is_relevant = matches!(
        event.kind,
        EventKind::Create(_)
            | EventKind::Modify(_)
    );
    if !is_relevant {
        return;
    }
    for path in event.paths {
        debouncer.touch(path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use enqueuer::RecordingEnqueuer;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct AlwaysEligible;
    impl EligibilityCheck for AlwaysEligible {
        fn is_eligible(&self, _path: &Path) -> bool {
            true
        }
    }

    struct NeverEligible;
    impl EligibilityCheck for NeverEligible {
        fn is_eligible(&self, _path: &Path) -> bool {
            false
        }
    }

    #[test]
    fn rejects_hidden_and_temp_files() {
        assert!(!should_process_path(Path::new("/tmp/.hidden")));
        assert!(!should_process_path(Path::new("/tmp/file.tmp")));
        assert!(!should_process_path(Path::new("/tmp/file.swp")));
    }

    #[test]
    fn initial_scan_enqueues_eligible_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
        std::fs::write(dir.path().join("b.txt"), b"b").unwrap();

        let monitor = FileMonitor::new(1);
        let enqueuer = RecordingEnqueuer::new();
        let (scanned, queued) = monitor.initial_scan(&[dir.path().to_path_buf()], &AlwaysEligible, &enqueuer);

        assert_eq!(scanned, 2);
        assert_eq!(queued, 2);
        assert_eq!(enqueuer.seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn initial_scan_skips_ineligible_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();

        let monitor = FileMonitor::new(1);
        let enqueuer = RecordingEnqueuer::new();
        let (scanned, queued) = monitor.initial_scan(&[dir.path().to_path_buf()], &NeverEligible, &enqueuer);

        assert_eq!(scanned, 1);
        assert_eq!(queued, 0);
    }

    #[test]
    fn remove_directory_is_unsupported() {
        let monitor = FileMonitor::new(1);
        assert!(!monitor.remove_directory(Path::new("/tmp")));
    }

    #[test]
    fn debounce_settles_after_interval() {
        let debouncer = Debouncer::new(Duration::from_millis(50));
        let enqueuer = Arc::new(RecordingEnqueuer::new());
        let eligibility: Arc<dyn EligibilityCheck> = Arc::new(AlwaysEligible);
        let enqueuer_dyn: Arc<dyn Enqueuer> = enqueuer.clone();

        let stop_flag = Arc::new(AtomicBool::new(false));
        let debouncer_clone = debouncer.clone();
        let handle = std::thread::spawn(move || debouncer_clone.run(eligibility, enqueuer_dyn));

        let tmp = tempfile::NamedTempFile::new().unwrap();
        debouncer.touch(tmp.path().to_path_buf());
        std::thread::sleep(Duration::from_millis(200));

        debouncer.stop();
        handle.join().unwrap();
        stop_flag.store(true, Ordering::SeqCst);

        assert_eq!(enqueuer.seen.lock().unwrap().len(), 1);
    }
}
