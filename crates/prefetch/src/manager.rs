//! Fixed-size worker pool that prefetches queued tasks.
//!
//! Tasks are added before the pool starts. Each worker claims the next index
//! from a shared cursor, runs the transfer, and records the outcome on the
//! task. Cancellation is cooperative: workers look at the shutdown flag only
//! between tasks, never in the middle of a transfer.

use crate::downloader::{Downloader, Transfer};
use crate::error::{Error, Result};
use crate::task::{DownloadRequest, DownloadTask, TaskStatus};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How long a waiter sleeps between status checks and UI ticks.
pub const WAIT_SLICE: Duration = Duration::from_millis(100);

/// Progress callback: `(task_index, bytes_downloaded, total_bytes)`.
///
/// Called from worker threads, possibly several at once.
pub type ProgressFn = dyn Fn(usize, u64, u64) + Send + Sync;

/// Pool settings.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Upper bound on worker threads.
    pub max_concurrency: usize,
    /// Directory that holds staged artifacts.
    pub temp_dir: PathBuf,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            temp_dir: std::env::temp_dir().join("sous-downloads"),
        }
    }
}

struct Shared {
    tasks: Mutex<Vec<Arc<DownloadTask>>>,
    cursor: Mutex<usize>,
    shutdown: AtomicBool,
    completed: AtomicUsize,
    failed: AtomicUsize,
    signal: Mutex<()>,
    changed: Condvar,
    downloader: Downloader,
    progress: Option<Arc<ProgressFn>>,
}

impl Shared {
    /// Claim the next unprocessed index, if any.
    fn claim(&self) -> Option<(usize, Arc<DownloadTask>)> {
        let mut cursor = lock(&self.cursor);
        let tasks = lock(&self.tasks);
        if *cursor >= tasks.len() {
            return None;
        }
        let index = *cursor;
        *cursor += 1;
        Some((index, Arc::clone(&tasks[index])))
    }

    fn notify(&self) {
        let _guard = lock(&self.signal);
        self.changed.notify_all();
    }

    fn run_task(&self, index: usize, task: &DownloadTask) {
        task.advance(TaskStatus::Downloading);
        self.notify();

        let resume_from = partial_len(&task.temp_path);
        if let Some(offset) = resume_from {
            log::debug!("resuming {} at byte {offset}", task.url);
        }
        let transfer = Transfer {
            url: task.url.clone(),
            headers: task.headers.clone(),
            temp_path: task.temp_path.clone(),
            checksum: task.checksum.clone(),
            resume_from,
            ..Transfer::default()
        };
        let mut on_progress = |done: u64, total: u64| {
            task.set_progress(done, total);
            if let Some(callback) = &self.progress {
                callback(index, done, total);
            }
        };

        match self.downloader.fetch(&transfer, &mut on_progress) {
            Ok(_) => {
                log::info!(
                    "prefetched {} for {} ({} bytes)",
                    task.url,
                    task.resource_id,
                    task.bytes_downloaded()
                );
                self.completed.fetch_add(1, Ordering::AcqRel);
                task.advance(TaskStatus::Completed);
            }
            Err(err) => {
                log::warn!("prefetch of {} for {} failed: {err}", task.url, task.resource_id);
                self.failed.fetch_add(1, Ordering::AcqRel);
                task.fail(err.to_string());
            }
        }
        self.notify();
    }
}

/// Size of a partial file left at `path` by an interrupted transfer.
fn partial_len(path: &Path) -> Option<u64> {
    std::fs::metadata(path)
        .ok()
        .filter(|meta| meta.is_file() && meta.len() > 0)
        .map(|meta| meta.len())
}

fn worker_loop(shared: &Shared) {
    while !shared.shutdown.load(Ordering::Acquire) {
        let Some((index, task)) = shared.claim() else {
            break;
        };
        shared.run_task(index, &task);
    }
}

/// Owns the download tasks and the worker threads that drain them.
///
/// Dropping the manager cancels outstanding work and joins every worker, so
/// no thread outlives it.
pub struct DownloadManager {
    shared: Arc<Shared>,
    config: ManagerConfig,
    workers: Vec<JoinHandle<()>>,
}

impl DownloadManager {
    /// Create an idle manager.
    pub fn new(downloader: Downloader, config: ManagerConfig) -> Self {
        Self::build(downloader, config, None)
    }

    /// Create an idle manager that reports byte progress to `progress`.
    pub fn with_progress(
        downloader: Downloader,
        config: ManagerConfig,
        progress: Arc<ProgressFn>,
    ) -> Self {
        Self::build(downloader, config, Some(progress))
    }

    fn build(
        downloader: Downloader,
        config: ManagerConfig,
        progress: Option<Arc<ProgressFn>>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                tasks: Mutex::new(Vec::new()),
                cursor: Mutex::new(0),
                shutdown: AtomicBool::new(false),
                completed: AtomicUsize::new(0),
                failed: AtomicUsize::new(0),
                signal: Mutex::new(()),
                changed: Condvar::new(),
                downloader,
                progress,
            }),
            config,
            workers: Vec::new(),
        }
    }

    /// Staging directory for tasks.
    pub fn temp_dir(&self) -> &Path {
        &self.config.temp_dir
    }

    /// Queue a task and return its index.
    pub fn add_task(&self, request: DownloadRequest) -> usize {
        let task = DownloadTask::new(request, &self.config.temp_dir);
        let mut tasks = lock(&self.shared.tasks);
        tasks.push(Arc::new(task));
        tasks.len() - 1
    }

    /// Task at `index`.
    pub fn task(&self, index: usize) -> Option<Arc<DownloadTask>> {
        lock(&self.shared.tasks).get(index).cloned()
    }

    /// Index of the first task queued for `resource_id`.
    pub fn find_task(&self, resource_id: &str) -> Option<usize> {
        lock(&self.shared.tasks)
            .iter()
            .position(|t| t.resource_id == resource_id)
    }

    /// Number of queued tasks.
    pub fn len(&self) -> usize {
        lock(&self.shared.tasks).len()
    }

    /// Whether no task was queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tasks that finished successfully.
    pub fn completed(&self) -> usize {
        self.shared.completed.load(Ordering::Acquire)
    }

    /// Tasks that failed or were cancelled.
    pub fn failed(&self) -> usize {
        self.shared.failed.load(Ordering::Acquire)
    }

    /// Whether worker threads are running or awaiting join.
    pub fn is_started(&self) -> bool {
        !self.workers.is_empty()
    }

    /// Spawn `min(max_concurrency, task_count)` workers.
    ///
    /// Returns the number of threads started; calling it again while workers
    /// are alive starts nothing.
    pub fn start_all(&mut self) -> Result<usize> {
        if self.is_started() {
            return Ok(0);
        }
        let count = self.config.max_concurrency.max(1).min(self.len());
        prepare_temp_dir(&self.config.temp_dir, count)?;

        for i in 0..count {
            let shared = Arc::clone(&self.shared);
            let handle = thread::Builder::new()
                .name(format!("prefetch-{i}"))
                .spawn(move || worker_loop(&shared))?;
            self.workers.push(handle);
        }
        log::debug!("started {count} prefetch workers for {} tasks", self.len());
        Ok(count)
    }

    /// Ask workers to stop after their current transfer and wake waiters.
    pub fn cancel(&self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.notify();
    }

    /// Block until task `index` is terminal or `ceiling` elapses.
    ///
    /// `tick` runs after every [`WAIT_SLICE`] so a UI can redraw. Returns the
    /// last observed status, which is still non-terminal when the ceiling was
    /// hit or the manager was cancelled before the task started.
    pub fn wait_for(
        &self,
        index: usize,
        ceiling: Duration,
        tick: &mut dyn FnMut(),
    ) -> Option<TaskStatus> {
        let task = self.task(index)?;
        let deadline = Instant::now() + ceiling;

        loop {
            let status = task.status();
            if status.is_terminal() {
                return Some(status);
            }
            if status == TaskStatus::Queued && self.shared.shutdown.load(Ordering::Acquire) {
                return Some(status);
            }
            let now = Instant::now();
            if now >= deadline {
                log::warn!(
                    "gave up waiting for {} after {:?} (still {status})",
                    task.resource_id,
                    ceiling
                );
                return Some(status);
            }

            {
                let guard = lock(&self.shared.signal);
                let _ = self
                    .shared
                    .changed
                    .wait_timeout(guard, WAIT_SLICE.min(deadline - now));
            }
            tick();
        }
    }

    /// Join every worker, then fail any task no worker finished.
    ///
    /// After this returns `completed() + failed() == len()`.
    pub fn join(&mut self) {
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                log::error!("a prefetch worker panicked");
            }
        }

        let tasks = lock(&self.shared.tasks).clone();
        for task in tasks {
            let message = match task.status() {
                TaskStatus::Queued => Error::Cancelled.to_string(),
                TaskStatus::Downloading => "download worker exited early".to_string(),
                _ => continue,
            };
            if task.fail(message) {
                self.shared.failed.fetch_add(1, Ordering::AcqRel);
            }
        }
        self.shared.notify();
    }

    /// Cancel, then join.
    pub fn shutdown(&mut self) {
        self.cancel();
        self.join();
    }
}

impl Drop for DownloadManager {
    fn drop(&mut self) {
        if self.is_started() {
            self.shutdown();
        }
    }
}

fn prepare_temp_dir(temp_dir: &Path, workers: usize) -> Result<()> {
    if workers == 0 {
        return Ok(());
    }
    std::fs::create_dir_all(temp_dir).map_err(|e| Error::io(temp_dir, e))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MockRoute, MockTransport};
    use std::collections::HashSet;
    use tempfile::tempdir;

    fn manager(mock: &MockTransport, workers: usize, temp_dir: &Path) -> DownloadManager {
        DownloadManager::new(
            Downloader::new(Arc::new(mock.clone())),
            ManagerConfig {
                max_concurrency: workers,
                temp_dir: temp_dir.to_path_buf(),
            },
        )
    }

    fn request(i: usize, dir: &Path) -> DownloadRequest {
        DownloadRequest::new(
            format!("remote_file[{i}]"),
            format!("https://example.com/{i}"),
            dir.join(format!("dest-{i}")),
        )
    }

    #[test]
    fn test_every_task_is_accounted_for() {
        let dir = tempdir().unwrap();
        let mock = MockTransport::new();
        for i in 0..7 {
            // Tasks 2 and 5 have no route and answer 404.
            if i != 2 && i != 5 {
                mock.add_route(format!("https://example.com/{i}"), MockRoute::new(vec![b'x'; i * 10]));
            }
        }

        let mut manager = manager(&mock, 3, &dir.path().join("dl"));
        for i in 0..7 {
            assert_eq!(manager.add_task(request(i, dir.path())), i);
        }
        assert_eq!(manager.start_all().unwrap(), 3);
        manager.join();

        assert_eq!(manager.completed() + manager.failed(), 7);
        assert_eq!(manager.completed(), 5);
        assert_eq!(manager.failed(), 2);
        for i in 0..7 {
            let task = manager.task(i).unwrap();
            assert!(task.status().is_terminal());
            if task.status() == TaskStatus::Completed {
                assert_eq!(std::fs::read(&task.temp_path).unwrap().len(), i * 10);
                assert!(!task.final_path.exists());
            }
        }
        assert!(manager.task(2).unwrap().error_message().unwrap().contains("404"));
    }

    fn sha256(data: &[u8]) -> String {
        use sha2::{Digest, Sha256};
        format!("{:x}", Sha256::digest(data))
    }

    #[test]
    fn test_partial_file_is_resumed() {
        let dir = tempdir().unwrap();
        let body = b"0123456789abcdefghij".to_vec();
        let mock = MockTransport::new();
        mock.add_route("https://example.com/0", MockRoute::new(body.clone()));

        let mut manager = manager(&mock, 1, dir.path());
        let index = manager.add_task(request(0, dir.path()));
        let task = manager.task(index).unwrap();
        std::fs::write(&task.temp_path, &body[..8]).unwrap();

        manager.start_all().unwrap();
        manager.join();

        assert_eq!(task.status(), TaskStatus::Completed);
        assert_eq!(std::fs::read(&task.temp_path).unwrap(), body);
        let sent = &mock.requests()[0].headers;
        assert!(sent.iter().any(|(k, v)| k == "Range" && v == "bytes=8-"));
    }

    #[test]
    fn test_partial_file_restarts_when_range_is_ignored() {
        let dir = tempdir().unwrap();
        let body = b"0123456789abcdefghij".to_vec();
        let mock = MockTransport::new();
        mock.add_route(
            "https://example.com/0",
            MockRoute::new(body.clone()).ignoring_range(),
        );

        let mut manager = manager(&mock, 1, dir.path());
        let index = manager.add_task(request(0, dir.path()));
        let task = manager.task(index).unwrap();
        std::fs::write(&task.temp_path, b"stale!!!").unwrap();

        manager.start_all().unwrap();
        manager.join();

        assert_eq!(task.status(), TaskStatus::Completed);
        assert_eq!(std::fs::read(&task.temp_path).unwrap(), body);
        assert_eq!(mock.request_count("https://example.com/0"), 2);
    }

    #[test]
    fn test_interrupted_task_resumes_on_next_run() {
        let dir = tempdir().unwrap();
        let body = b"0123456789abcdefghij".to_vec();
        let mock = MockTransport::new();
        mock.add_route(
            "https://example.com/0",
            MockRoute::new(body.clone()).dropping_after(12),
        );

        let mut first = manager(&mock, 1, dir.path());
        first.add_task(request(0, dir.path()));
        first.start_all().unwrap();
        first.join();
        assert_eq!(first.failed(), 1);

        mock.add_route("https://example.com/0", MockRoute::new(body.clone()));
        let mut second = manager(&mock, 1, dir.path());
        let index = second.add_task(request(0, dir.path()));
        second.start_all().unwrap();
        second.join();

        let task = second.task(index).unwrap();
        assert_eq!(task.status(), TaskStatus::Completed);
        assert_eq!(std::fs::read(&task.temp_path).unwrap(), body);
        let sent = &mock.requests()[1].headers;
        assert!(sent.iter().any(|(k, v)| k == "Range" && v == "bytes=12-"));
    }

    #[test]
    fn test_checksum_mismatch_fails_task_and_spares_destination() {
        let dir = tempdir().unwrap();
        let mock = MockTransport::new();
        mock.add_route("https://example.com/0", MockRoute::new(b"tampered".to_vec()));
        let destination = dir.path().join("dest-0");
        std::fs::write(&destination, b"current").unwrap();

        let mut manager = manager(&mock, 2, &dir.path().join("dl"));
        let index =
            manager.add_task(request(0, dir.path()).checksum(sha256(b"expected contents")));
        manager.start_all().unwrap();
        manager.join();

        let task = manager.task(index).unwrap();
        assert_eq!(task.status(), TaskStatus::Failed);
        assert!(task.error_message().unwrap().contains("checksum"));
        assert_eq!(manager.failed(), 1);
        assert!(!task.temp_path.exists());
        assert_eq!(std::fs::read(&destination).unwrap(), b"current");
    }

    #[test]
    fn test_pool_never_exceeds_task_count() {
        let dir = tempdir().unwrap();
        let mock = MockTransport::new();
        let mut manager = manager(&mock, 8, dir.path());
        manager.add_task(request(0, dir.path()));
        manager.add_task(request(1, dir.path()));
        assert_eq!(manager.start_all().unwrap(), 2);
        assert_eq!(manager.start_all().unwrap(), 0);
        manager.join();
        assert_eq!(manager.completed() + manager.failed(), 2);
    }

    #[test]
    fn test_empty_manager_starts_nothing() {
        let dir = tempdir().unwrap();
        let mut manager = manager(&MockTransport::new(), 4, &dir.path().join("dl"));
        assert!(manager.is_empty());
        assert_eq!(manager.start_all().unwrap(), 0);
        assert!(!dir.path().join("dl").exists());
    }

    #[test]
    fn test_wait_for_returns_terminal_status() {
        let dir = tempdir().unwrap();
        let mock = MockTransport::new();
        mock.add_route(
            "https://example.com/0",
            MockRoute::new(b"payload".to_vec()).with_delay(Duration::from_millis(250)),
        );
        let mut manager = manager(&mock, 1, dir.path());
        let index = manager.add_task(request(0, dir.path()));
        manager.start_all().unwrap();

        let mut ticks = 0;
        let status = manager.wait_for(index, Duration::from_secs(10), &mut || ticks += 1);

        assert_eq!(status, Some(TaskStatus::Completed));
        assert!(ticks >= 1);
        manager.join();
    }

    #[test]
    fn test_wait_for_gives_up_at_ceiling() {
        let dir = tempdir().unwrap();
        let mock = MockTransport::new();
        mock.add_route(
            "https://example.com/0",
            MockRoute::new(b"slow".to_vec()).with_delay(Duration::from_millis(600)),
        );
        let mut manager = manager(&mock, 1, dir.path());
        let index = manager.add_task(request(0, dir.path()));
        manager.start_all().unwrap();

        let status = manager
            .wait_for(index, Duration::from_millis(50), &mut || {})
            .unwrap();
        assert!(!status.is_terminal());

        manager.join();
        assert_eq!(manager.task(index).unwrap().status(), TaskStatus::Completed);
    }

    #[test]
    fn test_wait_for_unknown_index() {
        let dir = tempdir().unwrap();
        let manager = manager(&MockTransport::new(), 1, dir.path());
        assert_eq!(manager.wait_for(3, Duration::from_millis(10), &mut || {}), None);
    }

    #[test]
    fn test_cancel_stops_between_tasks() {
        let dir = tempdir().unwrap();
        let mock = MockTransport::new();
        for i in 0..4 {
            mock.add_route(
                format!("https://example.com/{i}"),
                MockRoute::new(vec![1, 2, 3]).with_delay(Duration::from_millis(100)),
            );
        }
        let mut manager = manager(&mock, 1, dir.path());
        for i in 0..4 {
            manager.add_task(request(i, dir.path()));
        }
        manager.start_all().unwrap();
        manager.cancel();
        manager.join();

        assert_eq!(manager.completed() + manager.failed(), 4);
        assert!(mock.requests().len() < 4);
        let cancelled = (0..4)
            .filter_map(|i| manager.task(i))
            .filter(|t| t.error_message() == Some("download cancelled"))
            .count();
        assert!(cancelled >= 1);
    }

    #[test]
    fn test_progress_callback_sees_every_task() {
        let dir = tempdir().unwrap();
        let mock = MockTransport::new();
        for i in 0..5 {
            mock.add_route(format!("https://example.com/{i}"), MockRoute::new(vec![0; 32]));
        }
        let seen: Arc<Mutex<HashSet<usize>>> = Arc::new(Mutex::new(HashSet::new()));
        let sink = Arc::clone(&seen);
        let mut manager = DownloadManager::with_progress(
            Downloader::new(Arc::new(mock.clone())),
            ManagerConfig {
                max_concurrency: 2,
                temp_dir: dir.path().to_path_buf(),
            },
            Arc::new(move |index, done, total| {
                assert_eq!(done, 32);
                assert_eq!(total, 32);
                sink.lock().unwrap().insert(index);
            }),
        );
        for i in 0..5 {
            manager.add_task(request(i, dir.path()));
        }
        manager.start_all().unwrap();
        manager.join();

        assert_eq!(seen.lock().unwrap().len(), 5);
    }

    #[test]
    fn test_find_task_by_resource() {
        let dir = tempdir().unwrap();
        let manager = manager(&MockTransport::new(), 1, dir.path());
        manager.add_task(request(0, dir.path()));
        manager.add_task(request(1, dir.path()));
        assert_eq!(manager.find_task("remote_file[1]"), Some(1));
        assert_eq!(manager.find_task("remote_file[9]"), None);
    }
}
