//! Download task records and their status machine.

use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

/// Lifecycle of a download task.
///
/// Transitions only move forward: `Queued → Downloading → Completed | Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum TaskStatus {
    /// Waiting for a worker.
    Queued = 0,
    /// A worker is transferring it.
    Downloading = 1,
    /// The artifact is staged at the task's temp path.
    Completed = 2,
    /// The transfer failed; see [`DownloadTask::error_message`].
    Failed = 3,
}

impl TaskStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Queued,
            1 => Self::Downloading,
            2 => Self::Completed,
            _ => Self::Failed,
        }
    }

    /// Whether no further transition can happen.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Lowercase name for display.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Downloading => "downloading",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a resource asks the prefetcher to fetch.
///
/// # Example
///
/// ```
/// use prefetch::DownloadRequest;
///
/// let request = DownloadRequest::new("remote_file[/opt/tool.tgz]", "https://example.com/tool.tgz", "/opt/tool.tgz")
///     .mode(0o644)
///     .checksum("9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08");
/// assert_eq!(request.mode, Some(0o644));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    /// Canonical id of the requesting resource.
    pub resource_id: String,
    /// Source URL.
    pub url: String,
    /// Where the owning resource will eventually place the artifact.
    pub final_path: PathBuf,
    /// Permission bits the resource applies on finalization.
    pub mode: Option<u32>,
    /// Expected SHA-256 hex digest.
    pub checksum: Option<String>,
    /// Number of backups the resource keeps on finalization.
    pub backup: Option<usize>,
    /// Extra request headers.
    pub headers: Vec<(String, String)>,
}

impl DownloadRequest {
    /// Create a request with no optional properties.
    pub fn new(
        resource_id: impl Into<String>,
        url: impl Into<String>,
        final_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            resource_id: resource_id.into(),
            url: url.into(),
            final_path: final_path.into(),
            mode: None,
            checksum: None,
            backup: None,
            headers: Vec::new(),
        }
    }

    /// Set the permission bits.
    #[must_use]
    pub fn mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Set the expected SHA-256 digest.
    #[must_use]
    pub fn checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = Some(checksum.into());
        self
    }

    /// Set the backup count.
    #[must_use]
    pub fn backup(mut self, backup: usize) -> Self {
        self.backup = Some(backup);
        self
    }

    /// Add a request header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// A queued prefetch and its live progress.
///
/// Fields describing the transfer are fixed at creation. Status and counters
/// are atomics written by the owning worker and read by anyone.
#[derive(Debug)]
pub struct DownloadTask {
    /// Canonical id of the requesting resource.
    pub resource_id: String,
    /// Source URL.
    pub url: String,
    /// Staging location, unique per destination.
    pub temp_path: PathBuf,
    /// Destination the resource finalizes into.
    pub final_path: PathBuf,
    /// Permission bits for finalization.
    pub mode: Option<u32>,
    /// Expected SHA-256 hex digest.
    pub checksum: Option<String>,
    /// Backup count for finalization.
    pub backup: Option<usize>,
    /// Extra request headers.
    pub headers: Vec<(String, String)>,
    status: AtomicU8,
    bytes_downloaded: AtomicU64,
    total_bytes: AtomicU64,
    error_message: OnceLock<String>,
}

impl DownloadTask {
    /// Build a queued task, staging under `temp_dir`.
    pub fn new(request: DownloadRequest, temp_dir: &Path) -> Self {
        let temp_path = temp_path_for(&request.final_path, temp_dir);
        Self {
            resource_id: request.resource_id,
            url: request.url,
            temp_path,
            final_path: request.final_path,
            mode: request.mode,
            checksum: request.checksum,
            backup: request.backup,
            headers: request.headers,
            status: AtomicU8::new(TaskStatus::Queued as u8),
            bytes_downloaded: AtomicU64::new(0),
            total_bytes: AtomicU64::new(0),
            error_message: OnceLock::new(),
        }
    }

    /// Current status.
    pub fn status(&self) -> TaskStatus {
        TaskStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Move to `next` if that is a forward transition.
    ///
    /// Returns `false` (and changes nothing) for backward or repeated moves,
    /// and for any move out of a terminal state.
    pub fn advance(&self, next: TaskStatus) -> bool {
        self.status
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                let current = TaskStatus::from_u8(current);
                (!current.is_terminal() && next > current).then_some(next as u8)
            })
            .is_ok()
    }

    /// Record a failure message and move to `Failed`.
    pub fn fail(&self, message: impl Into<String>) -> bool {
        let _ = self.error_message.set(message.into());
        self.advance(TaskStatus::Failed)
    }

    /// Failure message, once the task has failed.
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.get().map(String::as_str)
    }

    /// Publish byte counters. `total` of 0 means unknown.
    pub fn set_progress(&self, downloaded: u64, total: u64) {
        self.bytes_downloaded.store(downloaded, Ordering::Relaxed);
        self.total_bytes.store(total, Ordering::Relaxed);
    }

    /// Bytes written so far.
    pub fn bytes_downloaded(&self) -> u64 {
        self.bytes_downloaded.load(Ordering::Relaxed)
    }

    /// Expected size, 0 when unknown.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes.load(Ordering::Relaxed)
    }
}

/// Staging path for `final_path` inside `temp_dir`.
///
/// The name keeps the destination's file name for readability and appends a
/// digest of the full destination so two resources writing `config.json` into
/// different directories never share a staging file.
pub fn temp_path_for(final_path: &Path, temp_dir: &Path) -> PathBuf {
    let file_name = final_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "download".to_string());
    let digest = Sha256::digest(final_path.to_string_lossy().as_bytes());
    let short: String = format!("{digest:x}").chars().take(16).collect();
    temp_dir.join(format!("{file_name}.{short}.part"))
}
