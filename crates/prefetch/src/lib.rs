//! # prefetch
//!
//! Concurrent prefetching of remote artifacts.
//!
//! This crate provides:
//! - [`DownloadTask`]: a queued transfer with an atomic, forward-only status
//! - [`DownloadManager`]: a fixed-size worker pool draining queued tasks
//! - [`Downloader`]: one transfer with conditional requests, resume, and
//!   checksum verification
//! - [`transport::Transport`]: the HTTP seam, with a `ureq` implementation and
//!   an in-memory mock
//!
//! Artifacts are only ever staged. Moving a staged file into its final
//! location is left to whoever asked for it.
//!
//! ## Example
//!
//! ```no_run
//! use prefetch::{DownloadManager, DownloadRequest, Downloader, ManagerConfig, TaskStatus};
//! use prefetch::transport::UreqTransport;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let downloader = Downloader::new(Arc::new(UreqTransport::new()));
//! let mut manager = DownloadManager::new(downloader, ManagerConfig::default());
//!
//! let index = manager.add_task(DownloadRequest::new(
//!     "remote_file[/opt/tool.tgz]",
//!     "https://example.com/tool.tgz",
//!     "/opt/tool.tgz",
//! ));
//! manager.start_all().unwrap();
//!
//! let status = manager.wait_for(index, Duration::from_secs(30), &mut || {});
//! assert_eq!(status, Some(TaskStatus::Completed));
//! manager.join();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod downloader;
pub mod error;
pub mod manager;
pub mod task;
pub mod transport;

pub use downloader::{Downloader, Outcome, Transfer, http_date, sha256_file};
pub use error::{Error, Result};
pub use manager::{DownloadManager, ManagerConfig, ProgressFn, WAIT_SLICE};
pub use task::{DownloadRequest, DownloadTask, TaskStatus, temp_path_for};
