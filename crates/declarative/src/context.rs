//! Apply context and reporter traits
//!
//! These traits allow the declarative crate to be used without
//! depending on a specific terminal UI.

use crate::resource::ResourceId;
use crate::types::{ApplyResult, RunSummary, Timing};
use prefetch::{DownloadTask, TaskStatus};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

/// Observer of a run
///
/// Methods take `&self` because download progress arrives from worker
/// threads while the executor is reporting resources. Implementations guard
/// their own state.
pub trait Reporter: Send + Sync {
    /// Called once before the first resource
    fn on_run_start(&self, _total: usize) {}

    /// Called when starting to process a single resource
    fn on_resource_start(&self, id: &ResourceId, description: &str);

    /// Called when a resource changed something
    fn on_resource_updated(&self, id: &ResourceId, result: &ApplyResult);

    /// Called when a resource was guarded out or already converged
    fn on_resource_skipped(&self, id: &ResourceId, reason: &str);

    /// Called when apply failed; `ignored` tells whether the run continues
    fn on_resource_failed(&self, id: &ResourceId, error: &str, ignored: bool);

    /// Called for every delivered notification, in delivery order
    fn on_notification(&self, source: &str, target: &ResourceId, action: &str, timing: Timing);

    /// Called when a notification names a resource that was never declared
    fn on_notification_missing(&self, _source: &str, _target: &str, _action: &str) {}

    /// Byte progress of prefetch task `index`; `total` of 0 means unknown
    fn on_download_progress(&self, _index: usize, _downloaded: u64, _total: u64) {}

    /// Called periodically while the executor is blocked on a download
    fn refresh(&self) {}

    /// Called after notifications were delivered
    fn on_run_complete(&self, _summary: &RunSummary) {}
}

/// No-op reporter
pub struct NoReport;

impl Reporter for NoReport {
    fn on_resource_start(&self, _id: &ResourceId, _description: &str) {}
    fn on_resource_updated(&self, _id: &ResourceId, _result: &ApplyResult) {}
    fn on_resource_skipped(&self, _id: &ResourceId, _reason: &str) {}
    fn on_resource_failed(&self, _id: &ResourceId, _error: &str, _ignored: bool) {}
    fn on_notification(&self, _source: &str, _target: &ResourceId, _action: &str, _timing: Timing) {}
}

/// One observed reporter call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportEvent {
    Start(String),
    Updated(String),
    Skipped(String, String),
    Failed(String, bool),
    Notified {
        source: String,
        target: String,
        action: String,
        timing: Timing,
    },
    Missing(String),
}

/// Reporter that records every event, for assertions
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<ReportEvent>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ReportEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Delivered notifications as `(source, target, action)`
    pub fn notifications(&self) -> Vec<(String, String, String)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ReportEvent::Notified {
                    source,
                    target,
                    action,
                    ..
                } => Some((source, target, action)),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: ReportEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

impl Reporter for RecordingReporter {
    fn on_resource_start(&self, id: &ResourceId, _description: &str) {
        self.push(ReportEvent::Start(id.to_string()));
    }

    fn on_resource_updated(&self, id: &ResourceId, _result: &ApplyResult) {
        self.push(ReportEvent::Updated(id.to_string()));
    }

    fn on_resource_skipped(&self, id: &ResourceId, reason: &str) {
        self.push(ReportEvent::Skipped(id.to_string(), reason.to_string()));
    }

    fn on_resource_failed(&self, id: &ResourceId, _error: &str, ignored: bool) {
        self.push(ReportEvent::Failed(id.to_string(), ignored));
    }

    fn on_notification(&self, source: &str, target: &ResourceId, action: &str, timing: Timing) {
        self.push(ReportEvent::Notified {
            source: source.to_string(),
            target: target.to_string(),
            action: action.to_string(),
            timing,
        });
    }

    fn on_notification_missing(&self, _source: &str, target: &str, _action: &str) {
        self.push(ReportEvent::Missing(target.to_string()));
    }
}

/// Context passed to resource apply operations
#[derive(Debug, Default)]
pub struct ApplyContext<'a> {
    /// Report what would change without changing it
    pub why_run: bool,
    /// The prefetch task for this resource, if one was queued
    pub prefetched: Option<&'a DownloadTask>,
}

impl<'a> ApplyContext<'a> {
    /// Create a new apply context
    pub fn new(why_run: bool) -> Self {
        Self {
            why_run,
            prefetched: None,
        }
    }

    /// Attach the resource's prefetch task
    #[must_use]
    pub fn with_prefetched(mut self, task: &'a DownloadTask) -> Self {
        self.prefetched = Some(task);
        self
    }

    /// Staged artifact, when the prefetch completed and the file is still there
    pub fn staged_artifact(&self) -> Option<&'a Path> {
        let task = self.prefetched?;
        if task.status() != TaskStatus::Completed {
            return None;
        }
        let path = task.temp_path.as_path();
        path.is_file().then_some(path)
    }
}
