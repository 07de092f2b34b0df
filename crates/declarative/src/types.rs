//! Core types for declarative resource management

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Skip reason that marks a resource as already converged.
///
/// A resource returning this reason never emits notifications, even when it
/// also reports `was_updated`.
pub const UP_TO_DATE: &str = "up to date";

/// Result of applying a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyResult {
    /// Whether the resource changed anything
    pub was_updated: bool,
    /// The action that ran (e.g. "create", "run", "install")
    pub action: String,
    /// Why nothing happened, if nothing happened
    pub skip_reason: Option<String>,
}

impl ApplyResult {
    /// The resource converged by making a change
    pub fn updated(action: impl Into<String>) -> Self {
        Self {
            was_updated: true,
            action: action.into(),
            skip_reason: None,
        }
    }

    /// The resource was already in the desired state
    pub fn up_to_date(action: impl Into<String>) -> Self {
        Self {
            was_updated: false,
            action: action.into(),
            skip_reason: Some(UP_TO_DATE.to_string()),
        }
    }

    /// The resource decided not to act, for `reason`
    pub fn skipped(action: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            was_updated: false,
            action: action.into(),
            skip_reason: Some(reason.into()),
        }
    }

    /// Check if the skip reason is the "up to date" sentinel
    pub fn is_up_to_date(&self) -> bool {
        self.skip_reason.as_deref() == Some(UP_TO_DATE)
    }
}

/// When a notification is delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Timing {
    /// Delivered in the first pass after the run-list
    Immediate,
    /// Delivered in the second pass, after every immediate notification
    #[default]
    Delayed,
}

impl Timing {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::Delayed => "delayed",
        }
    }
}

impl fmt::Display for Timing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "immediate" | "immediately" => Ok(Self::Immediate),
            "delayed" => Ok(Self::Delayed),
            other => Err(format!("unknown notification timing: {other}")),
        }
    }
}

/// A request that another resource run a named action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Canonical id of the resource that should act, "type[name]"
    pub target: String,
    /// Action to fire on the target
    pub action: String,
    /// Delivery pass
    pub timing: Timing,
}

impl Notification {
    pub fn new(target: impl Into<String>, action: impl Into<String>, timing: Timing) -> Self {
        Self {
            target: target.into(),
            action: action.into(),
            timing,
        }
    }
}

/// A notification waiting for delivery, tagged with its source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingNotification {
    /// Canonical id of the resource that emitted it
    pub source: String,
    #[serde(flatten)]
    pub notification: Notification,
}

/// Terminal state of one resource within a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ResourceOutcome {
    /// Applied and changed; notifications were queued
    Updated { action: String },
    /// Reported a change with the "up to date" sentinel; nothing queued
    UpToDate,
    /// Guarded out, or applied without change
    Skipped { reason: String },
    /// Apply failed and the resource ignores failures
    Failed { error: String },
}

/// Per-resource line of a run summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceReport {
    pub id: String,
    pub outcome: ResourceOutcome,
}

/// Summary of execution results
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub updated: usize,
    pub up_to_date: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Outcomes in application order
    pub resources: Vec<ResourceReport>,
    /// Notifications in delivery order
    pub delivered: Vec<PendingNotification>,
    /// Notifications whose target was not declared
    pub missing_targets: Vec<PendingNotification>,
}

impl RunSummary {
    /// Total number of resources processed
    pub fn total(&self) -> usize {
        self.updated + self.up_to_date + self.skipped + self.failed
    }

    /// Check if no resource failed, ignored or not
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }

    /// Record the outcome of one resource
    pub fn record(&mut self, id: impl Into<String>, outcome: ResourceOutcome) {
        match &outcome {
            ResourceOutcome::Updated { .. } => self.updated += 1,
            ResourceOutcome::UpToDate => self.up_to_date += 1,
            ResourceOutcome::Skipped { .. } => self.skipped += 1,
            ResourceOutcome::Failed { .. } => self.failed += 1,
        }
        self.resources.push(ResourceReport {
            id: id.into(),
            outcome,
        });
    }

    /// Outcome recorded for `id`, if it was processed
    pub fn outcome(&self, id: &str) -> Option<&ResourceOutcome> {
        self.resources
            .iter()
            .find(|r| r.id == id)
            .map(|r| &r.outcome)
    }
}

/// Options for execution
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Ask resources what they would do instead of doing it
    pub why_run: bool,
    /// Longest the executor waits on one prefetch task
    pub wait_ceiling: Duration,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            why_run: false,
            wait_ceiling: Duration::from_secs(30),
        }
    }
}
