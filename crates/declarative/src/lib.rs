//! # Declarative
//!
//! A framework for declarative resource convergence.
//!
//! This crate provides the core abstractions for declaring desired state as
//! an ordered run-list and converging a system to match it.
//!
//! ## Core Concepts
//!
//! - **Resource**: Something with state that can be converged (files, packages, services)
//! - **Guard**: An `only_if` / `not_if` predicate evaluated just before apply
//! - **Notification**: A request, emitted by an updated resource, that another
//!   resource run an action; delivered after the run-list, immediate first
//! - **RunList**: Resources in declaration order, built by a [`DeclarationProvider`]
//! - **Executor**: Applies the run-list sequentially, waiting on prefetched
//!   artifacts as it reaches them
//!
//! ## Example
//!
//! ```
//! use declarative::{
//!     ApplyContext, ApplyResult, CommonProperties, ExecuteOptions, NoReport, Resource,
//!     ResourceId, RunList, Timing, run,
//! };
//!
//! #[derive(Debug)]
//! struct Touch {
//!     name: &'static str,
//!     common: CommonProperties,
//! }
//!
//! impl Resource for Touch {
//!     fn id(&self) -> ResourceId {
//!         ResourceId::new("touch", self.name)
//!     }
//!     fn common(&self) -> &CommonProperties {
//!         &self.common
//!     }
//!     fn common_mut(&mut self) -> &mut CommonProperties {
//!         &mut self.common
//!     }
//!     fn apply(&self, _ctx: &mut ApplyContext) -> anyhow::Result<ApplyResult> {
//!         Ok(ApplyResult::updated("touch"))
//!     }
//! }
//!
//! let mut list = RunList::new(vec![
//!     Touch { name: "config", common: CommonProperties::new() },
//!     Touch {
//!         name: "reload",
//!         common: CommonProperties::new().subscribes("run", "touch[config]", Timing::Delayed),
//!     },
//! ]);
//!
//! let summary = run(&mut list, None, &ExecuteOptions::default(), &NoReport).unwrap();
//! assert_eq!(summary.updated, 2);
//! assert_eq!(summary.delivered.len(), 1);
//! ```
//!
//! ## Provider Traits
//!
//! The crate uses traits for dependency injection:
//!
//! - [`DeclarationProvider`]: Declares the run-list
//! - [`Predicate`]: Evaluates guard conditions
//! - [`Reporter`]: Receives per-resource, notification, and download progress
//!
//! This allows the crate to be used without hard dependencies on a recipe
//! format, a shell, or a terminal UI.

pub mod builder;
pub mod context;
pub mod error;
pub mod executor;
pub mod notify;
pub mod resource;
pub mod types;

// Re-export main types at crate root
pub use builder::{DeclarationProvider, RunList, RunListBuilder};
pub use context::{ApplyContext, NoReport, RecordingReporter, ReportEvent, Reporter};
pub use error::RunError;
pub use executor::run;
pub use notify::{NotificationQueue, deliver, find_resource, resolve_subscriptions};
pub use resource::{
    BoxedResource, CommonProperties, Guard, Predicate, Resource, ResourceId, prefetch_request,
};
pub use types::{
    ApplyResult, ExecuteOptions, Notification, PendingNotification, ResourceOutcome,
    ResourceReport, RunSummary, Timing, UP_TO_DATE,
};
