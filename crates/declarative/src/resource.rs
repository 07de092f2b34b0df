//! Resource trait for declarative state management
//!
//! A Resource represents something that can be in a certain state,
//! and can be changed to reach a desired state. Every resource carries the
//! same [`CommonProperties`]: guards, failure policy, and the notifications
//! it emits or subscribes to.

use crate::context::ApplyContext;
use crate::types::{ApplyResult, Notification, Timing};
use anyhow::Result;
use prefetch::DownloadRequest;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Canonical identity of a resource, rendered as `type[name]`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId {
    pub type_name: String,
    pub name: String,
}

impl ResourceId {
    pub fn new(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            name: name.into(),
        }
    }

    /// Parse a `type[name]` string.
    ///
    /// The type is everything before the first `[`; the name is everything
    /// between it and the trailing `]`, so names may contain brackets.
    ///
    /// ```
    /// use declarative::ResourceId;
    ///
    /// let id = ResourceId::parse("service[nginx]").unwrap();
    /// assert_eq!(id.type_name, "service");
    /// assert_eq!(id.name, "nginx");
    /// assert!(ResourceId::parse("nginx").is_none());
    /// ```
    pub fn parse(s: &str) -> Option<Self> {
        let (type_name, rest) = s.split_once('[')?;
        let name = rest.strip_suffix(']')?;
        if type_name.is_empty() || name.is_empty() {
            return None;
        }
        Some(Self::new(type_name, name))
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.type_name, self.name)
    }
}

impl FromStr for ResourceId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("expected type[name], got {s:?}"))
    }
}

/// Something a guard can ask: does this condition hold right now?
pub trait Predicate: Send + Sync + fmt::Debug {
    fn evaluate(&self) -> Result<bool>;
}

/// A predicate plus the text shown when it skips a resource
#[derive(Debug)]
pub struct Guard {
    description: String,
    predicate: Box<dyn Predicate>,
}

impl Guard {
    pub fn new(description: impl Into<String>, predicate: impl Predicate + 'static) -> Self {
        Self {
            description: description.into(),
            predicate: Box::new(predicate),
        }
    }

    /// Build a guard from a closure
    pub fn from_fn<F>(description: impl Into<String>, f: F) -> Self
    where
        F: Fn() -> Result<bool> + Send + Sync + 'static,
    {
        Self::new(description, FnPredicate(f))
    }

    /// A guard that always evaluates to `value`
    pub fn constant(value: bool) -> Self {
        Self::from_fn(value.to_string(), move || Ok(value))
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn evaluate(&self) -> Result<bool> {
        self.predicate.evaluate()
    }
}

struct FnPredicate<F>(F);

impl<F> fmt::Debug for FnPredicate<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnPredicate")
    }
}

impl<F> Predicate for FnPredicate<F>
where
    F: Fn() -> Result<bool> + Send + Sync,
{
    fn evaluate(&self) -> Result<bool> {
        (self.0)()
    }
}

/// Properties shared by every resource kind
#[derive(Debug, Default)]
pub struct CommonProperties {
    /// Apply only if this evaluates true
    pub only_if: Option<Guard>,
    /// Skip if this evaluates true
    pub not_if: Option<Guard>,
    /// Record apply errors instead of aborting the run
    pub ignore_failure: bool,
    /// Outgoing notifications, emitted when the resource updates
    pub notifications: Vec<Notification>,
    /// Incoming subscriptions; `target` names the resource watched
    pub subscriptions: Vec<Notification>,
}

impl CommonProperties {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn only_if(mut self, guard: Guard) -> Self {
        self.only_if = Some(guard);
        self
    }

    #[must_use]
    pub fn not_if(mut self, guard: Guard) -> Self {
        self.not_if = Some(guard);
        self
    }

    #[must_use]
    pub fn ignore_failure(mut self, ignore: bool) -> Self {
        self.ignore_failure = ignore;
        self
    }

    /// Notify `target` to run `action` when this resource updates
    #[must_use]
    pub fn notifies(
        mut self,
        action: impl Into<String>,
        target: impl Into<String>,
        timing: Timing,
    ) -> Self {
        self.notifications
            .push(Notification::new(target, action, timing));
        self
    }

    /// Run `action` on this resource when `source` updates
    #[must_use]
    pub fn subscribes(
        mut self,
        action: impl Into<String>,
        source: impl Into<String>,
        timing: Timing,
    ) -> Self {
        self.subscriptions
            .push(Notification::new(source, action, timing));
        self
    }

    /// Check if either guard is set
    pub fn has_guards(&self) -> bool {
        self.only_if.is_some() || self.not_if.is_some()
    }
}

/// Core trait for declarative resources
///
/// The executor only sees this interface: an identity, the common
/// properties, and `apply`. What a kind converges, and how it reports "no
/// change", is up to the implementation.
///
/// # Example
///
/// ```
/// use declarative::{ApplyContext, ApplyResult, CommonProperties, Resource, ResourceId};
///
/// #[derive(Debug)]
/// struct Marker {
///     path: String,
///     common: CommonProperties,
/// }
///
/// impl Resource for Marker {
///     fn id(&self) -> ResourceId {
///         ResourceId::new("file", &self.path)
///     }
///
///     fn common(&self) -> &CommonProperties {
///         &self.common
///     }
///
///     fn common_mut(&mut self) -> &mut CommonProperties {
///         &mut self.common
///     }
///
///     fn apply(&self, ctx: &mut ApplyContext) -> anyhow::Result<ApplyResult> {
///         if std::path::Path::new(&self.path).exists() {
///             return Ok(ApplyResult::up_to_date("create"));
///         }
///         if !ctx.why_run {
///             std::fs::write(&self.path, "")?;
///         }
///         Ok(ApplyResult::updated("create"))
///     }
/// }
/// ```
pub trait Resource: Send + fmt::Debug {
    /// Canonical identity, unique within a well-formed run-list
    fn id(&self) -> ResourceId;

    /// Human-readable description of what this resource does
    fn description(&self) -> String {
        self.id().to_string()
    }

    fn common(&self) -> &CommonProperties;

    fn common_mut(&mut self) -> &mut CommonProperties;

    /// Converge this resource
    ///
    /// Returns `Err` on failure; the executor decides whether that is fatal.
    fn apply(&self, ctx: &mut ApplyContext) -> Result<ApplyResult>;

    /// Whether an apply error is recorded instead of aborting the run
    fn ignore_failure(&self) -> bool {
        self.common().ignore_failure
    }

    /// What this resource would like downloaded ahead of time
    ///
    /// Only consulted for unguarded resources, see [`prefetch_request`].
    fn prefetch(&self) -> Option<DownloadRequest> {
        None
    }
}

impl<R: Resource + ?Sized> Resource for Box<R> {
    fn id(&self) -> ResourceId {
        (**self).id()
    }

    fn description(&self) -> String {
        (**self).description()
    }

    fn common(&self) -> &CommonProperties {
        (**self).common()
    }

    fn common_mut(&mut self) -> &mut CommonProperties {
        (**self).common_mut()
    }

    fn apply(&self, ctx: &mut ApplyContext) -> Result<ApplyResult> {
        (**self).apply(ctx)
    }

    fn ignore_failure(&self) -> bool {
        (**self).ignore_failure()
    }

    fn prefetch(&self) -> Option<DownloadRequest> {
        (**self).prefetch()
    }
}

/// Type alias for boxed resources
pub type BoxedResource = Box<dyn Resource>;

/// The prefetch request for `resource`, if it is eligible.
///
/// A guarded resource might never run, so it is never prefetched; it
/// downloads for itself if its guards let it through.
pub fn prefetch_request<R: Resource + ?Sized>(resource: &R) -> Option<DownloadRequest> {
    if resource.common().has_guards() {
        return None;
    }
    resource.prefetch()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Fetcher {
        common: CommonProperties,
    }

    impl Resource for Fetcher {
        fn id(&self) -> ResourceId {
            ResourceId::new("remote_file", "/tmp/x")
        }

        fn common(&self) -> &CommonProperties {
            &self.common
        }

        fn common_mut(&mut self) -> &mut CommonProperties {
            &mut self.common
        }

        fn apply(&self, _ctx: &mut ApplyContext) -> Result<ApplyResult> {
            Ok(ApplyResult::updated("create"))
        }

        fn prefetch(&self) -> Option<DownloadRequest> {
            Some(DownloadRequest::new(
                self.id().to_string(),
                "https://example.com/x",
                "/tmp/x",
            ))
        }
    }

    #[test]
    fn test_id_display_and_parse() {
        let id = ResourceId::new("execute", "reload nginx");
        assert_eq!(id.to_string(), "execute[reload nginx]");
        assert_eq!(ResourceId::parse("execute[reload nginx]"), Some(id));
    }

    #[test]
    fn test_id_parse_keeps_inner_brackets() {
        let id = ResourceId::parse("file[/tmp/a[1]]").unwrap();
        assert_eq!(id.type_name, "file");
        assert_eq!(id.name, "/tmp/a[1]");
    }

    #[test]
    fn test_id_parse_rejects_malformed() {
        assert!(ResourceId::parse("file").is_none());
        assert!(ResourceId::parse("file[]").is_none());
        assert!(ResourceId::parse("[x]").is_none());
        assert!(ResourceId::parse("file[x").is_none());
        assert!("file".parse::<ResourceId>().is_err());
    }

    #[test]
    fn test_guard_from_fn() {
        let guard = Guard::from_fn("test -f /nope", || Ok(false));
        assert_eq!(guard.description(), "test -f /nope");
        assert!(!guard.evaluate().unwrap());
        assert!(Guard::constant(true).evaluate().unwrap());
    }

    #[test]
    fn test_common_builders() {
        let common = CommonProperties::new()
            .ignore_failure(true)
            .notifies("reload", "service[nginx]", Timing::Delayed)
            .subscribes("restart", "file[/etc/app.conf]", Timing::Immediate);
        assert!(common.ignore_failure);
        assert_eq!(common.notifications[0].target, "service[nginx]");
        assert_eq!(common.subscriptions[0].timing, Timing::Immediate);
        assert!(!common.has_guards());
    }

    #[test]
    fn test_guarded_resource_is_not_prefetched() {
        let plain = Fetcher {
            common: CommonProperties::new(),
        };
        assert!(prefetch_request(&plain).is_some());

        let guarded = Fetcher {
            common: CommonProperties::new().not_if(Guard::constant(false)),
        };
        assert!(prefetch_request(&guarded).is_none());
    }

    #[test]
    fn test_boxed_resource_delegates() {
        let boxed: BoxedResource = Box::new(Fetcher {
            common: CommonProperties::new().ignore_failure(true),
        });
        assert_eq!(boxed.id().to_string(), "remote_file[/tmp/x]");
        assert!(boxed.ignore_failure());
        assert!(boxed.prefetch().is_some());
    }
}
