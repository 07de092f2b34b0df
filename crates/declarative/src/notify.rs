//! Notification routing
//!
//! Subscriptions are folded into the notifications of the resource they
//! watch before anything runs. Updated resources then enqueue their
//! notifications, and after the run-list every queued notification is
//! delivered: the immediate queue first, then the delayed one, each in the
//! order it was emitted.
//!
//! Targets are looked up by id with a linear scan. The first declared match
//! wins.

use crate::context::Reporter;
use crate::resource::{Resource, ResourceId};
use crate::types::{Notification, PendingNotification, RunSummary, Timing};

/// Index of the first resource whose id is `id`
pub fn find_resource<R: Resource>(resources: &[R], id: &ResourceId) -> Option<usize> {
    resources.iter().position(|r| &r.id() == id)
}

/// Rewrite every subscription as a notification on its source.
///
/// For a resource S subscribing to `type[name]` with action A and timing T,
/// the first resource with that id gains a notification targeting S with A
/// and T. Subscriptions naming undeclared or malformed ids are dropped, with
/// only a debug log. Appended notifications follow subscriber declaration order.
///
/// Returns how many subscriptions were resolved.
pub fn resolve_subscriptions<R: Resource>(resources: &mut [R]) -> usize {
    let mut resolved: Vec<(usize, Notification)> = Vec::new();

    for subscriber in resources.iter() {
        let subscriber_id = subscriber.id().to_string();
        for subscription in &subscriber.common().subscriptions {
            let source = ResourceId::parse(&subscription.target)
                .and_then(|id| find_resource(resources, &id));
            match source {
                Some(index) => resolved.push((
                    index,
                    Notification::new(
                        subscriber_id.clone(),
                        subscription.action.clone(),
                        subscription.timing,
                    ),
                )),
                None => log::debug!(
                    "{subscriber_id} subscribes to {}, which is not declared",
                    subscription.target
                ),
            }
        }
    }

    let count = resolved.len();
    for (index, notification) in resolved {
        log::debug!(
            "{} will notify {} to {}",
            resources[index].id(),
            notification.target,
            notification.action
        );
        resources[index].common_mut().notifications.push(notification);
    }
    count
}

/// Notifications waiting for delivery, split by timing
#[derive(Debug, Default)]
pub struct NotificationQueue {
    immediate: Vec<PendingNotification>,
    delayed: Vec<PendingNotification>,
}

impl NotificationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue everything `source` emits, keeping its declaration order
    pub fn enqueue(&mut self, source: &ResourceId, notifications: &[Notification]) {
        for notification in notifications {
            let pending = PendingNotification {
                source: source.to_string(),
                notification: notification.clone(),
            };
            match notification.timing {
                Timing::Immediate => self.immediate.push(pending),
                Timing::Delayed => self.delayed.push(pending),
            }
        }
    }

    pub fn len(&self) -> usize {
        self.immediate.len() + self.delayed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Everything queued, immediate before delayed
    pub fn into_ordered(self) -> impl Iterator<Item = PendingNotification> {
        self.immediate.into_iter().chain(self.delayed)
    }
}

/// Deliver every queued notification.
///
/// Delivery resolves the target and reports it; the target's action is not
/// dispatched. Unresolvable targets are reported as missing and recorded in
/// the summary rather than failing the run.
pub fn deliver<R: Resource>(
    queue: NotificationQueue,
    resources: &[R],
    reporter: &dyn Reporter,
    summary: &mut RunSummary,
) {
    for pending in queue.into_ordered() {
        let target = ResourceId::parse(&pending.notification.target)
            .filter(|id| find_resource(resources, id).is_some());

        match target {
            Some(target) => {
                log::info!(
                    "{} notified {target} to {} ({})",
                    pending.source,
                    pending.notification.action,
                    pending.notification.timing
                );
                reporter.on_notification(
                    &pending.source,
                    &target,
                    &pending.notification.action,
                    pending.notification.timing,
                );
                summary.delivered.push(pending);
            }
            None => {
                log::warn!(
                    "{} notifies {}, which is not declared",
                    pending.source,
                    pending.notification.target
                );
                reporter.on_notification_missing(
                    &pending.source,
                    &pending.notification.target,
                    &pending.notification.action,
                );
                summary.missing_targets.push(pending);
            }
        }
    }
}
