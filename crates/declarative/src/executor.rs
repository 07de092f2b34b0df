//! Execution engine - applies a run-list in order, then delivers notifications
//!
//! Resources are applied one at a time in declaration order. Remote artifacts
//! are fetched ahead of time by a [`DownloadManager`]; when the executor
//! reaches a resource with a prefetch task it waits for that task, bounded
//! by [`ExecuteOptions::wait_ceiling`], before calling `apply`.

use crate::builder::RunList;
use crate::context::{ApplyContext, Reporter};
use crate::error::{Result, RunError};
use crate::notify::{NotificationQueue, deliver};
use crate::resource::{Resource, prefetch_request};
use crate::types::{ExecuteOptions, ResourceOutcome, RunSummary, UP_TO_DATE};
use prefetch::{DownloadManager, DownloadTask, TaskStatus};
use std::collections::HashMap;
use std::sync::Arc;

/// Apply every resource in `run_list` and deliver the notifications they emit.
///
/// When `downloads` is given and this is not a why-run, every eligible
/// resource gets a prefetch task (unless the caller already queued one under
/// its id) and the pool is started. Workers are joined before this returns,
/// whether the run succeeded or not.
///
/// Stops at the first guard error, download failure, or apply error on a
/// resource that does not ignore failures. Later resources are not applied
/// and no notifications are delivered.
pub fn run<R: Resource>(
    run_list: &mut RunList<R>,
    downloads: Option<&mut DownloadManager>,
    options: &ExecuteOptions,
    reporter: &dyn Reporter,
) -> Result<RunSummary> {
    run_list.resolve_subscriptions();
    let resources = run_list.resources();

    let mut prefetch = Prefetch::new(downloads);
    if !options.why_run {
        prefetch.start(resources)?;
    }

    reporter.on_run_start(resources.len());
    let mut summary = RunSummary::default();
    let mut queue = NotificationQueue::new();

    for (index, resource) in resources.iter().enumerate() {
        let id = resource.id();
        reporter.on_resource_start(&id, &resource.description());

        if let Some(reason) = guard_skip_reason(resource)? {
            log::debug!("{id}: {reason}");
            reporter.on_resource_skipped(&id, &reason);
            summary.record(id.to_string(), ResourceOutcome::Skipped { reason });
            continue;
        }

        let task = match prefetch.wait(index, options, reporter) {
            Ok(task) => task,
            Err(err) => {
                if let RunError::DownloadFailed { message, .. } = &err {
                    reporter.on_resource_failed(&id, message, false);
                }
                return Err(err);
            }
        };
        let mut ctx = ApplyContext::new(options.why_run);
        ctx.prefetched = task.as_deref();

        let result = match resource.apply(&mut ctx) {
            Ok(result) => result,
            Err(err) if resource.ignore_failure() => {
                let message = format!("{err:#}");
                log::warn!("{id} failed (ignored): {message}");
                reporter.on_resource_failed(&id, &message, true);
                summary.record(id.to_string(), ResourceOutcome::Failed { error: message });
                continue;
            }
            Err(err) => {
                reporter.on_resource_failed(&id, &format!("{err:#}"), false);
                return Err(RunError::Apply {
                    resource: id.to_string(),
                    source: err,
                });
            }
        };

        if !result.was_updated {
            let reason = result
                .skip_reason
                .clone()
                .unwrap_or_else(|| UP_TO_DATE.to_string());
            reporter.on_resource_skipped(&id, &reason);
            summary.record(id.to_string(), ResourceOutcome::Skipped { reason });
        } else if result.is_up_to_date() {
            reporter.on_resource_skipped(&id, UP_TO_DATE);
            summary.record(id.to_string(), ResourceOutcome::UpToDate);
        } else {
            log::info!("{id}: {}", result.action);
            reporter.on_resource_updated(&id, &result);
            queue.enqueue(&id, &resource.common().notifications);
            summary.record(
                id.to_string(),
                ResourceOutcome::Updated {
                    action: result.action,
                },
            );
        }
    }

    prefetch.finish();

    log::debug!("delivering {} notifications", queue.len());
    deliver(queue, resources, reporter, &mut summary);
    reporter.on_run_complete(&summary);
    Ok(summary)
}

/// Why the guards keep `resource` from running, if they do
fn guard_skip_reason<R: Resource>(resource: &R) -> Result<Option<String>> {
    let common = resource.common();
    let guard_error = |source| RunError::Guard {
        resource: resource.id().to_string(),
        source,
    };

    if let Some(guard) = &common.only_if {
        if !guard.evaluate().map_err(guard_error)? {
            log::trace!("only_if {} was false", guard.description());
            return Ok(Some("skipped due to only_if".to_string()));
        }
    }
    if let Some(guard) = &common.not_if {
        if guard.evaluate().map_err(guard_error)? {
            log::trace!("not_if {} was true", guard.description());
            return Ok(Some("skipped due to not_if".to_string()));
        }
    }
    Ok(None)
}

/// The run's handle on the download pool
///
/// Dropping it cancels and joins the pool, so early returns never leave
/// workers running.
struct Prefetch<'m> {
    manager: Option<&'m mut DownloadManager>,
    tasks: HashMap<usize, usize>,
}

impl<'m> Prefetch<'m> {
    fn new(manager: Option<&'m mut DownloadManager>) -> Self {
        Self {
            manager,
            tasks: HashMap::new(),
        }
    }

    /// Queue a task per eligible resource and start the pool
    fn start<R: Resource>(&mut self, resources: &[R]) -> Result<()> {
        let Some(manager) = self.manager.as_deref_mut() else {
            return Ok(());
        };

        for (index, resource) in resources.iter().enumerate() {
            let Some(request) = prefetch_request(resource) else {
                continue;
            };
            let task = manager
                .find_task(&request.resource_id)
                .unwrap_or_else(|| manager.add_task(request));
            self.tasks.insert(index, task);
        }

        if !self.tasks.is_empty() {
            let workers = manager.start_all()?;
            log::debug!(
                "prefetching {} artifacts with {workers} workers",
                self.tasks.len()
            );
        }
        Ok(())
    }

    /// Wait for the task belonging to resource `index`, if there is one
    fn wait(
        &self,
        index: usize,
        options: &ExecuteOptions,
        reporter: &dyn Reporter,
    ) -> Result<Option<Arc<DownloadTask>>> {
        let (Some(manager), Some(&task_index)) = (self.manager.as_deref(), self.tasks.get(&index))
        else {
            return Ok(None);
        };
        let Some(task) = manager.task(task_index) else {
            return Ok(None);
        };

        let status = manager.wait_for(task_index, options.wait_ceiling, &mut || reporter.refresh());
        if status == Some(TaskStatus::Failed) {
            let message = task
                .error_message()
                .unwrap_or("download failed")
                .to_string();
            return Err(RunError::DownloadFailed {
                resource: task.resource_id.clone(),
                message,
            });
        }
        Ok(Some(task))
    }

    /// Join the pool after a completed run
    fn finish(mut self) {
        if let Some(manager) = self.manager.take() {
            manager.join();
        }
    }
}

impl Drop for Prefetch<'_> {
    fn drop(&mut self) {
        if let Some(manager) = self.manager.take() {
            manager.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{DeclarationProvider, RunListBuilder};
    use crate::context::{RecordingReporter, ReportEvent};
    use crate::resource::{CommonProperties, Guard, ResourceId};
    use crate::types::{ApplyResult, Timing};
    use prefetch::transport::{MockRoute, MockTransport};
    use prefetch::{DownloadRequest, Downloader, ManagerConfig};
    use std::sync::Mutex;
    use std::time::Duration;

    type Log = Arc<Mutex<Vec<String>>>;

    #[derive(Debug, Clone, Copy)]
    enum Behaviour {
        Update,
        NoChange,
        UpdatedButUpToDate,
        Fail,
    }

    #[derive(Debug)]
    struct Step {
        id: ResourceId,
        behaviour: Behaviour,
        common: CommonProperties,
        log: Log,
        download: Option<String>,
    }

    impl Step {
        fn new(id: &str, behaviour: Behaviour, log: &Log) -> Self {
            Self {
                id: ResourceId::parse(id).unwrap(),
                behaviour,
                common: CommonProperties::new(),
                log: Arc::clone(log),
                download: None,
            }
        }

        fn with(mut self, common: CommonProperties) -> Self {
            self.common = common;
            self
        }

        fn downloading(mut self, url: &str) -> Self {
            self.download = Some(url.to_string());
            self
        }
    }

    impl Resource for Step {
        fn id(&self) -> ResourceId {
            self.id.clone()
        }

        fn common(&self) -> &CommonProperties {
            &self.common
        }

        fn common_mut(&mut self) -> &mut CommonProperties {
            &mut self.common
        }

        fn apply(&self, ctx: &mut ApplyContext) -> anyhow::Result<ApplyResult> {
            let mut entry = self.id.to_string();
            if let Some(path) = ctx.staged_artifact() {
                entry.push_str(&format!(" <- {}", std::fs::read_to_string(path)?));
            }
            self.log.lock().unwrap().push(entry);
            match self.behaviour {
                Behaviour::Update => Ok(ApplyResult::updated("run")),
                Behaviour::NoChange => Ok(ApplyResult::skipped("run", "nothing to do")),
                Behaviour::UpdatedButUpToDate => Ok(ApplyResult {
                    was_updated: true,
                    action: "run".into(),
                    skip_reason: Some(UP_TO_DATE.into()),
                }),
                Behaviour::Fail => anyhow::bail!("exit status 1"),
            }
        }

        fn prefetch(&self) -> Option<DownloadRequest> {
            let url = self.download.as_ref()?;
            Some(DownloadRequest::new(
                self.id.to_string(),
                url.clone(),
                format!("/srv/{}", self.id.name),
            ))
        }
    }

    fn log() -> Log {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn applied(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    fn run_steps(steps: Vec<Step>, reporter: &RecordingReporter) -> Result<RunSummary> {
        let mut list = RunList::new(steps);
        run(&mut list, None, &ExecuteOptions::default(), reporter)
    }

    fn manager(transport: &MockTransport, temp: &std::path::Path) -> DownloadManager {
        DownloadManager::new(
            Downloader::new(Arc::new(transport.clone())),
            ManagerConfig {
                max_concurrency: 2,
                temp_dir: temp.to_path_buf(),
            },
        )
    }

    #[test]
    fn test_applies_in_declaration_order() {
        let log = log();
        let reporter = RecordingReporter::new();
        let summary = run_steps(
            vec![
                Step::new("file[c]", Behaviour::Update, &log),
                Step::new("file[a]", Behaviour::NoChange, &log),
                Step::new("file[b]", Behaviour::Update, &log),
            ],
            &reporter,
        )
        .unwrap();

        assert_eq!(applied(&log), ["file[c]", "file[a]", "file[b]"]);
        assert_eq!(summary.updated, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(
            summary.outcome("file[a]"),
            Some(&ResourceOutcome::Skipped {
                reason: "nothing to do".into()
            })
        );
    }

    #[test]
    fn test_unignored_failure_stops_the_run() {
        let log = log();
        let reporter = RecordingReporter::new();
        let err = run_steps(
            vec![
                Step::new("file[a]", Behaviour::Update, &log)
                    .with(CommonProperties::new().notifies("run", "execute[z]", Timing::Delayed)),
                Step::new("execute[b]", Behaviour::Fail, &log),
                Step::new("execute[c]", Behaviour::Update, &log),
                Step::new("execute[z]", Behaviour::Update, &log),
            ],
            &reporter,
        )
        .unwrap_err();

        assert!(matches!(err, RunError::Apply { ref resource, .. } if resource == "execute[b]"));
        assert_eq!(applied(&log), ["file[a]", "execute[b]"]);
        assert!(reporter.notifications().is_empty());
        assert!(reporter
            .events()
            .contains(&ReportEvent::Failed("execute[b]".into(), false)));
    }

    #[test]
    fn test_ignored_failure_continues() {
        let log = log();
        let reporter = RecordingReporter::new();
        let summary = run_steps(
            vec![
                Step::new("execute[b]", Behaviour::Fail, &log)
                    .with(CommonProperties::new().ignore_failure(true)),
                Step::new("execute[c]", Behaviour::Update, &log),
            ],
            &reporter,
        )
        .unwrap();

        assert_eq!(applied(&log), ["execute[b]", "execute[c]"]);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.updated, 1);
        assert!(matches!(
            summary.outcome("execute[b]"),
            Some(ResourceOutcome::Failed { error }) if error == "exit status 1"
        ));
    }

    #[test]
    fn test_guards_skip_without_notifications() {
        let log = log();
        let reporter = RecordingReporter::new();
        let summary = run_steps(
            vec![
                Step::new("file[a]", Behaviour::Update, &log).with(
                    CommonProperties::new()
                        .only_if(Guard::constant(false))
                        .notifies("run", "execute[z]", Timing::Immediate),
                ),
                Step::new("file[b]", Behaviour::Update, &log).with(
                    CommonProperties::new()
                        .not_if(Guard::constant(true))
                        .notifies("run", "execute[z]", Timing::Delayed),
                ),
                Step::new("execute[z]", Behaviour::NoChange, &log),
            ],
            &reporter,
        )
        .unwrap();

        assert_eq!(applied(&log), ["execute[z]"]);
        assert_eq!(
            summary.outcome("file[a]"),
            Some(&ResourceOutcome::Skipped {
                reason: "skipped due to only_if".into()
            })
        );
        assert_eq!(
            summary.outcome("file[b]"),
            Some(&ResourceOutcome::Skipped {
                reason: "skipped due to not_if".into()
            })
        );
        assert!(summary.delivered.is_empty());
    }

    #[test]
    fn test_passing_guards_apply() {
        let log = log();
        let reporter = RecordingReporter::new();
        run_steps(
            vec![Step::new("file[a]", Behaviour::Update, &log).with(
                CommonProperties::new()
                    .only_if(Guard::constant(true))
                    .not_if(Guard::constant(false)),
            )],
            &reporter,
        )
        .unwrap();
        assert_eq!(applied(&log), ["file[a]"]);
    }

    #[test]
    fn test_guard_error_is_fatal() {
        let log = log();
        let reporter = RecordingReporter::new();
        let err = run_steps(
            vec![
                Step::new("file[a]", Behaviour::Update, &log).with(
                    CommonProperties::new()
                        .ignore_failure(true)
                        .only_if(Guard::from_fn("broken", || anyhow::bail!("no shell"))),
                ),
                Step::new("file[b]", Behaviour::Update, &log),
            ],
            &reporter,
        )
        .unwrap_err();

        assert!(matches!(err, RunError::Guard { .. }));
        assert!(applied(&log).is_empty());
    }

    #[test]
    fn test_up_to_date_sentinel_suppresses_notifications() {
        let log = log();
        let reporter = RecordingReporter::new();
        let summary = run_steps(
            vec![
                Step::new("file[a]", Behaviour::UpdatedButUpToDate, &log).with(
                    CommonProperties::new().notifies("run", "execute[b]", Timing::Immediate),
                ),
                Step::new("execute[b]", Behaviour::NoChange, &log),
            ],
            &reporter,
        )
        .unwrap();

        assert_eq!(summary.up_to_date, 1);
        assert_eq!(summary.outcome("file[a]"), Some(&ResourceOutcome::UpToDate));
        assert!(reporter.notifications().is_empty());
    }

    #[test]
    fn test_no_change_emits_nothing() {
        let log = log();
        let reporter = RecordingReporter::new();
        let summary = run_steps(
            vec![
                Step::new("file[a]", Behaviour::NoChange, &log)
                    .with(CommonProperties::new().notifies("run", "execute[b]", Timing::Delayed)),
                Step::new("execute[b]", Behaviour::NoChange, &log),
            ],
            &reporter,
        )
        .unwrap();
        assert!(summary.delivered.is_empty());
    }

    #[test]
    fn test_delayed_subscription_delivered_after_immediates() {
        let log = log();
        let reporter = RecordingReporter::new();
        let summary = run_steps(
            vec![
                Step::new("file[A]", Behaviour::Update, &log).with(
                    CommonProperties::new().notifies("run", "execute[C]", Timing::Immediate),
                ),
                Step::new("execute[B]", Behaviour::NoChange, &log).with(
                    CommonProperties::new().subscribes("reload", "file[A]", Timing::Delayed),
                ),
                Step::new("execute[C]", Behaviour::Update, &log).with(
                    CommonProperties::new().notifies("run", "execute[B]", Timing::Immediate),
                ),
            ],
            &reporter,
        )
        .unwrap();

        assert_eq!(
            reporter.notifications(),
            vec![
                ("file[A]".into(), "execute[C]".into(), "run".into()),
                ("execute[C]".into(), "execute[B]".into(), "run".into()),
                ("file[A]".into(), "execute[B]".into(), "reload".into()),
            ]
        );
        let reloads: Vec<_> = summary
            .delivered
            .iter()
            .filter(|p| p.notification.action == "reload")
            .collect();
        assert_eq!(reloads.len(), 1);
        assert_eq!(reloads[0].source, "file[A]");
        assert_eq!(reloads[0].notification.timing, Timing::Delayed);
    }

    #[test]
    fn test_file_and_execute_scenario() {
        struct Recipe(Log);

        impl DeclarationProvider<Step> for Recipe {
            fn declare(&self, builder: &mut RunListBuilder<Step>) -> anyhow::Result<()> {
                builder.add(Step::new("file[A]", Behaviour::Update, &self.0));
                builder.add(
                    Step::new("execute[B]", Behaviour::NoChange, &self.0).with(
                        CommonProperties::new().subscribes("reload", "file[A]", Timing::Delayed),
                    ),
                );
                Ok(())
            }
        }

        let log = log();
        let reporter = RecordingReporter::new();
        let mut list = RunList::from_provider(&Recipe(Arc::clone(&log))).unwrap();
        let summary = run(&mut list, None, &ExecuteOptions::default(), &reporter).unwrap();

        assert_eq!(summary.delivered.len(), 1);
        assert_eq!(
            reporter.events().last(),
            Some(&ReportEvent::Notified {
                source: "file[A]".into(),
                target: "execute[B]".into(),
                action: "reload".into(),
                timing: Timing::Delayed,
            })
        );
    }

    #[test]
    fn test_second_run_delivers_subscription_once() {
        let log = log();
        let mut list = RunList::new(vec![
            Step::new("file[A]", Behaviour::Update, &log),
            Step::new("execute[B]", Behaviour::NoChange, &log).with(
                CommonProperties::new().subscribes("reload", "file[A]", Timing::Delayed),
            ),
        ]);

        for _ in 0..2 {
            let summary = run(
                &mut list,
                None,
                &ExecuteOptions::default(),
                &RecordingReporter::new(),
            )
            .unwrap();
            assert_eq!(summary.delivered.len(), 1);
        }
        assert_eq!(list.resources()[0].common().notifications.len(), 1);
    }

    #[test]
    fn test_missing_notification_target_is_not_fatal() {
        let log = log();
        let reporter = RecordingReporter::new();
        let summary = run_steps(
            vec![Step::new("file[a]", Behaviour::Update, &log).with(
                CommonProperties::new().notifies("restart", "service[ghost]", Timing::Delayed),
            )],
            &reporter,
        )
        .unwrap();
        assert_eq!(summary.missing_targets.len(), 1);
        assert!(reporter
            .events()
            .contains(&ReportEvent::Missing("service[ghost]".into())));
    }

    #[test]
    fn test_prefetched_artifact_reaches_apply() {
        let temp = tempfile::tempdir().unwrap();
        let transport = MockTransport::new();
        transport.add_route("https://example.com/a", MockRoute::new(b"alpha".to_vec()));
        transport.add_route("https://example.com/b", MockRoute::new(b"beta".to_vec()));
        let mut downloads = manager(&transport, temp.path());

        let log = log();
        let mut list = RunList::new(vec![
            Step::new("remote_file[a]", Behaviour::Update, &log).downloading("https://example.com/a"),
            Step::new("file[plain]", Behaviour::Update, &log),
            Step::new("remote_file[b]", Behaviour::Update, &log).downloading("https://example.com/b"),
        ]);
        run(
            &mut list,
            Some(&mut downloads),
            &ExecuteOptions::default(),
            &RecordingReporter::new(),
        )
        .unwrap();

        assert_eq!(
            applied(&log),
            ["remote_file[a] <- alpha", "file[plain]", "remote_file[b] <- beta"]
        );
        assert_eq!(downloads.completed(), 2);
        assert!(!downloads.is_started());
    }

    #[test]
    fn test_guarded_resource_is_not_prefetched() {
        let temp = tempfile::tempdir().unwrap();
        let transport = MockTransport::new();
        transport.add_route("https://example.com/a", MockRoute::new(b"alpha".to_vec()));
        let mut downloads = manager(&transport, temp.path());

        let log = log();
        let mut list = RunList::new(vec![
            Step::new("remote_file[a]", Behaviour::Update, &log)
                .downloading("https://example.com/a")
                .with(CommonProperties::new().only_if(Guard::constant(false))),
        ]);
        run(
            &mut list,
            Some(&mut downloads),
            &ExecuteOptions::default(),
            &RecordingReporter::new(),
        )
        .unwrap();

        assert!(downloads.is_empty());
        assert_eq!(transport.request_count("https://example.com/a"), 0);
    }

    #[test]
    fn test_failed_download_is_fatal_even_when_ignored() {
        let temp = tempfile::tempdir().unwrap();
        let transport = MockTransport::new();
        let mut downloads = manager(&transport, temp.path());

        let log = log();
        let mut list = RunList::new(vec![
            Step::new("file[first]", Behaviour::Update, &log),
            Step::new("remote_file[gone]", Behaviour::Update, &log)
                .downloading("https://example.com/missing")
                .with(CommonProperties::new().ignore_failure(true)),
            Step::new("file[after]", Behaviour::Update, &log),
        ]);
        let reporter = RecordingReporter::new();
        let err = run(
            &mut list,
            Some(&mut downloads),
            &ExecuteOptions::default(),
            &reporter,
        )
        .unwrap_err();

        assert!(matches!(
            err,
            RunError::DownloadFailed { ref resource, .. } if resource == "remote_file[gone]"
        ));
        assert!(reporter
            .events()
            .contains(&ReportEvent::Failed("remote_file[gone]".into(), false)));
        assert_eq!(applied(&log), ["file[first]"]);
        assert!(!downloads.is_started());
        assert_eq!(downloads.completed() + downloads.failed(), downloads.len());
    }

    #[test]
    fn test_error_path_joins_pending_downloads() {
        let temp = tempfile::tempdir().unwrap();
        let transport = MockTransport::new();
        transport.add_route(
            "https://example.com/slow",
            MockRoute::new(b"slow".to_vec()).with_delay(Duration::from_millis(200)),
        );
        let mut downloads = manager(&transport, temp.path());

        let log = log();
        let mut list = RunList::new(vec![
            Step::new("execute[boom]", Behaviour::Fail, &log),
            Step::new("remote_file[slow]", Behaviour::Update, &log)
                .downloading("https://example.com/slow"),
        ]);
        assert!(run(
            &mut list,
            Some(&mut downloads),
            &ExecuteOptions::default(),
            &RecordingReporter::new(),
        )
        .is_err());

        assert!(!downloads.is_started());
        let task = downloads.task(0).unwrap();
        assert!(task.status().is_terminal());
    }

    #[test]
    fn test_wait_ceiling_lets_apply_proceed() {
        let temp = tempfile::tempdir().unwrap();
        let transport = MockTransport::new();
        transport.add_route(
            "https://example.com/slow",
            MockRoute::new(b"slow".to_vec()).with_delay(Duration::from_millis(500)),
        );
        let mut downloads = manager(&transport, temp.path());

        let log = log();
        let mut list = RunList::new(vec![
            Step::new("remote_file[slow]", Behaviour::Update, &log)
                .downloading("https://example.com/slow"),
        ]);
        let options = ExecuteOptions {
            wait_ceiling: Duration::from_millis(50),
            ..ExecuteOptions::default()
        };
        run(&mut list, Some(&mut downloads), &options, &RecordingReporter::new()).unwrap();

        assert_eq!(applied(&log), ["remote_file[slow]"]);
        assert!(downloads.task(0).unwrap().status().is_terminal());
    }

    #[test]
    fn test_why_run_does_not_download() {
        let temp = tempfile::tempdir().unwrap();
        let transport = MockTransport::new();
        transport.add_route("https://example.com/a", MockRoute::new(b"alpha".to_vec()));
        let mut downloads = manager(&transport, temp.path());

        let log = log();
        let mut list = RunList::new(vec![
            Step::new("remote_file[a]", Behaviour::Update, &log).downloading("https://example.com/a"),
        ]);
        let options = ExecuteOptions {
            why_run: true,
            ..ExecuteOptions::default()
        };
        run(&mut list, Some(&mut downloads), &options, &RecordingReporter::new()).unwrap();

        assert!(downloads.is_empty());
        assert!(transport.requests().is_empty());
        assert_eq!(applied(&log), ["remote_file[a]"]);
    }
}
