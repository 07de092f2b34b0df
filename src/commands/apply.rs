//! `sous apply` - converge a run-list

use anyhow::Result;
use declarative::{ExecuteOptions, NoReport, Reporter, RunSummary, prefetch_request};
use prefetch::{DownloadManager, ManagerConfig};
use std::sync::Arc;

use crate::Context;
use crate::cli::ApplyArgs;
use crate::config::SousConfig;
use crate::reporter::ConsoleReporter;
use crate::ui;

pub fn run(ctx: &Context, args: ApplyArgs) -> Result<()> {
    let config = SousConfig::load()?;
    let downloader = super::downloader(&config);
    let mut run_list = super::load_run_list(&args.run_list, &config, &downloader)?;

    let console = (!args.json && !ctx.quiet).then(|| Arc::new(ConsoleReporter::new(args.why_run)));
    let manager_config = ManagerConfig {
        max_concurrency: args.jobs.unwrap_or(config.downloads.max_concurrency).max(1),
        temp_dir: config.downloads.temp_dir()?,
    };
    let mut manager = match &console {
        Some(console) => {
            let sink = Arc::clone(console);
            DownloadManager::with_progress(
                downloader,
                manager_config,
                Arc::new(move |index, downloaded, total| {
                    sink.on_download_progress(index, downloaded, total);
                }),
            )
        }
        None => DownloadManager::new(downloader, manager_config),
    };

    for resource in run_list.resources() {
        if let Some(request) = prefetch_request(resource) {
            let label = request.resource_id.clone();
            let index = manager.add_task(request);
            if let Some(console) = &console {
                console.label_download(index, label);
            }
        }
    }
    log::debug!("Queued {} downloads", manager.len());

    let options = ExecuteOptions {
        why_run: args.why_run,
        wait_ceiling: config.downloads.wait_ceiling(),
    };
    let reporter: &dyn Reporter = match &console {
        Some(console) => &**console,
        None => &NoReport,
    };

    let summary = declarative::run(&mut run_list, Some(&mut manager), &options, reporter)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else if !ctx.quiet {
        println!();
        ui::success(&closing_line(&summary, args.why_run));
    }
    Ok(())
}

fn closing_line(summary: &RunSummary, why_run: bool) -> String {
    let verb = if why_run { "Checked" } else { "Converged" };
    let mut line = format!(
        "{verb} {} resources ({} updated)",
        summary.total(),
        summary.updated
    );
    if summary.failed > 0 {
        line.push_str(&format!(", {} failures ignored", summary.failed));
    }
    line
}
