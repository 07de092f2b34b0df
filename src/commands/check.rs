//! `sous check` - show a run-list's wiring without applying it

use anyhow::Result;
use colored::Colorize;
use declarative::{Resource, ResourceId, find_resource, prefetch_request};

use crate::Context;
use crate::cli::CheckArgs;
use crate::config::SousConfig;
use crate::resource::DeclaredResource;
use crate::ui;

pub fn run(ctx: &Context, args: CheckArgs) -> Result<()> {
    let config = SousConfig::load()?;
    let downloader = super::downloader(&config);
    let mut run_list = super::load_run_list(&args.run_list, &config, &downloader)?;

    let resolved = run_list.resolve_subscriptions();
    let resources = run_list.resources();
    let dangling = dangling_notifications(resources);

    if ctx.quiet {
        return Ok(());
    }

    ui::header(&format!("Run-list {}", args.run_list.display()));
    for (position, resource) in resources.iter().enumerate() {
        print_resource(position + 1, resource);
    }

    println!();
    ui::kv("resources", &resources.len().to_string());
    ui::kv("subscriptions resolved", &resolved.to_string());
    let prefetched = resources
        .iter()
        .filter(|r| prefetch_request(*r).is_some())
        .count();
    ui::kv("prefetched downloads", &prefetched.to_string());

    for (source, target) in &dangling {
        ui::warn(&format!("{source} notifies {target}, which is not declared"));
    }
    if dangling.is_empty() {
        ui::success("Run-list is well formed");
    }
    Ok(())
}

fn print_resource(position: usize, resource: &DeclaredResource) {
    let common = resource.common();
    println!(
        "{} {} {}",
        format!("{position:>3}.").dimmed(),
        resource.id().to_string().bold(),
        resource.description().dimmed()
    );
    if let Some(guard) = &common.only_if {
        ui::dim(&format!("  only_if {}", guard.description()));
    }
    if let Some(guard) = &common.not_if {
        ui::dim(&format!("  not_if {}", guard.description()));
    }
    if common.ignore_failure {
        ui::dim("  ignore_failure");
    }
    if let Some(request) = prefetch_request(resource) {
        ui::dim(&format!("  prefetch {}", request.url));
    }
    for notification in &common.notifications {
        println!(
            "      {} {} {} {}",
            "↳".cyan(),
            notification.target,
            notification.action,
            format!("({})", notification.timing).dimmed()
        );
    }
}

/// `(source, target)` for every notification whose target is not declared
fn dangling_notifications<R: Resource>(resources: &[R]) -> Vec<(String, String)> {
    let mut dangling = Vec::new();
    for resource in resources {
        for notification in &resource.common().notifications {
            let found = ResourceId::parse(&notification.target)
                .and_then(|id| find_resource(resources, &id))
                .is_some();
            if !found {
                dangling.push((resource.id().to_string(), notification.target.clone()));
            }
        }
    }
    dangling
}
