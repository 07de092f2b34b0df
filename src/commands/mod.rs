pub mod apply;
pub mod check;

use anyhow::Result;
use declarative::{Resource, RunList};
use prefetch::Downloader;
use prefetch::transport::UreqTransport;
use std::path::Path;
use std::sync::Arc;

use crate::config::SousConfig;
use crate::recipe::{Injections, Recipe};
use crate::resource::{DeclaredResource, Fetcher};
use crate::ui;

/// Downloader configured from `[downloads]`
fn downloader(config: &SousConfig) -> Downloader {
    let transport = match &config.downloads.user_agent {
        Some(agent) => UreqTransport::with_user_agent(agent),
        None => UreqTransport::new(),
    };
    Downloader::new(Arc::new(transport))
}

/// Read a run-list file and declare its resources
fn load_run_list(
    path: &Path,
    config: &SousConfig,
    downloader: &Downloader,
) -> Result<RunList<DeclaredResource>> {
    let injections = Injections {
        package_manager: Some(config.package.manager.clone()),
        fetcher: Some(Fetcher::new(
            downloader.clone(),
            config.downloads.temp_dir()?,
        )),
    };
    let recipe = Recipe::load(path, injections)?;
    let run_list = RunList::from_provider(&recipe)?;

    for id in run_list.duplicate_ids() {
        ui::warn(&format!(
            "{id} is declared more than once; notifications go to the first"
        ));
    }
    log::debug!(
        "Loaded {} resources: {}",
        run_list.len(),
        run_list
            .resources()
            .iter()
            .map(|r| r.id().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(run_list)
}
