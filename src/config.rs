//! User configuration, `<config dir>/config.toml`
//!
//! Every key is optional. A missing file means all defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::paths;

pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SousConfig {
    pub downloads: DownloadsConfig,
    pub package: PackageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadsConfig {
    /// Upper bound on prefetch worker threads
    pub max_concurrency: usize,
    /// Where prefetched artifacts are staged; defaults to `<state dir>/downloads`
    pub temp_dir: Option<String>,
    /// Longest a resource waits for its prefetch, in seconds
    pub wait_ceiling_secs: u64,
    /// User-Agent sent with every download
    pub user_agent: Option<String>,
}

impl Default for DownloadsConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            temp_dir: None,
            wait_ceiling_secs: 30,
            user_agent: None,
        }
    }
}

impl DownloadsConfig {
    pub fn temp_dir(&self) -> Result<PathBuf> {
        match &self.temp_dir {
            Some(dir) => Ok(paths::expand(dir)),
            None => paths::downloads_dir(),
        }
    }

    pub fn wait_ceiling(&self) -> Duration {
        Duration::from_secs(self.wait_ceiling_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageConfig {
    /// Package manager used by `package` resources
    pub manager: String,
}

impl Default for PackageConfig {
    fn default() -> Self {
        Self {
            manager: "brew".to_string(),
        }
    }
}

impl SousConfig {
    /// Load from the config directory, falling back to defaults
    pub fn load() -> Result<Self> {
        let path = paths::config_dir()?.join(CONFIG_FILE);
        Self::load_from(&path)
    }

    /// Load from `path`, falling back to defaults when it does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid config in {}", path.display()))
    }
}
