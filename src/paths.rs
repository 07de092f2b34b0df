//! Path resolution for sous
//!
//! # Environment Variables
//!
//! - `SOUS_CONFIG_DIR` - Override config directory (e.g., `~/dotfiles/sous`)
//! - `SOUS_STATE_DIR` - Override state directory (staged downloads live here)
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `SOUS_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/sous` (if set)
//! 3. Platform default:
//!    - Windows: `%APPDATA%\sous`
//!    - macOS/Linux: `~/.config/sous`
//!
//! For state_dir():
//! 1. `SOUS_STATE_DIR` environment variable
//! 2. `XDG_STATE_HOME/sous` (if set)
//! 3. Platform default:
//!    - Windows: `%LOCALAPPDATA%\sous`
//!    - macOS/Linux: `~/.local/state/sous`

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "SOUS_CONFIG_DIR";

/// Environment variable for state directory override
pub const ENV_STATE_DIR: &str = "SOUS_STATE_DIR";

const APP_DIR: &str = "sous";

/// Get the sous config directory path
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!("Using config dir from {ENV_CONFIG_DIR}: {}", path.display());
        return Ok(path);
    }

    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join(APP_DIR);
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    #[cfg(windows)]
    {
        if let Some(app_data) = dirs::config_dir() {
            return Ok(app_data.join(APP_DIR));
        }
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join(APP_DIR))
}

/// Get the sous state directory path
pub fn state_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_STATE_DIR) {
        let path = expand(&dir);
        log::debug!("Using state dir from {ENV_STATE_DIR}: {}", path.display());
        return Ok(path);
    }

    if let Ok(xdg_state) = std::env::var("XDG_STATE_HOME") {
        let path = PathBuf::from(xdg_state).join(APP_DIR);
        log::debug!("Using XDG_STATE_HOME: {}", path.display());
        return Ok(path);
    }

    #[cfg(windows)]
    {
        if let Some(local_app_data) = dirs::data_local_dir() {
            return Ok(local_app_data.join(APP_DIR));
        }
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".local").join("state").join(APP_DIR))
}

/// Default staging directory for prefetched artifacts
pub fn downloads_dir() -> Result<PathBuf> {
    Ok(state_dir()?.join("downloads"))
}

/// Expand ~ and environment variables in a path string.
///
/// Unknown variables are left as written.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}
