//! Package resource - install or remove through a package manager

use anyhow::{Context, Result, bail};
use declarative::{ApplyContext, ApplyResult};
use serde::Deserialize;
use std::fmt;
use std::process::Command;
use std::str::FromStr;

use super::Converge;
use super::support;

/// Package managers sous knows how to drive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Manager {
    Brew,
    Apt,
    Dnf,
    Pacman,
}

impl Manager {
    fn program(self) -> &'static str {
        match self {
            Self::Brew => "brew",
            Self::Apt => "apt-get",
            Self::Dnf => "dnf",
            Self::Pacman => "pacman",
        }
    }

    fn install_args<'a>(self, name: &'a str, cask: bool) -> Vec<&'a str> {
        match self {
            Self::Brew if cask => vec!["install", "--cask", name],
            Self::Brew => vec!["install", "--formula", name],
            Self::Apt | Self::Dnf => vec!["install", "-y", name],
            Self::Pacman => vec!["-S", "--noconfirm", "--needed", name],
        }
    }

    fn remove_args<'a>(self, name: &'a str, cask: bool) -> Vec<&'a str> {
        match self {
            Self::Brew if cask => vec!["uninstall", "--cask", name],
            Self::Brew => vec!["uninstall", "--formula", name],
            Self::Apt | Self::Dnf => vec!["remove", "-y", name],
            Self::Pacman => vec!["-R", "--noconfirm", name],
        }
    }
}

impl FromStr for Manager {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "brew" | "homebrew" => Ok(Self::Brew),
            "apt" | "apt-get" => Ok(Self::Apt),
            "dnf" | "yum" => Ok(Self::Dnf),
            "pacman" => Ok(Self::Pacman),
            other => bail!("Unsupported package manager: {other}"),
        }
    }
}

impl fmt::Display for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.program())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PackageAction {
    #[default]
    Install,
    Remove,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Package {
    pub name: String,
    /// Defaults to `name`
    pub package_name: Option<String>,
    #[serde(default)]
    pub action: PackageAction,
    /// Overrides the configured manager
    pub manager: Option<String>,
    /// Homebrew cask instead of formula
    #[serde(default)]
    pub cask: bool,
}

impl Package {
    pub fn package_name(&self) -> &str {
        self.package_name.as_deref().unwrap_or(&self.name)
    }

    fn manager(&self) -> Result<Manager> {
        self.manager.as_deref().unwrap_or("brew").parse()
    }

    fn is_installed(&self, manager: Manager) -> Result<bool> {
        let name = self.package_name();
        match manager {
            Manager::Brew => {
                let type_flag = if self.cask { "--cask" } else { "--formula" };
                let output = Command::new("brew")
                    .args(["info", "--json=v2", type_flag, name])
                    .output()
                    .context("Failed to run brew info")?;
                if !output.status.success() {
                    return Ok(false);
                }
                let json: serde_json::Value = serde_json::from_slice(&output.stdout)
                    .context("Failed to parse brew info output")?;
                Ok(brew_installed(&json, self.cask))
            }
            Manager::Apt => {
                let output = Command::new("dpkg-query")
                    .args(["-W", "-f=${Status}", name])
                    .output()
                    .context("Failed to run dpkg-query")?;
                Ok(output.status.success()
                    && String::from_utf8_lossy(&output.stdout).contains("install ok installed"))
            }
            Manager::Dnf => Ok(support::succeeds(Command::new("rpm").args(["-q", name]))),
            Manager::Pacman => Ok(support::succeeds(Command::new("pacman").args(["-Q", name]))),
        }
    }
}

/// Whether `brew info --json=v2` output reports an installed package
fn brew_installed(json: &serde_json::Value, cask: bool) -> bool {
    if cask {
        json["casks"]
            .as_array()
            .and_then(|arr| arr.first())
            .and_then(|c| c["installed"].as_str())
            .is_some()
    } else {
        json["formulae"]
            .as_array()
            .and_then(|arr| arr.first())
            .and_then(|f| f["installed"].as_array())
            .is_some_and(|arr| !arr.is_empty())
    }
}

impl Converge for Package {
    fn type_name(&self) -> &'static str {
        "package"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> String {
        let verb = match self.action {
            PackageAction::Install => "Install",
            PackageAction::Remove => "Remove",
        };
        let manager = self.manager.as_deref().unwrap_or("brew");
        format!("{verb} {} via {manager}", self.package_name())
    }

    fn converge(&self, ctx: &mut ApplyContext) -> Result<ApplyResult> {
        let manager = self.manager()?;
        let name = self.package_name();
        let installed = self.is_installed(manager)?;

        let (action, args) = match self.action {
            PackageAction::Install if installed => return Ok(ApplyResult::up_to_date("install")),
            PackageAction::Remove if !installed => return Ok(ApplyResult::up_to_date("remove")),
            PackageAction::Install => ("install", manager.install_args(name, self.cask)),
            PackageAction::Remove => ("remove", manager.remove_args(name, self.cask)),
        };

        if ctx.why_run {
            return Ok(ApplyResult::skipped(
                action,
                format!("would {action} {name} with {manager}"),
            ));
        }

        support::run_checked(
            Command::new(manager.program()).args(&args),
            &format!("{manager} {action} {name}"),
        )?;
        Ok(ApplyResult::updated(action))
    }
}
