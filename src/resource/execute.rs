//! Execute resource - run a shell command

use anyhow::{Result, bail};
use declarative::{ApplyContext, ApplyResult};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

use super::Converge;
use super::support;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecuteAction {
    #[default]
    Run,
    /// Only runs when notified
    Nothing,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Execute {
    pub name: String,
    /// Defaults to `name`
    pub command: Option<String>,
    #[serde(default)]
    pub action: ExecuteAction,
    pub cwd: Option<String>,
    /// Skip when this path already exists
    pub creates: Option<String>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

impl Execute {
    pub fn command(&self) -> &str {
        self.command.as_deref().unwrap_or(&self.name)
    }

    fn creates(&self) -> Option<PathBuf> {
        self.creates.as_deref().map(crate::paths::expand)
    }
}

impl Converge for Execute {
    fn type_name(&self) -> &'static str {
        "execute"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> String {
        format!("Run `{}`", self.command())
    }

    fn converge(&self, ctx: &mut ApplyContext) -> Result<ApplyResult> {
        if self.action == ExecuteAction::Nothing {
            return Ok(ApplyResult::skipped("nothing", "runs only when notified"));
        }
        if let Some(creates) = self.creates().filter(|p| p.exists()) {
            return Ok(ApplyResult::skipped(
                "run",
                format!("{} exists", creates.display()),
            ));
        }
        if ctx.why_run {
            return Ok(ApplyResult::skipped(
                "run",
                format!("would run `{}`", self.command()),
            ));
        }

        let mut cmd = support::shell(self.command());
        if let Some(cwd) = &self.cwd {
            let cwd = crate::paths::expand(cwd);
            if !cwd.is_dir() {
                bail!("Working directory {} does not exist", cwd.display());
            }
            cmd.current_dir(cwd);
        }
        cmd.envs(&self.environment);

        let output = support::run_checked(&mut cmd, &format!("`{}`", self.command()))?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            log::debug!("{}: {}", self.name, stdout.trim());
        }
        Ok(ApplyResult::updated("run"))
    }
}
