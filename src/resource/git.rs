//! Git resource - keep a checkout at a revision

use anyhow::{Context, Result, bail};
use declarative::{ApplyContext, ApplyResult};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Command;

use super::Converge;
use super::support;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GitAction {
    /// Clone, then fetch and check out the revision on later runs
    #[default]
    Sync,
    /// Clone only when missing
    Checkout,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Git {
    /// Checkout directory
    pub name: String,
    pub repository: String,
    /// Branch, tag, or commit; the remote's default branch when unset
    pub revision: Option<String>,
    #[serde(default)]
    pub action: GitAction,
}

fn git(dir: &Path) -> Command {
    let mut cmd = Command::new("git");
    cmd.arg("-C").arg(dir);
    cmd
}

fn stdout(cmd: &mut Command, what: &str) -> Result<String> {
    let output = support::run_checked(cmd, what)?;
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

impl Git {
    pub fn path(&self) -> PathBuf {
        crate::paths::expand(&self.name)
    }

    fn head(dir: &Path) -> Result<String> {
        stdout(git(dir).args(["rev-parse", "HEAD"]), "git rev-parse HEAD")
    }

    /// Commit the revision points at, preferring the remote-tracking ref
    fn resolve(&self, dir: &Path) -> Result<String> {
        let candidates = match &self.revision {
            None => vec!["origin/HEAD".to_string()],
            Some(rev) => vec![format!("origin/{rev}"), rev.clone()],
        };
        for candidate in &candidates {
            let output = git(dir)
                .args(["rev-parse", "--verify", "--quiet"])
                .arg(format!("{candidate}^{{commit}}"))
                .output()
                .context("Failed to run git rev-parse")?;
            if output.status.success() {
                return Ok(String::from_utf8_lossy(&output.stdout).trim().to_string());
            }
        }
        bail!(
            "revision {} not found in {}",
            self.revision.as_deref().unwrap_or("HEAD"),
            dir.display()
        )
    }

    fn checkout(dir: &Path, commit: &str) -> Result<()> {
        support::run_checked(
            git(dir).args(["checkout", "--quiet", "--force", commit]),
            &format!("git checkout {commit}"),
        )?;
        Ok(())
    }

    fn clone(&self, dest: &Path) -> Result<()> {
        support::ensure_parent(dest)?;
        support::run_checked(
            Command::new("git")
                .args(["clone", "--quiet", &self.repository])
                .arg(dest),
            &format!("git clone {}", self.repository),
        )?;
        if self.revision.is_some() {
            let commit = self.resolve(dest)?;
            Self::checkout(dest, &commit)?;
        }
        Ok(())
    }
}

impl Converge for Git {
    fn type_name(&self) -> &'static str {
        "git"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> String {
        format!("Checkout {} at {}", self.repository, self.path().display())
    }

    fn converge(&self, ctx: &mut ApplyContext) -> Result<ApplyResult> {
        let dest = self.path();
        let action = match self.action {
            GitAction::Sync => "sync",
            GitAction::Checkout => "checkout",
        };

        if !dest.exists() {
            if ctx.why_run {
                return Ok(ApplyResult::skipped(
                    action,
                    format!("would clone {} to {}", self.repository, dest.display()),
                ));
            }
            self.clone(&dest)?;
            return Ok(ApplyResult::updated(action));
        }

        if !dest.join(".git").exists() {
            bail!("{} exists and is not a git checkout", dest.display());
        }
        if self.action == GitAction::Checkout {
            return Ok(ApplyResult::up_to_date(action));
        }

        if !ctx.why_run {
            support::run_checked(
                git(&dest).args(["fetch", "--quiet", "--tags", "origin"]),
                "git fetch",
            )?;
        }
        let current = Self::head(&dest)?;
        let wanted = self.resolve(&dest)?;
        if current == wanted {
            return Ok(ApplyResult::up_to_date(action));
        }
        if ctx.why_run {
            return Ok(ApplyResult::skipped(
                action,
                format!("would move {} to {}", dest.display(), &wanted[..wanted.len().min(12)]),
            ));
        }

        log::debug!("Moving {} from {current} to {wanted}", dest.display());
        Self::checkout(&dest, &wanted)?;
        Ok(ApplyResult::updated(action))
    }
}
