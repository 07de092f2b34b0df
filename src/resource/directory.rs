//! Directory resource

use anyhow::{Context, Result, bail};
use declarative::{ApplyContext, ApplyResult};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

use super::Converge;
use super::support::{self, deserialize_mode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DirectoryAction {
    #[default]
    Create,
    Delete,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Directory {
    pub name: String,
    pub path: Option<String>,
    #[serde(default)]
    pub action: DirectoryAction,
    #[serde(default, deserialize_with = "deserialize_mode")]
    pub mode: Option<u32>,
    /// Create missing parents, or delete contents
    #[serde(default = "default_recursive")]
    pub recursive: bool,
}

fn default_recursive() -> bool {
    true
}

impl Directory {
    pub fn path(&self) -> PathBuf {
        crate::paths::expand(self.path.as_deref().unwrap_or(&self.name))
    }

    fn create(&self, ctx: &ApplyContext) -> Result<ApplyResult> {
        let path = self.path();
        if path.exists() && !path.is_dir() {
            bail!("{} exists and is not a directory", path.display());
        }

        let missing = !path.exists();
        if !missing && !support::mode_differs(&path, self.mode) {
            return Ok(ApplyResult::up_to_date("create"));
        }
        if ctx.why_run {
            let what = if missing { "create" } else { "change mode of" };
            return Ok(ApplyResult::skipped(
                "create",
                format!("would {what} {}", path.display()),
            ));
        }

        if missing {
            let created = if self.recursive {
                fs::create_dir_all(&path)
            } else {
                fs::create_dir(&path)
            };
            created.with_context(|| format!("Failed to create {}", path.display()))?;
        }
        support::set_mode(&path, self.mode)?;
        Ok(ApplyResult::updated("create"))
    }

    fn delete(&self, ctx: &ApplyContext) -> Result<ApplyResult> {
        let path = self.path();
        if !path.exists() {
            return Ok(ApplyResult::up_to_date("delete"));
        }
        if !path.is_dir() {
            bail!("{} is not a directory", path.display());
        }
        if ctx.why_run {
            return Ok(ApplyResult::skipped(
                "delete",
                format!("would delete {}", path.display()),
            ));
        }

        let removed = if self.recursive {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_dir(&path)
        };
        removed.with_context(|| format!("Failed to delete {}", path.display()))?;
        Ok(ApplyResult::updated("delete"))
    }
}

impl Converge for Directory {
    fn type_name(&self) -> &'static str {
        "directory"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> String {
        format!("Directory {}", self.path().display())
    }

    fn converge(&self, ctx: &mut ApplyContext) -> Result<ApplyResult> {
        match self.action {
            DirectoryAction::Create => self.create(ctx),
            DirectoryAction::Delete => self.delete(ctx),
        }
    }
}
