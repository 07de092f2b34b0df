//! File resource - manage a file's content and permissions

use anyhow::{Context, Result, bail};
use declarative::{ApplyContext, ApplyResult};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use super::Converge;
use super::support::{self, DEFAULT_BACKUPS, deserialize_mode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FileAction {
    #[default]
    Create,
    CreateIfMissing,
    Delete,
}

impl FileAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::CreateIfMissing => "create_if_missing",
            Self::Delete => "delete",
        }
    }
}

/// A file with optional managed content
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct File {
    pub name: String,
    /// Defaults to `name`
    pub path: Option<String>,
    #[serde(default)]
    pub action: FileAction,
    /// Left untouched when unset
    pub content: Option<String>,
    #[serde(default, deserialize_with = "deserialize_mode")]
    pub mode: Option<u32>,
    /// Copies kept when the content is replaced
    pub backup: Option<usize>,
}

impl File {
    pub fn path(&self) -> PathBuf {
        crate::paths::expand(self.path.as_deref().unwrap_or(&self.name))
    }
}

impl Converge for File {
    fn type_name(&self) -> &'static str {
        "file"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> String {
        format!("{} file {}", self.action.as_str(), self.path().display())
    }

    fn converge(&self, ctx: &mut ApplyContext) -> Result<ApplyResult> {
        let path = self.path();
        match self.action {
            FileAction::Delete => delete_file(&path, self.backup, ctx),
            FileAction::CreateIfMissing if path.exists() => Ok(ApplyResult::up_to_date(
                self.action.as_str(),
            )),
            FileAction::Create | FileAction::CreateIfMissing => Content {
                path: &path,
                content: self.content.as_deref().map(str::as_bytes),
                mode: self.mode,
                backup: self.backup.unwrap_or(DEFAULT_BACKUPS),
                sensitive: false,
            }
            .converge(self.action.as_str(), ctx),
        }
    }
}

/// Desired state of a file's bytes and mode
///
/// Shared by every kind that ends up writing a file.
pub struct Content<'a> {
    pub path: &'a Path,
    /// `None` only ensures the file exists
    pub content: Option<&'a [u8]>,
    pub mode: Option<u32>,
    pub backup: usize,
    /// Never log or diff the content
    pub sensitive: bool,
}

impl Content<'_> {
    pub fn converge(&self, action: &str, ctx: &ApplyContext) -> Result<ApplyResult> {
        if self.path.is_dir() {
            bail!("{} is a directory", self.path.display());
        }

        let current = if self.path.exists() {
            Some(
                fs::read(self.path)
                    .with_context(|| format!("Failed to read {}", self.path.display()))?,
            )
        } else {
            None
        };

        let rewrite = match (&current, self.content) {
            (None, _) => true,
            (Some(existing), Some(wanted)) => existing.as_slice() != wanted,
            (Some(_), None) => false,
        };
        let chmod = support::mode_differs(self.path, self.mode);

        if !rewrite && !chmod {
            return Ok(ApplyResult::up_to_date(action));
        }

        if ctx.why_run {
            if rewrite && !self.sensitive {
                let old = current
                    .as_deref()
                    .map(String::from_utf8_lossy)
                    .unwrap_or_default();
                let new = String::from_utf8_lossy(self.content.unwrap_or_default());
                support::log_diff(self.path, &old, &new);
            }
            let what = if rewrite { "write" } else { "change mode of" };
            return Ok(ApplyResult::skipped(
                action,
                format!("would {what} {}", self.path.display()),
            ));
        }

        if rewrite {
            support::backup(self.path, self.backup)?;
            support::write_atomic(self.path, self.content.unwrap_or_default())?;
        }
        support::set_mode(self.path, self.mode)?;
        Ok(ApplyResult::updated(action))
    }
}

fn delete_file(path: &Path, backup: Option<usize>, ctx: &ApplyContext) -> Result<ApplyResult> {
    if !path.exists() && !path.is_symlink() {
        return Ok(ApplyResult::up_to_date("delete"));
    }
    if path.is_dir() {
        bail!("{} is a directory", path.display());
    }
    if ctx.why_run {
        return Ok(ApplyResult::skipped(
            "delete",
            format!("would delete {}", path.display()),
        ));
    }
    support::backup(path, backup.unwrap_or(DEFAULT_BACKUPS))?;
    fs::remove_file(path).with_context(|| format!("Failed to delete {}", path.display()))?;
    Ok(ApplyResult::updated("delete"))
}
