//! Link resource - symbolic links

use anyhow::{Context, Result, bail};
use declarative::{ApplyContext, ApplyResult};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use super::Converge;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LinkAction {
    #[default]
    Create,
    Delete,
}

/// A symlink at `name` pointing to `to`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Link {
    /// Where the link is created
    pub name: String,
    /// What the link points to
    pub to: String,
    #[serde(default)]
    pub action: LinkAction,
}

#[derive(Debug, PartialEq, Eq)]
enum LinkState {
    Missing,
    Correct,
    WrongTarget(PathBuf),
    FileExists,
}

impl Link {
    fn paths(&self) -> (PathBuf, PathBuf) {
        (
            crate::paths::expand(&self.to),
            crate::paths::expand(&self.name),
        )
    }

    fn check_current(&self) -> Result<LinkState> {
        let (source, target) = self.paths();

        if !target.exists() && !target.is_symlink() {
            return Ok(LinkState::Missing);
        }
        if !target.is_symlink() {
            return Ok(LinkState::FileExists);
        }

        let link_target = fs::read_link(&target).context("Failed to read symlink")?;
        let expected = source.canonicalize().unwrap_or_else(|_| source.clone());
        let actual = if link_target.is_absolute() {
            link_target.canonicalize().unwrap_or(link_target)
        } else {
            target
                .parent()
                .map(|p| p.join(&link_target))
                .and_then(|p| p.canonicalize().ok())
                .unwrap_or(link_target)
        };

        if expected == actual {
            Ok(LinkState::Correct)
        } else {
            Ok(LinkState::WrongTarget(actual))
        }
    }

    fn create_link(&self) -> Result<()> {
        let (source, target) = self.paths();
        super::support::ensure_parent(&target)?;

        if target.is_symlink() {
            fs::remove_file(&target).with_context(|| {
                format!("Failed to remove existing symlink: {}", target.display())
            })?;
        }
        symlink(&source, &target)
    }
}

#[cfg(unix)]
fn symlink(source: &Path, target: &Path) -> Result<()> {
    std::os::unix::fs::symlink(source, target).with_context(|| {
        format!(
            "Failed to create symlink: {} -> {}",
            target.display(),
            source.display()
        )
    })
}

#[cfg(windows)]
fn symlink(source: &Path, target: &Path) -> Result<()> {
    use std::os::windows::fs::{symlink_dir, symlink_file};

    if source.is_dir() {
        // Junctions need no admin rights; fall back to a real symlink
        if let Err(e) = junction::create(source, target) {
            log::debug!("Junction creation failed ({e}), trying symlink_dir");
            symlink_dir(source, target).with_context(|| {
                format!(
                    "Failed to create directory symlink: {} -> {}",
                    target.display(),
                    source.display()
                )
            })?;
        }
        Ok(())
    } else {
        symlink_file(source, target).with_context(|| {
            format!(
                "Failed to create file symlink: {} -> {}",
                target.display(),
                source.display()
            )
        })
    }
}

#[cfg(not(any(unix, windows)))]
fn symlink(_source: &Path, _target: &Path) -> Result<()> {
    bail!("Symlinks not supported on this platform")
}

impl Converge for Link {
    fn type_name(&self) -> &'static str {
        "link"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> String {
        format!("Link {} -> {}", self.name, self.to)
    }

    fn converge(&self, ctx: &mut ApplyContext) -> Result<ApplyResult> {
        let state = self.check_current()?;

        if self.action == LinkAction::Delete {
            return match state {
                LinkState::Missing => Ok(ApplyResult::up_to_date("delete")),
                LinkState::FileExists => bail!("{} is not a symlink", self.name),
                _ if ctx.why_run => Ok(ApplyResult::skipped(
                    "delete",
                    format!("would remove link {}", self.name),
                )),
                _ => {
                    let (_, target) = self.paths();
                    fs::remove_file(&target)
                        .with_context(|| format!("Failed to remove {}", target.display()))?;
                    Ok(ApplyResult::updated("delete"))
                }
            };
        }

        match state {
            LinkState::Correct => Ok(ApplyResult::up_to_date("create")),
            // Regular files are never replaced by a link
            LinkState::FileExists => Ok(ApplyResult::skipped(
                "create",
                format!("file exists at {}", self.name),
            )),
            LinkState::Missing | LinkState::WrongTarget(_) if ctx.why_run => Ok(
                ApplyResult::skipped("create", format!("would link {} -> {}", self.name, self.to)),
            ),
            LinkState::Missing | LinkState::WrongTarget(_) => {
                self.create_link()?;
                Ok(ApplyResult::updated("create"))
            }
        }
    }
}
