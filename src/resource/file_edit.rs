//! File edit resource - line-level edits of an existing file

use anyhow::{Context, Result, bail};
use declarative::{ApplyContext, ApplyResult};
use regex::Regex;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

use super::Converge;
use super::file::Content;
use super::support::DEFAULT_BACKUPS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FileEditAction {
    /// Make sure `line` is present, replacing `pattern` matches or appending
    #[default]
    EnsureLine,
    /// Replace every line matching `pattern` with `line`
    Replace,
    /// Drop every line matching `pattern`
    DeleteLines,
}

impl FileEditAction {
    fn as_str(self) -> &'static str {
        match self {
            Self::EnsureLine => "ensure_line",
            Self::Replace => "replace",
            Self::DeleteLines => "delete_lines",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileEdit {
    pub name: String,
    pub path: Option<String>,
    #[serde(default)]
    pub action: FileEditAction,
    pub line: Option<String>,
    pub pattern: Option<String>,
    pub backup: Option<usize>,
}

impl FileEdit {
    pub fn path(&self) -> PathBuf {
        crate::paths::expand(self.path.as_deref().unwrap_or(&self.name))
    }

    fn pattern(&self) -> Result<Option<Regex>> {
        self.pattern
            .as_deref()
            .map(|p| Regex::new(p).with_context(|| format!("Invalid pattern: {p}")))
            .transpose()
    }

    /// The edited text, or `None` when nothing changes
    pub fn edit(&self, original: &str) -> Result<Option<String>> {
        let pattern = self.pattern()?;
        let mut lines: Vec<String> = original.lines().map(str::to_string).collect();
        let before = lines.clone();

        match self.action {
            FileEditAction::EnsureLine => {
                let Some(wanted) = &self.line else {
                    bail!("ensure_line needs `line`");
                };
                let replaced = pattern.as_ref().is_some_and(|re| {
                    let mut hit = false;
                    for line in lines.iter_mut().filter(|l| re.is_match(l)) {
                        line.clone_from(wanted);
                        hit = true;
                    }
                    hit
                });
                if !replaced && !lines.iter().any(|l| l == wanted) {
                    lines.push(wanted.clone());
                }
            }
            FileEditAction::Replace => {
                let (Some(re), Some(wanted)) = (&pattern, &self.line) else {
                    bail!("replace needs `pattern` and `line`");
                };
                for line in lines.iter_mut().filter(|l| re.is_match(l)) {
                    line.clone_from(wanted);
                }
            }
            FileEditAction::DeleteLines => {
                let Some(re) = &pattern else {
                    bail!("delete_lines needs `pattern`");
                };
                lines.retain(|l| !re.is_match(l));
            }
        }

        if lines == before {
            return Ok(None);
        }
        let mut edited = lines.join("\n");
        if !lines.is_empty() {
            edited.push('\n');
        }
        Ok(Some(edited))
    }
}

impl Converge for FileEdit {
    fn type_name(&self) -> &'static str {
        "file_edit"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> String {
        format!("Edit {}", self.path().display())
    }

    fn converge(&self, ctx: &mut ApplyContext) -> Result<ApplyResult> {
        let path = self.path();
        let action = self.action.as_str();
        let original = if path.exists() {
            fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?
        } else if self.action == FileEditAction::EnsureLine {
            String::new()
        } else {
            return Ok(ApplyResult::up_to_date(action));
        };

        let Some(edited) = self.edit(&original)? else {
            return Ok(ApplyResult::up_to_date(action));
        };
        Content {
            path: &path,
            content: Some(edited.as_bytes()),
            mode: None,
            backup: self.backup.unwrap_or(DEFAULT_BACKUPS),
            sensitive: false,
        }
        .converge(action, ctx)
    }
}
