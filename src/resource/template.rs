//! Template resource - render `{{ name }}` placeholders into a file

use anyhow::{Context, Result, bail};
use declarative::{ApplyContext, ApplyResult};
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use super::Converge;
use super::file::Content;
use super::support::{DEFAULT_BACKUPS, deserialize_mode};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Template {
    pub name: String,
    pub path: Option<String>,
    /// Template file to render
    pub source: Option<String>,
    /// Inline template text, used when `source` is unset
    pub content: Option<String>,
    #[serde(default)]
    pub variables: BTreeMap<String, toml::Value>,
    #[serde(default, deserialize_with = "deserialize_mode")]
    pub mode: Option<u32>,
    pub backup: Option<usize>,
}

impl Template {
    pub fn path(&self) -> PathBuf {
        crate::paths::expand(self.path.as_deref().unwrap_or(&self.name))
    }

    fn text(&self) -> Result<String> {
        match (&self.source, &self.content) {
            (Some(source), _) => {
                let source = crate::paths::expand(source);
                fs::read_to_string(&source)
                    .with_context(|| format!("Failed to read template {}", source.display()))
            }
            (None, Some(content)) => Ok(content.clone()),
            (None, None) => bail!("template {} needs `source` or `content`", self.name),
        }
    }

    pub fn render(&self) -> Result<String> {
        render(&self.text()?, &self.variables)
    }
}

/// Substitute every `{{ name }}` in `text`. Unknown names are an error.
pub fn render(text: &str, variables: &BTreeMap<String, toml::Value>) -> Result<String> {
    let placeholder = Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_.-]*)\s*\}\}")?;

    let mut missing = Vec::new();
    let rendered = placeholder.replace_all(text, |caps: &regex::Captures| {
        let key = &caps[1];
        match variables.get(key) {
            Some(toml::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => {
                missing.push(key.to_string());
                String::new()
            }
        }
    });

    if !missing.is_empty() {
        bail!("undefined template variables: {}", missing.join(", "));
    }
    Ok(rendered.into_owned())
}

impl Converge for Template {
    fn type_name(&self) -> &'static str {
        "template"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> String {
        format!("Render {}", self.path().display())
    }

    fn converge(&self, ctx: &mut ApplyContext) -> Result<ApplyResult> {
        let rendered = self.render()?;
        let path = self.path();
        Content {
            path: &path,
            content: Some(rendered.as_bytes()),
            mode: self.mode,
            backup: self.backup.unwrap_or(DEFAULT_BACKUPS),
            sensitive: false,
        }
        .converge("create", ctx)
    }
}
