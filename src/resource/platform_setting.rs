//! Platform setting resource - macOS `defaults` preferences

use anyhow::{Context, Result};
use declarative::{ApplyContext, ApplyResult};
use serde::Deserialize;
use std::fmt;
use std::process::Command;

use super::Converge;
use super::support;

/// Typed value written with `defaults write`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl SettingValue {
    fn type_flag(&self) -> &'static str {
        match self {
            Self::Bool(_) => "-bool",
            Self::Int(_) => "-int",
            Self::Float(_) => "-float",
            Self::String(_) => "-string",
        }
    }

    /// Read `defaults read` output as the same type as `self`
    fn parse_like(&self, raw: &str) -> Option<Self> {
        let raw = raw.trim();
        match self {
            Self::Bool(_) => match raw {
                "1" | "true" | "YES" => Some(Self::Bool(true)),
                "0" | "false" | "NO" => Some(Self::Bool(false)),
                _ => None,
            },
            Self::Int(_) => raw.parse().ok().map(Self::Int),
            Self::Float(_) => raw.parse().ok().map(Self::Float),
            Self::String(_) => Some(Self::String(raw.to_string())),
        }
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SettingAction {
    #[default]
    Write,
    Delete,
}

impl SettingAction {
    fn as_str(self) -> &'static str {
        match self {
            Self::Write => "write",
            Self::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlatformSetting {
    pub name: String,
    /// e.g. `com.apple.finder` or `NSGlobalDomain`
    pub domain: String,
    pub key: String,
    #[serde(default)]
    pub action: SettingAction,
    /// Required for `write`
    pub value: Option<SettingValue>,
}

impl PlatformSetting {
    /// Raw `defaults read` output, or `None` when the key is not set
    fn read_raw(&self) -> Result<Option<String>> {
        let output = Command::new("defaults")
            .args(self.read_args())
            .output()
            .context("Failed to run defaults read")?;
        if !output.status.success() {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&output.stdout).into_owned()))
    }

    fn value(&self) -> Result<&SettingValue> {
        self.value.as_ref().with_context(|| {
            format!("platform_setting {} needs a `value` to write", self.name)
        })
    }

    fn read_args(&self) -> [&str; 3] {
        ["read", self.domain.as_str(), self.key.as_str()]
    }

    fn write_args(&self, value: &SettingValue) -> Vec<String> {
        vec![
            "write".to_string(),
            self.domain.clone(),
            self.key.clone(),
            value.type_flag().to_string(),
            value.to_string(),
        ]
    }

    fn delete_args(&self) -> [&str; 3] {
        ["delete", self.domain.as_str(), self.key.as_str()]
    }

    fn write(&self, ctx: &ApplyContext) -> Result<ApplyResult> {
        let value = self.value()?;
        let current = self.read_raw()?.and_then(|raw| value.parse_like(&raw));
        if current.as_ref() == Some(value) {
            return Ok(ApplyResult::up_to_date("write"));
        }
        if ctx.why_run {
            return Ok(ApplyResult::skipped(
                "write",
                format!("would set {} {} to {value}", self.domain, self.key),
            ));
        }
        support::run_checked(
            Command::new("defaults").args(self.write_args(value)),
            "defaults write",
        )?;
        Ok(ApplyResult::updated("write"))
    }

    fn delete(&self, ctx: &ApplyContext) -> Result<ApplyResult> {
        if self.read_raw()?.is_none() {
            return Ok(ApplyResult::up_to_date("delete"));
        }
        if ctx.why_run {
            return Ok(ApplyResult::skipped(
                "delete",
                format!("would delete {} {}", self.domain, self.key),
            ));
        }
        support::run_checked(
            Command::new("defaults").args(self.delete_args()),
            "defaults delete",
        )?;
        Ok(ApplyResult::updated("delete"))
    }
}

impl Converge for PlatformSetting {
    fn type_name(&self) -> &'static str {
        "platform_setting"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> String {
        match (self.action, &self.value) {
            (SettingAction::Write, Some(value)) => {
                format!("Set {} {} = {value}", self.domain, self.key)
            }
            _ => format!("{} {} {}", self.action.as_str(), self.domain, self.key),
        }
    }

    fn converge(&self, ctx: &mut ApplyContext) -> Result<ApplyResult> {
        let action = self.action.as_str();
        if self.action == SettingAction::Write {
            self.value()?;
        }
        if !cfg!(target_os = "macos") {
            return Ok(ApplyResult::skipped(action, "defaults is only available on macOS"));
        }
        match self.action {
            SettingAction::Write => self.write(ctx),
            SettingAction::Delete => self.delete(ctx),
        }
    }
}
