//! TOML run-list files
//!
//! A run-list is a sequence of `[[resource]]` tables applied in file order:
//!
//! ```toml
//! [[resource]]
//! type = "template"
//! name = "/etc/nginx/nginx.conf"
//! source = "templates/nginx.conf"
//! variables = { workers = 4 }
//! notifies = [{ action = "reload", resource = "service[nginx]" }]
//!
//! [[resource]]
//! type = "execute"
//! name = "warm-cache"
//! command = "curl -s localhost/health"
//! only_if = { type = "path_exists", path = "/run/nginx.pid" }
//! ```
//!
//! Kind-specific keys sit next to the shared ones (`type`, `name`,
//! `only_if`, `not_if`, `ignore_failure`, `notifies`, `subscribes`).

use anyhow::{Context, Result, bail};
use declarative::{
    CommonProperties, DeclarationProvider, Guard, Predicate, ResourceId, RunListBuilder, Timing,
};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::resource::{DeclaredResource, Fetcher, ResourceKind, support};

/// A condition evaluated right before a resource is applied
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GuardSpec {
    /// Holds when the shell command exits zero
    Command { command: String },
    /// Holds when the path exists
    PathExists { path: String },
    /// Holds when the variable is set, and equals `value` if given
    Env { name: String, value: Option<String> },
}

impl fmt::Display for GuardSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command { command } => write!(f, "`{command}`"),
            Self::PathExists { path } => write!(f, "{path} exists"),
            Self::Env { name, value: None } => write!(f, "${name} is set"),
            Self::Env {
                name,
                value: Some(value),
            } => write!(f, "${name} == {value:?}"),
        }
    }
}

impl Predicate for GuardSpec {
    fn evaluate(&self) -> Result<bool> {
        match self {
            Self::Command { command } => {
                let status = support::shell(command)
                    .stdout(std::process::Stdio::null())
                    .stderr(std::process::Stdio::null())
                    .status()
                    .with_context(|| format!("Failed to run guard command `{command}`"))?;
                Ok(status.success())
            }
            Self::PathExists { path } => Ok(crate::paths::expand(path).exists()),
            Self::Env { name, value } => Ok(match (std::env::var(name), value) {
                (Ok(actual), Some(wanted)) => &actual == wanted,
                (Ok(_), None) => true,
                (Err(_), _) => false,
            }),
        }
    }
}

/// `only_if = "cmd"` is shorthand for a command guard
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum GuardInput {
    Shorthand(String),
    Spec(GuardSpec),
}

impl GuardInput {
    fn into_guard(self) -> Guard {
        let spec = match self {
            Self::Shorthand(command) => GuardSpec::Command { command },
            Self::Spec(spec) => spec,
        };
        Guard::new(spec.to_string(), spec)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct NotifyEntry {
    action: String,
    /// `type[name]` of the other resource
    resource: String,
    #[serde(default = "default_timing")]
    timing: String,
}

fn default_timing() -> String {
    Timing::Delayed.as_str().to_string()
}

impl NotifyEntry {
    fn timing(&self) -> Result<Timing> {
        self.timing.parse().map_err(anyhow::Error::msg)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct Entry {
    #[serde(rename = "type")]
    type_name: String,
    name: String,
    only_if: Option<GuardInput>,
    not_if: Option<GuardInput>,
    #[serde(default)]
    ignore_failure: bool,
    #[serde(default)]
    notifies: Vec<NotifyEntry>,
    #[serde(default)]
    subscribes: Vec<NotifyEntry>,
    #[serde(flatten)]
    properties: toml::Table,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RunListDoc {
    #[serde(default, rename = "resource")]
    resources: Vec<Entry>,
}

/// Collaborators injected into declared resources
#[derive(Debug, Clone, Default)]
pub struct Injections {
    /// Package manager for packages that don't name one
    pub package_manager: Option<String>,
    /// Lets remote files download for themselves
    pub fetcher: Option<Fetcher>,
}

/// A run-list read from a TOML file
#[derive(Debug)]
pub struct Recipe {
    path: PathBuf,
    entries: Vec<Entry>,
    injections: Injections,
}

impl Recipe {
    pub fn load(path: &Path, injections: Injections) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read run-list: {}", path.display()))?;
        Self::parse(&content, path, injections)
    }

    pub fn parse(content: &str, path: &Path, injections: Injections) -> Result<Self> {
        let doc: RunListDoc = toml::from_str(content)
            .with_context(|| format!("Invalid run-list: {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            entries: doc.resources,
            injections,
        })
    }

    fn declare_entry(&self, entry: &Entry) -> Result<DeclaredResource> {
        let mut properties = entry.properties.clone();
        properties.insert("name".to_string(), toml::Value::String(entry.name.clone()));

        let mut kind = ResourceKind::parse(&entry.type_name, properties)?;
        match &mut kind {
            ResourceKind::Package(package) if package.manager.is_none() => {
                package.manager.clone_from(&self.injections.package_manager);
            }
            ResourceKind::RemoteFile(remote) => {
                remote.fetcher.clone_from(&self.injections.fetcher);
            }
            _ => {}
        }

        let mut common = CommonProperties::default().ignore_failure(entry.ignore_failure);
        if let Some(guard) = entry.only_if.clone() {
            common = common.only_if(guard.into_guard());
        }
        if let Some(guard) = entry.not_if.clone() {
            common = common.not_if(guard.into_guard());
        }
        for notify in &entry.notifies {
            check_id(&notify.resource)?;
            common = common.notifies(&notify.action, &notify.resource, notify.timing()?);
        }
        for subscribe in &entry.subscribes {
            check_id(&subscribe.resource)?;
            common = common.subscribes(&subscribe.action, &subscribe.resource, subscribe.timing()?);
        }

        Ok(DeclaredResource::new(kind).with_common(common))
    }
}

fn check_id(id: &str) -> Result<()> {
    if ResourceId::parse(id).is_none() {
        bail!("expected a resource id like type[name], got {id:?}");
    }
    Ok(())
}

impl DeclarationProvider<DeclaredResource> for Recipe {
    fn declare(&self, builder: &mut RunListBuilder<DeclaredResource>) -> Result<()> {
        for (index, entry) in self.entries.iter().enumerate() {
            let resource = self.declare_entry(entry).with_context(|| {
                format!(
                    "{}: resource #{} ({}[{}])",
                    self.path.display(),
                    index + 1,
                    entry.type_name,
                    entry.name
                )
            })?;
            builder.add(resource);
        }
        log::debug!(
            "Declared {} resources from {}",
            builder.len(),
            self.path.display()
        );
        Ok(())
    }
}
