//! Service resource - systemd units and launchd jobs

use anyhow::{Result, bail};
use declarative::{ApplyContext, ApplyResult};
use serde::Deserialize;
use std::process::Command;

use super::Converge;
use super::support;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceManager {
    Systemd,
    Launchd,
}

impl ServiceManager {
    fn detect() -> Self {
        if cfg!(target_os = "macos") {
            Self::Launchd
        } else {
            Self::Systemd
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ServiceAction {
    #[default]
    Start,
    Stop,
    Restart,
    Enable,
    Disable,
    /// Only acts when notified
    Nothing,
}

impl ServiceAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
            Self::Enable => "enable",
            Self::Disable => "disable",
            Self::Nothing => "nothing",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Service {
    pub name: String,
    /// Unit name or launchd label, defaults to `name`
    pub service_name: Option<String>,
    #[serde(default)]
    pub action: ServiceAction,
    /// Detected from the platform when unset
    pub manager: Option<ServiceManager>,
    /// launchd domain target
    #[serde(default = "default_domain")]
    pub domain: String,
}

fn default_domain() -> String {
    "system".to_string()
}

impl Service {
    pub fn service_name(&self) -> &str {
        self.service_name.as_deref().unwrap_or(&self.name)
    }

    fn manager(&self) -> ServiceManager {
        self.manager.unwrap_or_else(ServiceManager::detect)
    }

    /// Query command answering whether the action is already satisfied
    fn probe(&self) -> Option<(Command, bool)> {
        let name = self.service_name();
        let (args, satisfied_on_success): (Vec<String>, bool) = match (self.manager(), self.action)
        {
            (ServiceManager::Systemd, ServiceAction::Start) => {
                (vec!["is-active".into(), "--quiet".into(), name.into()], true)
            }
            (ServiceManager::Systemd, ServiceAction::Stop) => {
                (vec!["is-active".into(), "--quiet".into(), name.into()], false)
            }
            (ServiceManager::Systemd, ServiceAction::Enable) => {
                (vec!["is-enabled".into(), "--quiet".into(), name.into()], true)
            }
            (ServiceManager::Systemd, ServiceAction::Disable) => {
                (vec!["is-enabled".into(), "--quiet".into(), name.into()], false)
            }
            (ServiceManager::Launchd, ServiceAction::Start) => (vec!["list".into(), name.into()], true),
            (ServiceManager::Launchd, ServiceAction::Stop) => (vec!["list".into(), name.into()], false),
            _ => return None,
        };
        let program = match self.manager() {
            ServiceManager::Systemd => "systemctl",
            ServiceManager::Launchd => "launchctl",
        };
        let mut cmd = Command::new(program);
        cmd.args(args);
        Some((cmd, satisfied_on_success))
    }

    /// Command lines that carry out the action
    fn commands(&self) -> Vec<Vec<String>> {
        let name = self.service_name().to_string();
        let target = format!("{}/{}", self.domain, name);
        let line = |parts: &[&str]| parts.iter().map(|s| (*s).to_string()).collect::<Vec<_>>();

        match (self.manager(), self.action) {
            (_, ServiceAction::Nothing) => Vec::new(),
            (ServiceManager::Systemd, action) => {
                vec![line(&["systemctl", action.as_str(), &name])]
            }
            (ServiceManager::Launchd, ServiceAction::Start) => {
                vec![line(&["launchctl", "start", &name])]
            }
            (ServiceManager::Launchd, ServiceAction::Stop) => {
                vec![line(&["launchctl", "stop", &name])]
            }
            (ServiceManager::Launchd, ServiceAction::Restart) => {
                vec![line(&["launchctl", "kickstart", "-k", &target])]
            }
            (ServiceManager::Launchd, ServiceAction::Enable) => {
                vec![line(&["launchctl", "enable", &target])]
            }
            (ServiceManager::Launchd, ServiceAction::Disable) => {
                vec![line(&["launchctl", "disable", &target])]
            }
        }
    }
}

impl Converge for Service {
    fn type_name(&self) -> &'static str {
        "service"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> String {
        format!("{} service {}", self.action.as_str(), self.service_name())
    }

    fn converge(&self, ctx: &mut ApplyContext) -> Result<ApplyResult> {
        let action = self.action.as_str();
        if self.action == ServiceAction::Nothing {
            return Ok(ApplyResult::skipped(action, "runs only when notified"));
        }

        if let Some((mut probe, satisfied_on_success)) = self.probe()
            && support::succeeds(&mut probe) == satisfied_on_success
        {
            return Ok(ApplyResult::up_to_date(action));
        }

        if ctx.why_run {
            return Ok(ApplyResult::skipped(
                action,
                format!("would {action} {}", self.service_name()),
            ));
        }

        for line in self.commands() {
            let Some((program, args)) = line.split_first() else {
                bail!("empty service command");
            };
            support::run_checked(
                Command::new(program).args(args),
                &format!("{program} {}", args.join(" ")),
            )?;
        }
        Ok(ApplyResult::updated(action))
    }
}
