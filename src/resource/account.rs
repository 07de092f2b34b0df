//! User and group resources

use anyhow::{Result, bail};
use declarative::{ApplyContext, ApplyResult};
use serde::Deserialize;
use std::process::Command;

use super::Converge;
use super::support;

/// Which account tooling to drive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tooling {
    /// `useradd` / `groupadd`
    Shadow,
    /// Directory Services on macOS
    Dscl,
}

impl Tooling {
    fn detect() -> Self {
        if cfg!(target_os = "macos") {
            Self::Dscl
        } else {
            Self::Shadow
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AccountAction {
    #[default]
    Create,
    Remove,
}

impl AccountAction {
    fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Remove => "remove",
        }
    }
}

type CommandLine = Vec<String>;

fn line(parts: &[&str]) -> CommandLine {
    parts.iter().map(|s| (*s).to_string()).collect()
}

fn run_all(lines: Vec<CommandLine>) -> Result<()> {
    for line in lines {
        let Some((program, args)) = line.split_first() else {
            bail!("empty account command");
        };
        support::run_checked(
            Command::new(program).args(args),
            &format!("{program} {}", args.join(" ")),
        )?;
    }
    Ok(())
}

/// Shared converge flow for both account kinds
fn converge_account(
    action: AccountAction,
    exists: bool,
    what: &str,
    ctx: &ApplyContext,
    commands: impl FnOnce() -> Result<Vec<CommandLine>>,
) -> Result<ApplyResult> {
    let name = action.as_str();
    let satisfied = match action {
        AccountAction::Create => exists,
        AccountAction::Remove => !exists,
    };
    if satisfied {
        return Ok(ApplyResult::up_to_date(name));
    }
    let lines = commands()?;
    if ctx.why_run {
        return Ok(ApplyResult::skipped(name, format!("would {name} {what}")));
    }
    run_all(lines)?;
    Ok(ApplyResult::updated(name))
}

// ============================================================================
// User
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct User {
    pub name: String,
    #[serde(default)]
    pub action: AccountAction,
    pub uid: Option<u32>,
    /// Primary group name or id
    pub group: Option<String>,
    pub home: Option<String>,
    pub shell: Option<String>,
    pub comment: Option<String>,
    #[serde(default)]
    pub system: bool,
}

impl User {
    fn exists(&self) -> bool {
        support::succeeds(Command::new("id").args(["-u", &self.name]))
    }

    fn commands(&self, tooling: Tooling) -> Result<Vec<CommandLine>> {
        let name = self.name.as_str();
        match (tooling, self.action) {
            (Tooling::Shadow, AccountAction::Create) => {
                let mut cmd = line(&["useradd"]);
                if let Some(uid) = self.uid {
                    cmd.extend(["-u".to_string(), uid.to_string()]);
                }
                if let Some(group) = &self.group {
                    cmd.extend(["-g".to_string(), group.clone()]);
                }
                if let Some(home) = &self.home {
                    cmd.extend(["-d".to_string(), home.clone(), "-m".to_string()]);
                }
                if let Some(shell) = &self.shell {
                    cmd.extend(["-s".to_string(), shell.clone()]);
                }
                if let Some(comment) = &self.comment {
                    cmd.extend(["-c".to_string(), comment.clone()]);
                }
                if self.system {
                    cmd.push("-r".to_string());
                }
                cmd.push(name.to_string());
                Ok(vec![cmd])
            }
            (Tooling::Shadow, AccountAction::Remove) => Ok(vec![line(&["userdel", name])]),
            (Tooling::Dscl, AccountAction::Create) => {
                let Some(uid) = self.uid else {
                    bail!("user {name} needs a uid on macOS");
                };
                let record = format!("/Users/{name}");
                let uid = uid.to_string();
                let home = self.home.clone().unwrap_or_else(|| format!("/Users/{name}"));
                let shell = self.shell.as_deref().unwrap_or("/bin/zsh");
                let group = self.group.as_deref().unwrap_or("20");
                let mut lines = vec![
                    line(&["dscl", ".", "-create", &record]),
                    line(&["dscl", ".", "-create", &record, "UniqueID", &uid]),
                    line(&["dscl", ".", "-create", &record, "PrimaryGroupID", group]),
                    line(&["dscl", ".", "-create", &record, "UserShell", shell]),
                    line(&["dscl", ".", "-create", &record, "NFSHomeDirectory", &home]),
                ];
                if let Some(comment) = &self.comment {
                    lines.push(line(&["dscl", ".", "-create", &record, "RealName", comment]));
                }
                Ok(lines)
            }
            (Tooling::Dscl, AccountAction::Remove) => Ok(vec![line(&[
                "dscl",
                ".",
                "-delete",
                &format!("/Users/{name}"),
            ])]),
        }
    }
}

impl Converge for User {
    fn type_name(&self) -> &'static str {
        "user"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> String {
        format!("{} user {}", self.action.as_str(), self.name)
    }

    fn converge(&self, ctx: &mut ApplyContext) -> Result<ApplyResult> {
        converge_account(
            self.action,
            self.exists(),
            &format!("user {}", self.name),
            ctx,
            || self.commands(Tooling::detect()),
        )
    }
}

// ============================================================================
// Group
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Group {
    pub name: String,
    #[serde(default)]
    pub action: AccountAction,
    pub gid: Option<u32>,
    #[serde(default)]
    pub system: bool,
}

impl Group {
    fn exists(&self, tooling: Tooling) -> bool {
        match tooling {
            Tooling::Shadow => {
                support::succeeds(Command::new("getent").args(["group", &self.name]))
            }
            Tooling::Dscl => support::succeeds(Command::new("dscl").args([
                ".",
                "-read",
                &format!("/Groups/{}", self.name),
            ])),
        }
    }

    fn commands(&self, tooling: Tooling) -> Result<Vec<CommandLine>> {
        let name = self.name.as_str();
        match (tooling, self.action) {
            (Tooling::Shadow, AccountAction::Create) => {
                let mut cmd = line(&["groupadd"]);
                if let Some(gid) = self.gid {
                    cmd.extend(["-g".to_string(), gid.to_string()]);
                }
                if self.system {
                    cmd.push("-r".to_string());
                }
                cmd.push(name.to_string());
                Ok(vec![cmd])
            }
            (Tooling::Shadow, AccountAction::Remove) => Ok(vec![line(&["groupdel", name])]),
            (Tooling::Dscl, AccountAction::Create) => {
                let Some(gid) = self.gid else {
                    bail!("group {name} needs a gid on macOS");
                };
                let record = format!("/Groups/{name}");
                Ok(vec![
                    line(&["dscl", ".", "-create", &record]),
                    line(&["dscl", ".", "-create", &record, "PrimaryGroupID", &gid.to_string()]),
                ])
            }
            (Tooling::Dscl, AccountAction::Remove) => Ok(vec![line(&[
                "dscl",
                ".",
                "-delete",
                &format!("/Groups/{name}"),
            ])]),
        }
    }
}

impl Converge for Group {
    fn type_name(&self) -> &'static str {
        "group"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> String {
        format!("{} group {}", self.action.as_str(), self.name)
    }

    fn converge(&self, ctx: &mut ApplyContext) -> Result<ApplyResult> {
        let tooling = Tooling::detect();
        converge_account(
            self.action,
            self.exists(tooling),
            &format!("group {}", self.name),
            ctx,
            || self.commands(tooling),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            name: "deploy".to_string(),
            action: AccountAction::Create,
            uid: Some(1100),
            group: Some("staff".to_string()),
            home: Some("/srv/deploy".to_string()),
            shell: Some("/bin/bash".to_string()),
            comment: None,
            system: false,
        }
    }

    #[test]
    fn test_useradd_arguments() {
        let lines = user().commands(Tooling::Shadow).unwrap();
        assert_eq!(
            lines,
            vec![vec![
                "useradd", "-u", "1100", "-g", "staff", "-d", "/srv/deploy", "-m", "-s",
                "/bin/bash", "deploy"
            ]]
        );
    }

    #[test]
    fn test_dscl_user_needs_uid() {
        let mut user = user();
        assert_eq!(user.commands(Tooling::Dscl).unwrap().len(), 5);
        user.uid = None;
        assert!(user.commands(Tooling::Dscl).is_err());
    }

    #[test]
    fn test_groupadd_arguments() {
        let group = Group {
            name: "web".to_string(),
            action: AccountAction::Create,
            gid: Some(900),
            system: true,
        };
        assert_eq!(
            group.commands(Tooling::Shadow).unwrap(),
            vec![vec!["groupadd", "-g", "900", "-r", "web"]]
        );

        let mut removal = group.clone();
        removal.action = AccountAction::Remove;
        assert_eq!(
            removal.commands(Tooling::Dscl).unwrap(),
            vec![vec!["dscl", ".", "-delete", "/Groups/web"]]
        );
    }

    #[test]
    fn test_existing_account_is_up_to_date() {
        let result = converge_account(
            AccountAction::Create,
            true,
            "user root",
            &ApplyContext::new(false),
            || panic!("commands built for an existing account"),
        )
        .unwrap();
        assert!(result.is_up_to_date());

        let why = converge_account(
            AccountAction::Remove,
            true,
            "group web",
            &ApplyContext::new(true),
            || Ok(vec![line(&["groupdel", "web"])]),
        )
        .unwrap();
        assert_eq!(why.skip_reason.as_deref(), Some("would remove group web"));
    }
}
