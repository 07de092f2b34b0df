//! Secret file resource - content that never reaches a log

use anyhow::{Context, Result, bail};
use declarative::{ApplyContext, ApplyResult};
use serde::Deserialize;
use std::path::PathBuf;

use super::Converge;
use super::file::Content;
use super::support::{self, deserialize_mode};

const DEFAULT_SECRET_MODE: u32 = 0o600;

#[derive(Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecretFile {
    pub name: String,
    pub path: Option<String>,
    /// Environment variable holding the secret
    pub env: Option<String>,
    /// Command whose stdout is the secret
    pub command: Option<String>,
    #[serde(default, deserialize_with = "deserialize_mode")]
    pub mode: Option<u32>,
    /// No backups unless asked for
    #[serde(default)]
    pub backup: usize,
}

impl std::fmt::Debug for SecretFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretFile")
            .field("name", &self.name)
            .field("env", &self.env)
            .field("command", &self.command.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

impl SecretFile {
    pub fn path(&self) -> PathBuf {
        crate::paths::expand(self.path.as_deref().unwrap_or(&self.name))
    }

    fn secret(&self) -> Result<Vec<u8>> {
        match (&self.env, &self.command) {
            (Some(var), None) => std::env::var(var)
                .map(String::into_bytes)
                .with_context(|| format!("Environment variable {var} is not set")),
            (None, Some(command)) => {
                let output = support::run_checked(&mut support::shell(command), "secret command")?;
                Ok(output.stdout)
            }
            _ => bail!("secret_file {} needs exactly one of `env` or `command`", self.name),
        }
    }
}

impl Converge for SecretFile {
    fn type_name(&self) -> &'static str {
        "secret_file"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> String {
        format!("Secret {}", self.path().display())
    }

    fn converge(&self, ctx: &mut ApplyContext) -> Result<ApplyResult> {
        let secret = self.secret()?;
        let path = self.path();
        Content {
            path: &path,
            content: Some(secret.as_slice()),
            mode: Some(self.mode.unwrap_or(DEFAULT_SECRET_MODE)),
            backup: self.backup,
            sensitive: true,
        }
        .converge("create", ctx)
    }
}
