//! Resource kinds sous can converge
//!
//! Every kind implements [`Converge`]: it knows its type name, its own
//! desired state, and how to get there. [`DeclaredResource`] pairs a kind
//! with the guards and notifications shared by all of them and is what the
//! engine runs.

use anyhow::{Result, bail};
use declarative::{ApplyContext, ApplyResult, CommonProperties, Resource, ResourceId};
use prefetch::DownloadRequest;
use std::fmt;

pub mod account;
pub mod directory;
pub mod execute;
pub mod file;
pub mod file_edit;
pub mod git;
pub mod link;
pub mod package;
pub mod platform_setting;
pub mod remote_file;
pub mod secret_file;
pub mod service;
pub mod support;
pub mod template;

pub use account::{Group, User};
pub use directory::Directory;
pub use execute::Execute;
pub use file::File;
pub use file_edit::FileEdit;
pub use git::Git;
pub use link::Link;
pub use package::Package;
pub use platform_setting::PlatformSetting;
pub use remote_file::{Fetcher, RemoteFile};
pub use secret_file::SecretFile;
pub use service::Service;
pub use template::Template;

/// Kind-specific half of a resource
pub trait Converge: fmt::Debug + Send {
    /// Type name used in ids, e.g. `"file"`
    fn type_name(&self) -> &'static str;

    fn name(&self) -> &str;

    fn description(&self) -> String;

    /// Bring the system to the desired state
    fn converge(&self, ctx: &mut ApplyContext) -> Result<ApplyResult>;

    /// Artifact to download before the run-list starts
    fn prefetch(&self, _id: &ResourceId) -> Option<DownloadRequest> {
        None
    }
}

/// Every type name accepted in a run-list
pub const TYPE_NAMES: &[&str] = &[
    "file",
    "directory",
    "link",
    "remote_file",
    "execute",
    "template",
    "package",
    "service",
    "user",
    "group",
    "git",
    "file_edit",
    "secret_file",
    "platform_setting",
];

/// The closed set of resource kinds
#[derive(Debug)]
pub enum ResourceKind {
    File(File),
    Directory(Directory),
    Link(Link),
    RemoteFile(RemoteFile),
    Execute(Execute),
    Template(Template),
    Package(Package),
    Service(Service),
    User(User),
    Group(Group),
    Git(Git),
    FileEdit(FileEdit),
    SecretFile(SecretFile),
    PlatformSetting(PlatformSetting),
}

impl ResourceKind {
    /// Deserialize the kind named `type_name` from its property table
    pub fn parse(type_name: &str, properties: toml::Table) -> Result<Self> {
        let value = toml::Value::Table(properties);
        let kind = match type_name {
            "file" => Self::File(value.try_into()?),
            "directory" => Self::Directory(value.try_into()?),
            "link" => Self::Link(value.try_into()?),
            "remote_file" => Self::RemoteFile(value.try_into()?),
            "execute" => Self::Execute(value.try_into()?),
            "template" => Self::Template(value.try_into()?),
            "package" => Self::Package(value.try_into()?),
            "service" => Self::Service(value.try_into()?),
            "user" => Self::User(value.try_into()?),
            "group" => Self::Group(value.try_into()?),
            "git" => Self::Git(value.try_into()?),
            "file_edit" => Self::FileEdit(value.try_into()?),
            "secret_file" => Self::SecretFile(value.try_into()?),
            "platform_setting" => Self::PlatformSetting(value.try_into()?),
            other => bail!(
                "Unknown resource type '{other}' (expected one of: {})",
                TYPE_NAMES.join(", ")
            ),
        };
        Ok(kind)
    }

    fn inner(&self) -> &dyn Converge {
        match self {
            Self::File(r) => r,
            Self::Directory(r) => r,
            Self::Link(r) => r,
            Self::RemoteFile(r) => r,
            Self::Execute(r) => r,
            Self::Template(r) => r,
            Self::Package(r) => r,
            Self::Service(r) => r,
            Self::User(r) => r,
            Self::Group(r) => r,
            Self::Git(r) => r,
            Self::FileEdit(r) => r,
            Self::SecretFile(r) => r,
            Self::PlatformSetting(r) => r,
        }
    }
}

/// A resource kind plus the properties every resource shares
#[derive(Debug)]
pub struct DeclaredResource {
    pub kind: ResourceKind,
    pub common: CommonProperties,
}

impl DeclaredResource {
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            common: CommonProperties::default(),
        }
    }

    #[must_use]
    pub fn with_common(mut self, common: CommonProperties) -> Self {
        self.common = common;
        self
    }
}

impl Resource for DeclaredResource {
    fn id(&self) -> ResourceId {
        let inner = self.kind.inner();
        ResourceId::new(inner.type_name(), inner.name())
    }

    fn description(&self) -> String {
        self.kind.inner().description()
    }

    fn common(&self) -> &CommonProperties {
        &self.common
    }

    fn common_mut(&mut self) -> &mut CommonProperties {
        &mut self.common
    }

    fn apply(&self, ctx: &mut ApplyContext) -> Result<ApplyResult> {
        self.kind.inner().converge(ctx)
    }

    fn prefetch(&self) -> Option<DownloadRequest> {
        self.kind.inner().prefetch(&self.id())
    }
}
