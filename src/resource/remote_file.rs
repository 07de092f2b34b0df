//! Remote file resource - place a downloaded artifact
//!
//! Most remote files are fetched ahead of time by the prefetch pool. Apply
//! then only finalizes: back up the existing file, move the staged artifact
//! into place, set permissions. Remote files that were not prefetched (they
//! are guarded, use conditional requests, or their download outlived the
//! wait ceiling) download for themselves here.

use anyhow::{Context, Result, bail};
use declarative::{ApplyContext, ApplyResult, ResourceId};
use prefetch::{DownloadRequest, Downloader, Outcome, Transfer, sha256_file, temp_path_for};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use super::Converge;
use super::support::{self, DEFAULT_BACKUPS, deserialize_mode};

/// Handle remote files use to download for themselves
#[derive(Clone)]
pub struct Fetcher {
    downloader: Downloader,
    temp_dir: PathBuf,
}

impl Fetcher {
    pub fn new(downloader: Downloader, temp_dir: PathBuf) -> Self {
        Self {
            downloader,
            temp_dir,
        }
    }

    fn staging_path(&self, dest: &Path) -> PathBuf {
        // Distinct from the prefetch staging path, which a late worker may
        // still be writing.
        temp_path_for(dest, &self.temp_dir).with_extension("direct")
    }

    fn etag_path(&self, dest: &Path) -> PathBuf {
        temp_path_for(dest, &self.temp_dir).with_extension("etag")
    }
}

impl fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fetcher")
            .field("temp_dir", &self.temp_dir)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RemoteFileAction {
    #[default]
    Create,
    CreateIfMissing,
}

impl RemoteFileAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::CreateIfMissing => "create_if_missing",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteFile {
    pub name: String,
    pub path: Option<String>,
    /// URL to download
    pub source: String,
    #[serde(default)]
    pub action: RemoteFileAction,
    /// Expected SHA-256 of the artifact
    pub checksum: Option<String>,
    #[serde(default, deserialize_with = "deserialize_mode")]
    pub mode: Option<u32>,
    pub backup: Option<usize>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Send the last seen ETag as `If-None-Match`
    #[serde(default)]
    pub use_etag: bool,
    /// Send the destination's mtime as `If-Modified-Since`
    #[serde(default)]
    pub use_last_modified: bool,
    #[serde(skip)]
    pub fetcher: Option<Fetcher>,
}

impl RemoteFile {
    pub fn path(&self) -> PathBuf {
        crate::paths::expand(self.path.as_deref().unwrap_or(&self.name))
    }

    /// Conditional requests need the destination, so they are never prefetched
    pub fn is_prefetchable(&self) -> bool {
        self.action == RemoteFileAction::Create && !self.use_etag && !self.use_last_modified
    }

    fn backups(&self) -> usize {
        self.backup.unwrap_or(DEFAULT_BACKUPS)
    }

    fn matches_checksum(&self, path: &Path) -> Result<bool> {
        let Some(expected) = &self.checksum else {
            return Ok(false);
        };
        if !path.is_file() {
            return Ok(false);
        }
        let actual = sha256_file(path)?;
        Ok(actual == expected.trim().to_ascii_lowercase())
    }

    /// Download into a private staging file. `None` means not modified.
    fn download(&self, dest: &Path) -> Result<Option<(PathBuf, Option<String>)>> {
        let Some(fetcher) = &self.fetcher else {
            bail!("no downloader available for {}", self.source);
        };

        let mut transfer = Transfer::new(&self.source, fetcher.staging_path(dest));
        transfer.checksum = self.checksum.clone();
        transfer.headers = self
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if dest.exists() {
            if self.use_etag {
                transfer.etag = fs::read_to_string(fetcher.etag_path(dest))
                    .ok()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty());
            }
            if self.use_last_modified {
                transfer.modified_since = fs::metadata(dest).and_then(|m| m.modified()).ok();
            }
        }

        log::debug!("{} was not prefetched, downloading it now", self.source);
        let outcome = fetcher
            .downloader
            .fetch(&transfer, &mut |_, _| {})
            .with_context(|| format!("Failed to download {}", self.source))?;

        match outcome {
            Outcome::NotModified => Ok(None),
            Outcome::Downloaded { path, etag, .. } => Ok(Some((path, etag))),
        }
    }

    fn remember_etag(&self, dest: &Path, etag: Option<&str>) -> Result<()> {
        let (Some(fetcher), Some(etag), true) = (&self.fetcher, etag, self.use_etag) else {
            return Ok(());
        };
        let path = fetcher.etag_path(dest);
        support::ensure_parent(&path)?;
        fs::write(&path, etag).with_context(|| format!("Failed to record {}", path.display()))
    }

    /// Move `staged` onto `dest`
    fn finalize(&self, staged: &Path, dest: &Path) -> Result<ApplyResult> {
        let action = self.action.as_str();
        if dest.is_file() && sha256_file(dest)? == sha256_file(staged)? {
            fs::remove_file(staged)
                .with_context(|| format!("Failed to remove {}", staged.display()))?;
            return self.converge_mode(dest);
        }

        support::backup(dest, self.backups())?;
        support::move_into_place(staged, dest)?;
        support::set_mode(dest, self.mode)?;
        log::debug!("Placed {} at {}", self.source, dest.display());
        Ok(ApplyResult::updated(action))
    }

    fn converge_mode(&self, dest: &Path) -> Result<ApplyResult> {
        if support::mode_differs(dest, self.mode) {
            support::set_mode(dest, self.mode)?;
            return Ok(ApplyResult::updated(self.action.as_str()));
        }
        Ok(ApplyResult::up_to_date(self.action.as_str()))
    }
}

impl Converge for RemoteFile {
    fn type_name(&self) -> &'static str {
        "remote_file"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> String {
        format!("Download {} to {}", self.source, self.path().display())
    }

    fn converge(&self, ctx: &mut ApplyContext) -> Result<ApplyResult> {
        let dest = self.path();
        let action = self.action.as_str();
        let staged = ctx.staged_artifact();

        if self.action == RemoteFileAction::CreateIfMissing && dest.exists() {
            return Ok(ApplyResult::up_to_date(action));
        }
        if self.matches_checksum(&dest)? {
            if let Some(staged) = staged {
                fs::remove_file(staged).ok();
            }
            if ctx.why_run {
                return Ok(ApplyResult::up_to_date(action));
            }
            return self.converge_mode(&dest);
        }
        if ctx.why_run {
            return Ok(ApplyResult::skipped(
                action,
                format!("would download {} to {}", self.source, dest.display()),
            ));
        }

        if let Some(staged) = staged {
            return self.finalize(staged, &dest);
        }
        match self.download(&dest)? {
            None => self.converge_mode(&dest),
            Some((staged, etag)) => {
                let result = self.finalize(&staged, &dest)?;
                self.remember_etag(&dest, etag.as_deref())?;
                Ok(result)
            }
        }
    }

    fn prefetch(&self, id: &ResourceId) -> Option<DownloadRequest> {
        if !self.is_prefetchable() {
            return None;
        }
        let mut request = DownloadRequest::new(id.to_string(), &self.source, self.path())
            .backup(self.backups());
        if let Some(mode) = self.mode {
            request = request.mode(mode);
        }
        if let Some(checksum) = &self.checksum {
            request = request.checksum(checksum);
        }
        for (name, value) in &self.headers {
            request = request.header(name, value);
        }
        Some(request)
    }
}
