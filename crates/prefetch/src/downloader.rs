//! Single-transfer download logic.
//!
//! A transfer always lands in a staging location, never in the destination
//! the owning resource cares about. Moving the artifact into place, keeping
//! backups, and applying permissions belong to the resource.

use crate::error::{Error, Result};
use crate::transport::{Response, Transport};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tempfile::NamedTempFile;

/// Minimum spacing between progress publications.
pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

const CHUNK_SIZE: usize = 64 * 1024;

/// Parameters of one transfer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transfer {
    /// Source URL.
    pub url: String,
    /// Caller-supplied request headers.
    pub headers: Vec<(String, String)>,
    /// Where the downloaded artifact is staged.
    pub temp_path: PathBuf,
    /// Expected SHA-256 hex digest.
    pub checksum: Option<String>,
    /// Resume an existing partial file at `temp_path` from this offset.
    pub resume_from: Option<u64>,
    /// Send `If-None-Match` with this value.
    pub etag: Option<String>,
    /// Send `If-Modified-Since` with this time.
    pub modified_since: Option<SystemTime>,
}

impl Transfer {
    /// A plain GET of `url` staged at `temp_path`.
    pub fn new(url: impl Into<String>, temp_path: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            temp_path: temp_path.into(),
            ..Self::default()
        }
    }
}

/// How a transfer ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The full artifact is at `path`.
    Downloaded {
        /// Staged artifact.
        path: PathBuf,
        /// Size of the artifact.
        bytes: u64,
        /// ETag the server sent, for the next conditional request.
        etag: Option<String>,
    },
    /// The server answered 304; nothing was written.
    NotModified,
}

/// Performs transfers over a shared [`Transport`].
#[derive(Clone)]
pub struct Downloader {
    transport: Arc<dyn Transport>,
}

impl Downloader {
    /// Create a downloader over `transport`.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Run one transfer.
    ///
    /// `progress` receives `(bytes_downloaded, total_bytes)` no more often
    /// than every [`PROGRESS_INTERVAL`], plus once when the body is done.
    /// `total_bytes` is 0 when the server did not announce a length.
    pub fn fetch(&self, transfer: &Transfer, progress: &mut dyn FnMut(u64, u64)) -> Result<Outcome> {
        let mut headers = transfer.headers.clone();
        if let Some(etag) = &transfer.etag {
            headers.push(("If-None-Match".to_string(), etag.clone()));
        }
        if let Some(since) = transfer.modified_since {
            headers.push(("If-Modified-Since".to_string(), http_date(since)));
        }
        let resume_offset = transfer.resume_from.filter(|offset| *offset > 0);
        if let Some(offset) = resume_offset {
            headers.push(("Range".to_string(), format!("bytes={offset}-")));
        }

        let response = self.transport.get(&transfer.url, &headers)?;

        if let Some(offset) = resume_offset {
            if response.status != 206 {
                log::debug!(
                    "{} ignored Range (status {}), restarting from scratch",
                    transfer.url,
                    response.status
                );
                drop(response);
                remove_if_exists(&transfer.temp_path)?;
                let restart = Transfer {
                    resume_from: None,
                    ..transfer.clone()
                };
                return self.fetch(&restart, progress);
            }
            return self.append(transfer, response, offset, progress);
        }

        match response.status {
            304 => {
                log::debug!("{} not modified", transfer.url);
                Ok(Outcome::NotModified)
            }
            200..=299 => self.stage(transfer, response, progress),
            status => {
                remove_if_exists(&transfer.temp_path)?;
                Err(Error::BadStatus {
                    url: transfer.url.clone(),
                    status,
                })
            }
        }
    }

    /// Stream a full body into a fresh staging file, then move it to
    /// `temp_path`. The staging file removes itself on any early return.
    fn stage(
        &self,
        transfer: &Transfer,
        response: Response,
        progress: &mut dyn FnMut(u64, u64),
    ) -> Result<Outcome> {
        let dir = transfer
            .temp_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;

        let prefix = format!(
            ".{}.",
            transfer
                .temp_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        );
        let mut staging = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(".tmp")
            .tempfile_in(&dir)
            .map_err(|e| Error::io(&dir, e))?;

        let total = response.content_length.unwrap_or(0);
        let etag = response.header("etag").map(str::to_string);
        let staging_path = staging.path().to_path_buf();
        let copied = copy_body(
            response.body,
            staging.as_file_mut(),
            &staging_path,
            0,
            total,
            progress,
        );
        let bytes = match copied {
            Ok(bytes) => bytes,
            Err(err) => {
                keep_partial(staging, &transfer.temp_path);
                return Err(err);
            }
        };

        if let Some(expected) = &transfer.checksum {
            verify_checksum(staging.path(), expected)?;
        }

        staging
            .persist(&transfer.temp_path)
            .map_err(|e| Error::io(&transfer.temp_path, e.error))?;

        Ok(Outcome::Downloaded {
            path: transfer.temp_path.clone(),
            bytes,
            etag,
        })
    }

    /// Append a 206 body to the partial file already at `temp_path`.
    fn append(
        &self,
        transfer: &Transfer,
        response: Response,
        offset: u64,
        progress: &mut dyn FnMut(u64, u64),
    ) -> Result<Outcome> {
        let path = &transfer.temp_path;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| Error::io(path, e))?;

        let total = response.content_length.map_or(0, |len| len + offset);
        let etag = response.header("etag").map(str::to_string);
        let bytes = copy_body(response.body, &mut file, path, offset, total, progress)?;
        drop(file);

        if let Some(expected) = &transfer.checksum
            && let Err(err) = verify_checksum(path, expected)
        {
            remove_if_exists(path)?;
            return Err(err);
        }

        Ok(Outcome::Downloaded {
            path: path.clone(),
            bytes,
            etag,
        })
    }
}

/// Leave the bytes that did arrive at `temp_path` so a later transfer can
/// resume from them.
fn keep_partial(staging: NamedTempFile, temp_path: &Path) {
    let received = staging.as_file().metadata().map_or(0, |m| m.len());
    if received == 0 {
        return;
    }
    match staging.persist(temp_path) {
        Ok(_) => log::debug!("kept {received} bytes at {} for resume", temp_path.display()),
        Err(e) => log::debug!("could not keep partial {}: {}", temp_path.display(), e.error),
    }
}

/// Copy `body` into `out`, publishing progress at a bounded rate.
fn copy_body(
    mut body: Box<dyn Read + Send>,
    out: &mut File,
    out_path: &Path,
    start: u64,
    total: u64,
    progress: &mut dyn FnMut(u64, u64),
) -> Result<u64> {
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut written = start;
    let mut last_publish = Instant::now();

    loop {
        let n = match body.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::http(format!("reading body: {e}"), None)),
        };
        out.write_all(&buf[..n])
            .map_err(|e| Error::io(out_path, e))?;
        written += n as u64;

        if last_publish.elapsed() >= PROGRESS_INTERVAL {
            progress(written, total);
            last_publish = Instant::now();
        }
    }

    out.flush().map_err(|e| Error::io(out_path, e))?;
    progress(written, total.max(written));
    Ok(written)
}

/// SHA-256 of a file as lowercase hex.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| Error::io(path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf).map_err(|e| Error::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

fn verify_checksum(path: &Path, expected: &str) -> Result<()> {
    let actual = sha256_file(path)?;
    let expected = expected.trim().to_ascii_lowercase();
    if actual == expected {
        Ok(())
    } else {
        Err(Error::ChecksumMismatch { expected, actual })
    }
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::io(path, e)),
    }
}

/// Format a time as an RFC 7231 HTTP date.
pub fn http_date(time: SystemTime) -> String {
    DateTime::<Utc>::from(time)
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MockRoute, MockTransport};
    use tempfile::tempdir;

    const URL: &str = "https://example.com/artifact.bin";
    const BODY: &[u8] = b"the quick brown fox jumps over the lazy dog";

    fn sha256(data: &[u8]) -> String {
        format!("{:x}", Sha256::digest(data))
    }

    fn setup(route: MockRoute) -> (MockTransport, Downloader) {
        let mock = MockTransport::new();
        mock.add_route(URL, route);
        let downloader = Downloader::new(Arc::new(mock.clone()));
        (mock, downloader)
    }

    #[test]
    fn test_fresh_download_is_staged() {
        let dir = tempdir().unwrap();
        let temp = dir.path().join("downloads").join("artifact.part");
        let (_, downloader) = setup(MockRoute::new(BODY.to_vec()));

        let mut last = (0, 0);
        let outcome = downloader
            .fetch(&Transfer::new(URL, &temp), &mut |done, total| last = (done, total))
            .unwrap();

        assert_eq!(
            outcome,
            Outcome::Downloaded {
                path: temp.clone(),
                bytes: BODY.len() as u64,
                etag: None,
            }
        );
        assert_eq!(fs::read(&temp).unwrap(), BODY);
        assert_eq!(last, (BODY.len() as u64, BODY.len() as u64));
        // Only the staged artifact remains; the staging file was renamed.
        assert_eq!(fs::read_dir(temp.parent().unwrap()).unwrap().count(), 1);
    }

    #[test]
    fn test_not_modified_leaves_destination_alone() {
        let dir = tempdir().unwrap();
        let destination = dir.path().join("artifact.bin");
        fs::write(&destination, b"old contents").unwrap();
        let temp = dir.path().join("artifact.part");
        let (mock, downloader) = setup(MockRoute::new(BODY.to_vec()).with_etag("\"abc\""));

        let transfer = Transfer {
            etag: Some("\"abc\"".to_string()),
            modified_since: Some(SystemTime::UNIX_EPOCH),
            ..Transfer::new(URL, &temp)
        };
        let outcome = downloader.fetch(&transfer, &mut |_, _| {}).unwrap();

        assert_eq!(outcome, Outcome::NotModified);
        assert_eq!(fs::read(&destination).unwrap(), b"old contents");
        assert!(!temp.exists());
        let sent = &mock.requests()[0].headers;
        assert!(sent.iter().any(|(k, v)| k == "If-Modified-Since" && v == "Thu, 01 Jan 1970 00:00:00 GMT"));
    }

    #[test]
    fn test_resume_appends_on_206() {
        let dir = tempdir().unwrap();
        let temp = dir.path().join("artifact.part");
        fs::write(&temp, &BODY[..10]).unwrap();
        let (mock, downloader) = setup(MockRoute::new(BODY.to_vec()));

        let transfer = Transfer {
            resume_from: Some(10),
            checksum: Some(sha256(BODY)),
            ..Transfer::new(URL, &temp)
        };
        downloader.fetch(&transfer, &mut |_, _| {}).unwrap();

        assert_eq!(fs::read(&temp).unwrap(), BODY);
        assert_eq!(mock.request_count(URL), 1);
        let sent = &mock.requests()[0].headers;
        assert!(sent.iter().any(|(k, v)| k == "Range" && v == "bytes=10-"));
    }

    #[test]
    fn test_resume_ignored_by_server_restarts_cleanly() {
        let dir = tempdir().unwrap();
        let temp = dir.path().join("artifact.part");
        // A stale partial that does not even match the real prefix.
        fs::write(&temp, b"XXXXXXXXXX").unwrap();
        let (mock, downloader) = setup(MockRoute::new(BODY.to_vec()).ignoring_range());

        let transfer = Transfer {
            resume_from: Some(10),
            ..Transfer::new(URL, &temp)
        };
        downloader.fetch(&transfer, &mut |_, _| {}).unwrap();

        let fresh_dir = tempdir().unwrap();
        let fresh = fresh_dir.path().join("fresh.part");
        downloader
            .fetch(&Transfer::new(URL, &fresh), &mut |_, _| {})
            .unwrap();

        assert_eq!(fs::read(&temp).unwrap(), fs::read(&fresh).unwrap());
        assert_eq!(fs::read(&temp).unwrap(), BODY);
        // First ranged attempt, then the full restart, then the fresh one.
        assert_eq!(mock.request_count(URL), 3);
        let restart = &mock.requests()[1].headers;
        assert!(!restart.iter().any(|(k, _)| k == "Range"));
    }

    #[test]
    fn test_dropped_connection_keeps_partial_for_resume() {
        let dir = tempdir().unwrap();
        let temp = dir.path().join("artifact.part");
        let (_, downloader) = setup(MockRoute::new(BODY.to_vec()).dropping_after(10));

        assert!(downloader.fetch(&Transfer::new(URL, &temp), &mut |_, _| {}).is_err());
        assert_eq!(fs::read(&temp).unwrap(), &BODY[..10]);
        // No stray staging files next to the partial.
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_checksum_mismatch_discards_artifact() {
        let dir = tempdir().unwrap();
        let destination = dir.path().join("artifact.bin");
        fs::write(&destination, b"previous").unwrap();
        let temp = dir.path().join("staging").join("artifact.part");
        let (_, downloader) = setup(MockRoute::new(BODY.to_vec()));

        let transfer = Transfer {
            checksum: Some(sha256(b"something else")),
            ..Transfer::new(URL, &temp)
        };
        let err = downloader.fetch(&transfer, &mut |_, _| {}).unwrap_err();

        assert!(matches!(err, Error::ChecksumMismatch { .. }));
        assert!(!temp.exists());
        assert_eq!(fs::read_dir(temp.parent().unwrap()).unwrap().count(), 0);
        assert_eq!(fs::read(&destination).unwrap(), b"previous");
    }

    #[test]
    fn test_checksum_match_is_case_insensitive() {
        let dir = tempdir().unwrap();
        let temp = dir.path().join("artifact.part");
        let (_, downloader) = setup(MockRoute::new(BODY.to_vec()));

        let transfer = Transfer {
            checksum: Some(sha256(BODY).to_uppercase()),
            ..Transfer::new(URL, &temp)
        };
        assert!(downloader.fetch(&transfer, &mut |_, _| {}).is_ok());
    }

    #[test]
    fn test_bad_status_is_an_error() {
        let dir = tempdir().unwrap();
        let temp = dir.path().join("artifact.part");
        fs::write(&temp, b"leftover").unwrap();
        let (_, downloader) = setup(MockRoute::status(500));

        let err = downloader
            .fetch(&Transfer::new(URL, &temp), &mut |_, _| {})
            .unwrap_err();

        assert_eq!(err.status(), Some(500));
        assert!(!temp.exists());
    }

    #[test]
    fn test_http_date_format() {
        let time = SystemTime::UNIX_EPOCH + Duration::from_secs(784_111_777);
        assert_eq!(http_date(time), "Sun, 06 Nov 1994 08:49:37 GMT");
    }
}
