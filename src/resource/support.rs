//! Filesystem and process helpers shared by resource kinds

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Deserializer};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

/// Default number of backups kept when a file is replaced
pub const DEFAULT_BACKUPS: usize = 5;

const BACKUP_MARKER: &str = ".sous-backup-";

// ============================================================================
// Permissions
// ============================================================================

/// Parse an octal permission string such as `"0644"` or `"755"`
pub fn parse_mode(s: &str) -> Result<u32> {
    let digits = s.trim().trim_start_matches("0o");
    let mode = u32::from_str_radix(digits, 8)
        .with_context(|| format!("Invalid file mode: {s}"))?;
    if mode > 0o7777 {
        bail!("File mode out of range: {s}");
    }
    Ok(mode)
}

/// Deserialize `mode` from an octal string or a TOML integer (`0o644`)
pub fn deserialize_mode<'de, D>(deserializer: D) -> std::result::Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(u32),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Number(n)) => Ok(Some(n)),
        Some(Raw::Text(s)) => parse_mode(&s).map(Some).map_err(serde::de::Error::custom),
    }
}

/// Permission bits of `path`, if it exists
#[cfg(unix)]
pub fn current_mode(path: &Path) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .ok()
        .map(|m| m.permissions().mode() & 0o7777)
}

#[cfg(not(unix))]
pub fn current_mode(_path: &Path) -> Option<u32> {
    None
}

/// Whether `path` needs its permissions changed to reach `mode`
pub fn mode_differs(path: &Path, mode: Option<u32>) -> bool {
    match (mode, current_mode(path)) {
        (Some(wanted), Some(actual)) => wanted != actual,
        _ => false,
    }
}

/// Apply permission bits, if any were requested
pub fn set_mode(path: &Path, mode: Option<u32>) -> Result<()> {
    let Some(mode) = mode else {
        return Ok(());
    };
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))
            .with_context(|| format!("Failed to set mode {mode:o} on {}", path.display()))?;
    }
    #[cfg(not(unix))]
    log::debug!("Ignoring mode {mode:o} for {} on this platform", path.display());
    Ok(())
}

// ============================================================================
// Files
// ============================================================================

/// Create the parent directory of `path`
pub fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| {
            format!("Failed to create parent directory: {}", parent.display())
        })?;
    }
    Ok(())
}

/// Replace `path` with `content` through a sibling temp file
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    ensure_parent(path)?;
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut staged = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to stage {}", path.display()))?;
    staged
        .write_all(content)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    staged
        .persist(path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

/// Move `from` onto `to`, copying when they are on different filesystems
pub fn move_into_place(from: &Path, to: &Path) -> Result<()> {
    ensure_parent(to)?;
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    copy_into_place(from, to)?;
    fs::remove_file(from).with_context(|| format!("Failed to remove {}", from.display()))?;
    Ok(())
}

/// Copy `from` to a temp file beside `to`, then rename it over `to`.
///
/// `to` keeps its old content until the copy is complete.
fn copy_into_place(from: &Path, to: &Path) -> Result<()> {
    let dir = to
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut staged = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to stage {}", to.display()))?;
    let mut source =
        fs::File::open(from).with_context(|| format!("Failed to open {}", from.display()))?;
    std::io::copy(&mut source, staged.as_file_mut())
        .with_context(|| format!("Failed to copy {} to {}", from.display(), to.display()))?;
    staged
        .persist(to)
        .with_context(|| format!("Failed to replace {}", to.display()))?;
    Ok(())
}

/// Copy `path` aside before it is replaced, keeping the newest `keep` copies.
///
/// Returns the backup path, or `None` when nothing was backed up.
pub fn backup(path: &Path, keep: usize) -> Result<Option<PathBuf>> {
    if keep == 0 || !path.is_file() {
        return Ok(None);
    }
    let Some(file_name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
        return Ok(None);
    };
    let stamp = chrono::Local::now().format("%Y%m%d%H%M%S%6f");
    let target = path.with_file_name(format!("{file_name}{BACKUP_MARKER}{stamp}"));
    fs::copy(path, &target)
        .with_context(|| format!("Failed to back up {}", path.display()))?;
    log::debug!("Backed up {} to {}", path.display(), target.display());

    prune_backups(path, keep)?;
    Ok(Some(target))
}

/// Backups of `path`, oldest first
pub fn list_backups(path: &Path) -> Result<Vec<PathBuf>> {
    let Some(file_name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
        return Ok(Vec::new());
    };
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let prefix = format!("{file_name}{BACKUP_MARKER}");

    let mut backups: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("Failed to list {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(&prefix))
        .map(|entry| entry.path())
        .collect();
    backups.sort();
    Ok(backups)
}

fn prune_backups(path: &Path, keep: usize) -> Result<()> {
    let backups = list_backups(path)?;
    let excess = backups.len().saturating_sub(keep);
    for old in &backups[..excess] {
        fs::remove_file(old).with_context(|| format!("Failed to prune {}", old.display()))?;
    }
    Ok(())
}

/// Log a unified diff of a pending content change
pub fn log_diff(path: &Path, old: &str, new: &str) {
    let name = path.display().to_string();
    let diff = similar::TextDiff::from_lines(old, new);
    log::info!(
        "{}",
        diff.unified_diff()
            .context_radius(2)
            .header(&name, &name)
    );
}

// ============================================================================
// Processes
// ============================================================================

/// A command that runs `line` through the platform shell
pub fn shell(line: &str) -> Command {
    #[cfg(windows)]
    {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", line]);
        cmd
    }
    #[cfg(not(windows))]
    {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", line]);
        cmd
    }
}

/// Run `cmd`, failing on spawn errors and non-zero exits
pub fn run_checked(cmd: &mut Command, what: &str) -> Result<Output> {
    let output = cmd
        .output()
        .with_context(|| format!("Failed to run {what}"))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("{what} failed ({}): {}", output.status, stderr.trim());
    }
    Ok(output)
}

/// Whether `cmd` runs and exits zero
pub fn succeeds(cmd: &mut Command) -> bool {
    cmd.output().map(|o| o.status.success()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_mode() {
        assert_eq!(parse_mode("0644").unwrap(), 0o644);
        assert_eq!(parse_mode("755").unwrap(), 0o755);
        assert_eq!(parse_mode("0o600").unwrap(), 0o600);
        assert!(parse_mode("999").is_err());
        assert!(parse_mode("77777").is_err());
    }

    #[test]
    fn test_deserialize_mode_forms() {
        #[derive(Deserialize)]
        struct Props {
            #[serde(default, deserialize_with = "deserialize_mode")]
            mode: Option<u32>,
        }

        let text: Props = toml::from_str("mode = \"0640\"").unwrap();
        assert_eq!(text.mode, Some(0o640));
        let number: Props = toml::from_str("mode = 0o755").unwrap();
        assert_eq!(number.mode, Some(0o755));
        let absent: Props = toml::from_str("").unwrap();
        assert_eq!(absent.mode, None);
    }

    #[test]
    fn test_write_atomic_creates_parents() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a").join("b").join("file.txt");
        write_atomic(&path, b"hello").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "hello");
    }

    #[test]
    fn test_backup_keeps_newest() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("app.conf");
        for i in 0..4 {
            fs::write(&path, format!("v{i}")).unwrap();
            backup(&path, 2).unwrap();
        }
        let backups = list_backups(&path).unwrap();
        assert_eq!(backups.len(), 2);
        assert_eq!(fs::read_to_string(&backups[1]).unwrap(), "v3");
    }

    #[test]
    fn test_backup_skips_missing_file_and_zero_keep() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("absent");
        assert!(backup(&path, 5).unwrap().is_none());
        fs::write(&path, "x").unwrap();
        assert!(backup(&path, 0).unwrap().is_none());
    }

    #[test]
    fn test_move_into_place() {
        let temp = TempDir::new().unwrap();
        let from = temp.path().join("staged");
        let to = temp.path().join("dest").join("final");
        fs::write(&from, "payload").unwrap();
        move_into_place(&from, &to).unwrap();
        assert!(!from.exists());
        assert_eq!(fs::read_to_string(&to).unwrap(), "payload");
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_into_place_swaps_inode() {
        use std::os::unix::fs::MetadataExt;

        let temp = TempDir::new().unwrap();
        let from = temp.path().join("staged");
        let to = temp.path().join("final");
        fs::write(&from, "new").unwrap();
        fs::write(&to, "old").unwrap();
        let before = fs::metadata(&to).unwrap().ino();

        copy_into_place(&from, &to).unwrap();
        assert_eq!(fs::read_to_string(&to).unwrap(), "new");
        assert_ne!(fs::metadata(&to).unwrap().ino(), before);
    }

    #[test]
    fn test_copy_into_place_keeps_destination_on_error() {
        let temp = TempDir::new().unwrap();
        let to = temp.path().join("final");
        fs::write(&to, "old").unwrap();

        assert!(copy_into_place(&temp.path().join("missing"), &to).is_err());
        assert_eq!(fs::read_to_string(&to).unwrap(), "old");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_move_into_place_across_filesystems() {
        use std::os::unix::fs::MetadataExt;

        let shm = Path::new("/dev/shm");
        let dest_dir = TempDir::new().unwrap();
        let Ok(stage_dir) = TempDir::new_in(shm) else {
            eprintln!("skipping: /dev/shm unavailable");
            return;
        };
        let from = stage_dir.path().join("staged");
        let to = dest_dir.path().join("final");
        fs::write(&from, "new").unwrap();
        fs::write(&to, "old").unwrap();
        let before = fs::metadata(&to).unwrap();
        if fs::metadata(&from).unwrap().dev() == before.dev() {
            eprintln!("skipping: /dev/shm is on the same filesystem");
            return;
        }

        move_into_place(&from, &to).unwrap();
        assert!(!from.exists());
        assert_eq!(fs::read_to_string(&to).unwrap(), "new");
        assert_ne!(fs::metadata(&to).unwrap().ino(), before.ino());
    }

    #[cfg(unix)]
    #[test]
    fn test_set_mode() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("f");
        fs::write(&path, "x").unwrap();
        set_mode(&path, Some(0o600)).unwrap();
        assert_eq!(current_mode(&path), Some(0o600));
        assert!(!mode_differs(&path, Some(0o600)));
        assert!(mode_differs(&path, Some(0o644)));
        assert!(!mode_differs(&path, None));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_checked_reports_stderr() {
        let err = run_checked(&mut shell("echo nope >&2; exit 3"), "probe").unwrap_err();
        assert!(err.to_string().contains("nope"));
        assert!(succeeds(&mut shell("true")));
        assert!(!succeeds(&mut shell("false")));
    }
}
