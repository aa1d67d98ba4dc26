//! File system helpers with atomic write semantics.
//!
//! Writes go to a uniquely named temporary file in the destination directory,
//! are synced to disk, and are then renamed over the target. Readers never
//! observe a partially written file, and concurrent writers of the same path
//! never share a temporary file.

use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Ensures a directory exists, creating it and all parents if needed.
///
/// Fails if the path exists but is not a directory.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory: {}", path.display()))?;
    } else if !path.is_dir() {
        return Err(anyhow::anyhow!("Path exists but is not a directory: {}", path.display()));
    }
    Ok(())
}

/// Atomically writes bytes to a file using a write-then-rename strategy.
///
/// 1. Creates the parent directory if needed
/// 2. Writes the content to a temporary file next to the target
/// 3. Syncs the temporary file to disk
/// 4. Renames it over the target path
///
/// # Examples
///
/// ```rust,no_run
/// use armforge::utils::fs::atomic_write;
/// use std::path::Path;
///
/// # fn example() -> anyhow::Result<()> {
/// atomic_write(Path::new("out/core.json"), b"{}")?;
/// # Ok(())
/// # }
/// ```
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    ensure_dir(&parent)?;

    let mut temp = tempfile::Builder::new()
        .prefix(".armforge-")
        .suffix(".tmp")
        .tempfile_in(&parent)
        .with_context(|| format!("Failed to create temp file in: {}", parent.display()))?;

    temp.write_all(content)
        .with_context(|| format!("Failed to write temp file for: {}", path.display()))?;
    temp.as_file().sync_all().with_context(|| "Failed to sync file to disk")?;

    temp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to rename temp file to: {}", path.display()))?;

    Ok(())
}

/// Writes multiple files atomically in parallel.
///
/// Each file is written with [`atomic_write`] on the blocking thread pool.
/// All writes are attempted; the first failure is reported after every task
/// has finished.
pub async fn atomic_write_multiple(files: Vec<(PathBuf, Vec<u8>)>) -> Result<()> {
    if files.is_empty() {
        return Ok(());
    }

    let tasks: Vec<_> = files
        .into_iter()
        .map(|(path, content)| {
            tokio::task::spawn_blocking(move || {
                atomic_write(&path, &content).with_context(|| format!("Failed to write {}", path.display()))
            })
        })
        .collect();

    let mut first_error = None;
    for result in futures::future::join_all(tasks).await {
        let outcome = result.context("File write task panicked").and_then(|r| r);
        if let Err(e) = outcome
            && first_error.is_none()
        {
            first_error = Some(e);
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Whether `name` can be used as a single path component of generated
/// output: non-empty, no separators or control characters, and no leading
/// `.` (which also rules out `.` and `..`).
pub fn is_safe_file_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.chars().any(|c| c == '/' || c == '\\' || c.is_control())
}

/// Moves every file below `staging` into the same relative location under
/// `destination`, replacing existing files.
///
/// Returns the destination paths in walk order.
pub fn promote_dir(staging: &Path, destination: &Path) -> Result<Vec<PathBuf>> {
    let mut promoted = Vec::new();

    for entry in WalkDir::new(staging).sort_by_file_name() {
        let entry = entry
            .with_context(|| format!("Failed to read staging directory: {}", staging.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry.path().strip_prefix(staging).with_context(|| {
            format!("Staged file outside staging directory: {}", entry.path().display())
        })?;
        let target = destination.join(relative);
        if let Some(parent) = target.parent() {
            ensure_dir(parent)?;
        }
        fs::rename(entry.path(), &target)
            .with_context(|| format!("Failed to move staged file to: {}", target.display()))?;
        promoted.push(target);
    }

    Ok(promoted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_atomic_write_creates_parents() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a/b/c.json");

        atomic_write(&path, b"{\"ok\":true}").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"{\"ok\":true}");
    }

    #[test]
    fn test_atomic_write_replaces_and_leaves_no_temp_files() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("file.txt");

        atomic_write(&path, b"first").unwrap();
        atomic_write(&path, b"second").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
        let leftovers: Vec<_> = fs::read_dir(temp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_safe_file_names() {
        assert!(is_safe_file_name("shop-core"));
        assert!(is_safe_file_name("orders.v2"));
        for name in ["", ".", "..", "../escaped", "a/b", "a\\b", ".hidden", "tab\there"] {
            assert!(!is_safe_file_name(name), "{name:?}");
        }
    }

    #[test]
    fn test_ensure_dir_rejects_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("file");
        fs::write(&path, "x").unwrap();

        assert!(ensure_dir(&path).is_err());
    }

    #[tokio::test]
    async fn test_atomic_write_multiple() {
        let temp = TempDir::new().unwrap();
        let files = vec![
            (temp.path().join("one.json"), b"1".to_vec()),
            (temp.path().join("nested/two.json"), b"2".to_vec()),
        ];

        atomic_write_multiple(files).await.unwrap();

        assert_eq!(fs::read(temp.path().join("one.json")).unwrap(), b"1");
        assert_eq!(fs::read(temp.path().join("nested/two.json")).unwrap(), b"2");
    }

    #[test]
    fn test_promote_dir_moves_tree() {
        let temp = TempDir::new().unwrap();
        let staging = temp.path().join("staging");
        let dest = temp.path().join("out");
        atomic_write(&staging.join("core.json"), b"{}").unwrap();
        atomic_write(&staging.join("functions/api/index.js"), b"code").unwrap();

        let promoted = promote_dir(&staging, &dest).unwrap();

        assert_eq!(promoted.len(), 2);
        assert!(dest.join("core.json").exists());
        assert_eq!(fs::read(dest.join("functions/api/index.js")).unwrap(), b"code");
        assert!(!staging.join("core.json").exists());
    }
}
