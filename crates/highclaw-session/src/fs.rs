// SPDX-FileCopyrightText: 2026 Highclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Crash-safe file helpers for the session store.
//!
//! Writes go to a hidden temp file in the target directory, are fsynced, and
//! then renamed over the destination, so readers see either the old or the
//! new document and never a torn one.

use std::io;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

pub(crate) const DIR_MODE: u32 = 0o755;

/// Create `dir` and any missing parents.
pub(crate) async fn ensure_dir(dir: &Path) -> io::Result<()> {
    let mut builder = tokio::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(DIR_MODE);
    builder.create(dir).await
}

/// Atomically replace `path` with `bytes`, creating the parent directory.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8], file_mode: u32) -> io::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no parent"))?;
    ensure_dir(parent).await?;

    let tmp_path = temp_path_for(path)?;
    let result = write_then_rename(&tmp_path, path, bytes, file_mode).await;
    if result.is_err() {
        let _ = tokio::fs::remove_file(&tmp_path).await;
    }
    result
}

async fn write_then_rename(
    tmp_path: &Path,
    path: &Path,
    bytes: &[u8],
    file_mode: u32,
) -> io::Result<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(file_mode);

    let mut file = options.open(tmp_path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);

    // The open mode is filtered through the umask; pin the exact bits.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(tmp_path, std::fs::Permissions::from_mode(file_mode)).await?;
    }
    #[cfg(not(unix))]
    let _ = file_mode;

    tokio::fs::rename(tmp_path, path).await
}

fn temp_path_for(path: &Path) -> io::Result<PathBuf> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
    Ok(path.with_file_name(format!(".{name}.{}.tmp", uuid::Uuid::new_v4().simple())))
}

/// Remove `path`, treating a missing file as success. Returns whether it existed.
pub(crate) async fn remove_if_exists(path: &Path) -> io::Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Read `path`, mapping a missing file to `None`.
pub(crate) async fn read_optional(path: &Path) -> io::Result<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_atomic_creates_parents_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/file.json");

        write_atomic(&path, b"{\"a\":1}", 0o600).await.unwrap();
        write_atomic(&path, b"{\"a\":2}", 0o600).await.unwrap();

        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"{\"a\":2}");
        let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn write_atomic_applies_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secret.json");
        write_atomic(&path, b"{}", 0o600).await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn remove_and_read_tolerate_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.json");
        assert!(!remove_if_exists(&path).await.unwrap());
        assert!(read_optional(&path).await.unwrap().is_none());
    }
}
