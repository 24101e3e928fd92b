//! Filesystem helpers shared by every writer in the archive.
//!
//! Everything that lands in the archive goes through [`write_atomic`] or is
//! renamed into place from a temp path built by [`temp_path_for`], so an
//! interrupted run never leaves a half-written file under its final name.

use std::path::{Path, PathBuf};

use crate::error::{ArchiveError, Result};

/// Sibling temp path used while `path` is being written.
///
/// The temp file lives in the same directory so the final rename stays on one
/// filesystem.
#[must_use]
pub fn temp_path_for(path: &Path, suffix: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.{suffix}"))
}

/// Write `contents` to `path` via a temp file and rename.
///
/// # Errors
///
/// Returns [`ArchiveError::Filesystem`] if the parent directory cannot be
/// created or the write or rename fails.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ArchiveError::filesystem(parent, e))?;
        }
    }

    let tmp = temp_path_for(path, "tmp");
    if let Err(e) = tokio::fs::write(&tmp, contents).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(ArchiveError::filesystem(&tmp, e));
    }
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(ArchiveError::filesystem(path, e));
    }
    Ok(())
}

/// Whether `path` is a regular file with at least one byte.
pub async fn is_nonempty_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}

/// Find every file named `file_name` exactly `depth` directory levels below
/// `root`.
///
/// Unreadable directories are skipped. Results are sorted by path.
///
/// # Errors
///
/// Returns an error only if `root` exists but cannot be read.
pub async fn find_files_at_depth(root: &Path, depth: usize, file_name: &str) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    if !root.exists() {
        return Ok(found);
    }

    // Async recursion is not allowed without boxing; use an explicit stack.
    let mut stack = vec![(root.to_path_buf(), 0usize)];
    while let Some((dir, level)) = stack.pop() {
        if level == depth {
            let candidate = dir.join(file_name);
            if is_nonempty_file(&candidate).await {
                found.push(candidate);
            }
            continue;
        }

        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if level == 0 => return Err(ArchiveError::filesystem(&dir, e)),
            Err(e) => {
                tracing::debug!(path = %dir.display(), error = %e, "Skipping unreadable directory");
                continue;
            }
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ArchiveError::filesystem(&dir, e))?
        {
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            if is_dir {
                stack.push((entry.path(), level + 1));
            }
        }
    }

    found.sort();
    Ok(found)
}
