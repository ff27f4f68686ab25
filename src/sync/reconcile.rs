//! Obsolete-entry removal.
//!
//! Walks the destination tree after a complete pass and permanently deletes
//! every entry whose absolute path is not in the kept set. There is no
//! confirmation step and no trash.

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileMode {
    /// Delete unkept files, and unkept directories with their contents.
    FilesAndDirectories,
    /// Delete unkept files only; directories are walked but never removed.
    FilesOnly,
}

/// Delete everything under `root` that is not in `kept`, returning the
/// removed paths. A removed directory is reported once, not per child.
pub fn reconcile(root: &Path, kept: &HashSet<PathBuf>, mode: ReconcileMode) -> HashSet<PathBuf> {
    let root = std::path::absolute(root).unwrap_or_else(|_| root.to_path_buf());
    let mut removed = HashSet::new();
    let mut pending = vec![root];

    while let Some(dir) = pending.pop() {
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                if e.kind() != ErrorKind::NotFound {
                    tracing::warn!("Cannot list {}: {}", dir.display(), e);
                }
                continue;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);

            if kept.contains(&path) {
                if is_dir {
                    pending.push(path);
                }
                continue;
            }

            if is_dir {
                match mode {
                    ReconcileMode::FilesOnly => pending.push(path),
                    ReconcileMode::FilesAndDirectories => {
                        tracing::info!("Removing {} ...", path.display());
                        match std::fs::remove_dir_all(&path) {
                            Ok(()) => {
                                removed.insert(path);
                            }
                            Err(e) => {
                                tracing::error!("Failed to remove {}: {}", path.display(), e)
                            }
                        }
                    }
                }
                continue;
            }

            tracing::info!("Removing {} ...", path.display());
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    removed.insert(path);
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    removed.insert(path);
                }
                Err(e) => tracing::warn!("Failed to remove {}: {}", path.display(), e),
            }
        }
    }

    removed
}

/// Run [`reconcile`] off the async executor.
pub async fn reconcile_blocking(
    root: PathBuf,
    kept: HashSet<PathBuf>,
    mode: ReconcileMode,
) -> HashSet<PathBuf> {
    match tokio::task::spawn_blocking(move || reconcile(&root, &kept, mode)).await {
        Ok(removed) => removed,
        Err(e) => {
            tracing::error!("Obsolete file removal task failed: {}", e);
            HashSet::new()
        }
    }
}
