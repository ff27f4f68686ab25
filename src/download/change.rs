//! Size and modification-time change detection.
//!
//! The local filesystem is the only cache the engine keeps: a local file is
//! current iff its whole-second mtime and its size match the remote metadata.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};

/// The remote side of a comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteMeta {
    pub size: Option<u64>,
    pub modified: Option<DateTime<Utc>>,
}

/// Whole seconds since the epoch, flooring pre-epoch times.
fn unix_seconds(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(e) => {
            let before = e.duration();
            let secs = before.as_secs() as i64;
            if before.subsec_nanos() > 0 {
                -secs - 1
            } else {
                -secs
            }
        }
    }
}

/// Size equality, treating an empty file and an unknown remote size as the
/// same thing.
///
/// The remote reports no size for some empty files. This rule exists only
/// for that quirk; it must not be widened to other sizes.
pub fn sizes_match(local: Option<u64>, remote: Option<u64>) -> bool {
    local == remote
        || (local == Some(0) && remote.is_none())
        || (local.is_none() && remote == Some(0))
}

/// Whether `local_path` already holds the current copy of the remote item.
///
/// A missing path, or a path that is not a regular file, is never current.
/// When the remote carries no modification time only sizes are compared.
pub async fn is_up_to_date(remote: &RemoteMeta, local_path: &Path) -> bool {
    let meta = match tokio::fs::metadata(local_path).await {
        Ok(m) if m.is_file() => m,
        _ => {
            tracing::debug!("File {} does not exist locally.", local_path.display());
            return false;
        }
    };

    let local_mtime = meta.modified().ok().map(unix_seconds);
    let remote_mtime = remote.modified.map(|t| t.timestamp());
    let local_size = Some(meta.len());

    let times_match = match remote_mtime {
        Some(_) => local_mtime == remote_mtime,
        None => true,
    };

    if times_match && sizes_match(local_size, remote.size) {
        tracing::debug!(
            "No changes detected. Skipping the file {} ...",
            local_path.display()
        );
        return true;
    }

    tracing::debug!(
        local_mtime = ?local_mtime,
        remote_mtime = ?remote_mtime,
        local_size = ?local_size,
        remote_size = ?remote.size,
        "Changes detected for {}",
        local_path.display()
    );
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::set_file_mtime;
    use chrono::TimeZone;
    use std::time::Duration;

    fn remote(size: Option<u64>, secs: i64) -> RemoteMeta {
        RemoteMeta {
            size,
            modified: Some(Utc.timestamp_opt(secs, 0).unwrap()),
        }
    }

    fn local_file(dir: &Path, name: &str, len: usize, mtime: i64) -> std::path::PathBuf {
        let p = dir.join(name);
        std::fs::write(&p, vec![b'x'; len]).unwrap();
        set_file_mtime(&p, mtime).unwrap();
        p
    }

    #[tokio::test]
    async fn matching_size_and_time_is_current() {
        let dir = tempfile::tempdir().unwrap();
        let p = local_file(dir.path(), "a.bin", 100, 1_700_000_000);
        assert!(is_up_to_date(&remote(Some(100), 1_700_000_000), &p).await);
    }

    #[tokio::test]
    async fn any_single_difference_is_stale() {
        let dir = tempfile::tempdir().unwrap();
        let p = local_file(dir.path(), "a.bin", 100, 1_700_000_000);
        assert!(!is_up_to_date(&remote(Some(101), 1_700_000_000), &p).await);
        assert!(!is_up_to_date(&remote(Some(100), 1_700_000_001), &p).await);
        assert!(!is_up_to_date(&remote(None, 1_700_000_000), &p).await);
    }

    #[tokio::test]
    async fn missing_file_is_stale() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("absent.bin");
        assert!(!is_up_to_date(&remote(Some(0), 0), &p).await);
    }

    #[tokio::test]
    async fn directory_is_stale() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!is_up_to_date(&remote(None, 0), dir.path()).await);
    }

    #[tokio::test]
    async fn empty_file_matches_unknown_remote_size() {
        let dir = tempfile::tempdir().unwrap();
        let p = local_file(dir.path(), "empty.bin", 0, 1_700_000_000);
        assert!(is_up_to_date(&remote(None, 1_700_000_000), &p).await);
    }

    #[test]
    fn size_equivalence_is_symmetric_and_narrow() {
        assert!(sizes_match(Some(0), None));
        assert!(sizes_match(None, Some(0)));
        assert!(sizes_match(Some(7), Some(7)));
        assert!(sizes_match(None, None));
        assert!(!sizes_match(Some(1), None));
        assert!(!sizes_match(None, Some(1)));
    }

    #[tokio::test]
    async fn sub_second_remote_time_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let p = local_file(dir.path(), "a.bin", 3, 1_700_000_000);
        let meta = RemoteMeta {
            size: Some(3),
            modified: Some(Utc.timestamp_opt(1_700_000_000, 999_000_000).unwrap()),
        };
        assert!(is_up_to_date(&meta, &p).await);
    }

    #[tokio::test]
    async fn absent_remote_time_compares_size_only() {
        let dir = tempfile::tempdir().unwrap();
        let p = local_file(dir.path(), "a.bin", 5, 1_234);
        let meta = RemoteMeta {
            size: Some(5),
            modified: None,
        };
        assert!(is_up_to_date(&meta, &p).await);
    }

    #[test]
    fn unix_seconds_floors_before_epoch() {
        assert_eq!(unix_seconds(UNIX_EPOCH + Duration::from_millis(1500)), 1);
        assert_eq!(unix_seconds(UNIX_EPOCH - Duration::from_millis(1500)), -2);
        assert_eq!(unix_seconds(UNIX_EPOCH - Duration::from_secs(3)), -3);
    }
}
