//! Downloader: streams one remote object to a local path and stamps the
//! remote modification time onto it, so the next pass sees it as current.
//!
//! There is no retry. A failed download is logged and reported as `false`;
//! the next sync pass picks the item up again because its local copy is
//! still stale.

pub mod change;
pub mod error;
pub mod paths;

use std::fs::FileTimes;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::remote::{ChunkStream, RemoteError};
use error::DownloadError;

static PART_SEQ: AtomicU64 = AtomicU64::new(0);

/// Sibling temp file the bytes are streamed into before the final rename.
///
/// Every attempt gets its own name, so two tasks that resolve to the same
/// target never write into the same temp file.
fn part_path(download_path: &Path) -> PathBuf {
    let name = download_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let seq = PART_SEQ.fetch_add(1, Ordering::Relaxed);
    download_path.with_file_name(format!(".{name}.{}-{seq}.part", std::process::id()))
}

/// Download one remote object to `local_path`, overwriting any existing file.
///
/// `open` is the remote capability's stream opener; opening is part of the
/// attempt, so a missing remote object is a download failure like any other.
/// Returns whether the file landed on disk.
pub async fn download<F>(
    open: F,
    local_path: &Path,
    modified: Option<DateTime<Utc>>,
    timeout: Option<Duration>,
) -> bool
where
    F: Future<Output = Result<ChunkStream, RemoteError>>,
{
    tracing::info!("Downloading {} ...", local_path.display());
    let part = part_path(local_path);

    let attempt = attempt_download(open, local_path, &part, modified);
    let result = match timeout {
        Some(limit) => match tokio::time::timeout(limit, attempt).await {
            Ok(r) => r,
            Err(_) => Err(DownloadError::Timeout {
                secs: limit.as_secs(),
                path: local_path.display().to_string(),
            }),
        },
        None => attempt.await,
    };

    match result {
        Ok(bytes) => {
            tracing::debug!(size_bytes = bytes, "Downloaded {}", local_path.display());
            true
        }
        Err(e) => {
            let _ = fs::remove_file(&part).await;
            if e.is_missing_remote() {
                tracing::warn!("Failed to download {}: {}", local_path.display(), e);
            } else {
                tracing::error!("Failed to download {}: {}", local_path.display(), e);
            }
            false
        }
    }
}

/// Single download attempt. Returns the number of bytes written.
async fn attempt_download<F>(
    open: F,
    download_path: &Path,
    part_path: &Path,
    modified: Option<DateTime<Utc>>,
) -> Result<u64, DownloadError>
where
    F: Future<Output = Result<ChunkStream, RemoteError>>,
{
    let path_str = download_path.display().to_string();
    let mut stream = open.await.map_err(|e| DownloadError::Remote {
        source: e,
        path: path_str.clone(),
    })?;

    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(part_path)
        .await?;

    let mut bytes_written: u64 = 0;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| DownloadError::Remote {
            source: e,
            path: path_str.clone(),
        })?;
        file.write_all(&chunk).await?;
        bytes_written += chunk.len() as u64;
    }
    file.flush().await?;
    drop(file);

    // Stamped before the rename, so a target that fails to stamp is never
    // swapped in and still looks stale to the next pass.
    if let Some(modified) = modified {
        stamp_mtime(part_path.to_path_buf(), modified).await?;
    }
    fs::rename(part_path, download_path).await?;

    Ok(bytes_written)
}

async fn stamp_mtime(path: PathBuf, modified: DateTime<Utc>) -> Result<(), DownloadError> {
    let ts = modified.timestamp();
    tokio::task::spawn_blocking(move || set_file_mtime(&path, ts))
        .await
        .map_err(|e| DownloadError::Disk(std::io::Error::other(e)))??;
    Ok(())
}

/// Set the modification and access times of a file to the given Unix
/// timestamp. Negative timestamps (dates before 1970) are supported.
pub(crate) fn set_file_mtime(path: &Path, timestamp: i64) -> std::io::Result<()> {
    let time = if timestamp >= 0 {
        UNIX_EPOCH
            .checked_add(Duration::from_secs(timestamp as u64))
            .ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "timestamp out of range")
            })?
    } else {
        UNIX_EPOCH
            .checked_sub(Duration::from_secs(timestamp.unsigned_abs()))
            .unwrap_or(SystemTime::UNIX_EPOCH)
    };
    let times = FileTimes::new().set_modified(time).set_accessed(time);
    let file = std::fs::File::options().write(true).open(path)?;
    file.set_times(times)?;
    Ok(())
}
