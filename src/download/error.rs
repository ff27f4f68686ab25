use thiserror::Error;

use crate::remote::RemoteError;

/// Why a single download did not land on disk.
///
/// None of these abort a sync pass: the downloader logs them and reports
/// failure to the scheduler, which moves on to the next item.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Remote error downloading {path}: {source}")]
    Remote { source: RemoteError, path: String },

    #[error("Disk error: {0}")]
    Disk(#[from] std::io::Error),

    #[error("Timed out after {secs}s downloading {path}")]
    Timeout { secs: u64, path: String },
}

impl DownloadError {
    /// Whether the remote object itself is gone, as opposed to a transfer
    /// or local failure.
    pub fn is_missing_remote(&self) -> bool {
        matches!(
            self,
            DownloadError::Remote {
                source: RemoteError::NotFound(_) | RemoteError::MissingRendition { .. },
                ..
            }
        )
    }
}
