//! Incremental sync engine.
//!
//! A pass expands the remote tree into batches of tasks, runs each batch
//! under a shared concurrency gate, records every visited local path in a
//! [`KeptSet`], and finally hands that set to the reconciler to delete local
//! entries the remote no longer has.

pub mod drive;
pub mod filter;
pub mod photos;
pub mod reconcile;
pub mod scheduler;
#[cfg(test)]
pub(crate) mod testutil;

pub use drive::{sync_drive, DriveSyncConfig};
pub use photos::{sync_photos, PhotosSyncConfig};

use std::collections::HashSet;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

/// Local paths confirmed to correspond to current remote items during one
/// pass. Cheap to clone; all clones share the same set.
#[derive(Debug, Clone, Default)]
pub struct KeptSet {
    inner: Arc<Mutex<HashSet<PathBuf>>>,
}

impl KeptSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<PathBuf>> {
        // A panicking inserter cannot leave the set half-updated.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn insert(&self, path: PathBuf) {
        self.lock().insert(path);
    }

    #[cfg(test)]
    pub fn contains(&self, path: &std::path::Path) -> bool {
        self.lock().contains(path)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn snapshot(&self) -> HashSet<PathBuf> {
        self.lock().clone()
    }
}

/// Per-pass counters, shared by every task of the pass.
#[derive(Debug, Default)]
pub struct SyncStats {
    downloaded: AtomicUsize,
    unchanged: AtomicUsize,
    failed: AtomicUsize,
    skipped: AtomicUsize,
    listing_failures: AtomicUsize,
}

impl SyncStats {
    pub fn record_downloaded(&self) {
        self.downloaded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unchanged(&self) {
        self.unchanged.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_listing_failure(&self) {
        self.listing_failures.fetch_add(1, Ordering::Relaxed);
    }
}

/// Outcome of one top-level sync pass.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub kept: HashSet<PathBuf>,
    pub removed: HashSet<PathBuf>,
    pub downloaded: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub skipped: usize,
    pub listing_failures: usize,
    pub interrupted: bool,
}

impl SyncReport {
    fn new(stats: &SyncStats, kept: HashSet<PathBuf>, interrupted: bool) -> Self {
        Self {
            kept,
            removed: HashSet::new(),
            downloaded: stats.downloaded.load(Ordering::Relaxed),
            unchanged: stats.unchanged.load(Ordering::Relaxed),
            failed: stats.failed.load(Ordering::Relaxed),
            skipped: stats.skipped.load(Ordering::Relaxed),
            listing_failures: stats.listing_failures.load(Ordering::Relaxed),
            interrupted,
        }
    }

    /// Whether the kept set covers the whole remote tree, so that deleting
    /// everything outside it is safe.
    pub fn is_complete(&self) -> bool {
        !self.interrupted && self.listing_failures == 0
    }

    pub(crate) fn log_summary(&self, label: &str, elapsed: Duration) {
        tracing::info!("── {} Summary ──", label);
        tracing::info!(
            "  {} downloaded, {} unchanged, {} failed, {} skipped",
            self.downloaded,
            self.unchanged,
            self.failed,
            self.skipped
        );
        if self.listing_failures > 0 {
            tracing::warn!("  {} remote listings failed", self.listing_failures);
        }
        if !self.removed.is_empty() {
            tracing::info!("  {} obsolete entries removed", self.removed.len());
        }
        tracing::info!("  elapsed: {}", format_duration(elapsed));
    }
}

/// Progress bar over leaf tasks. Its length grows as containers are listed.
///
/// Hidden when the user passed `--no-progress-bar` or stdout is not a TTY.
pub(crate) fn create_progress_bar(no_progress_bar: bool) -> ProgressBar {
    if no_progress_bar || !std::io::stdout().is_terminal() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::with_template(
        "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
    ) {
        pb.set_style(style.progress_chars("=> "));
    }
    pb
}

fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let mins = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, mins, secs)
    } else if mins > 0 {
        format!("{}m {:02}s", mins, secs)
    } else {
        format!("{}s", secs)
    }
}
