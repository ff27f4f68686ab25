//! Drive driver: one recursive traversal rooted at the drive's top-level
//! listing, mirrored under the destination directory.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::Context;
use futures_util::future::{BoxFuture, FutureExt};
use indicatif::ProgressBar;
use tokio_util::sync::CancellationToken;

use crate::download::change::{is_up_to_date, RemoteMeta};
use crate::download::download;
use crate::download::paths::is_safe_component;
use crate::remote::{DriveItem, DriveService, ItemKind};

use super::filter::{file_wanted, folder_wanted, parent_folder_wanted};
use super::reconcile::{reconcile_blocking, ReconcileMode};
use super::scheduler::{Scheduler, DEFAULT_WORKERS};
use super::{create_progress_bar, KeptSet, SyncReport, SyncStats};

/// Children of one folder are dispatched in batches of this size.
const DRIVE_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone)]
pub struct DriveSyncConfig {
    pub destination: PathBuf,
    pub workers: usize,
    pub remove_obsolete: bool,
    /// Folders to mirror, relative to the drive root. Empty mirrors all.
    pub folders: Vec<String>,
    /// File suffixes to mirror, matched case-insensitively. Empty mirrors all.
    pub file_extensions: Vec<String>,
    pub timeout: Option<Duration>,
    pub no_progress_bar: bool,
}

impl DriveSyncConfig {
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        Self {
            destination: destination.into(),
            workers: DEFAULT_WORKERS,
            remove_obsolete: false,
            folders: Vec::new(),
            file_extensions: Vec::new(),
            timeout: None,
            no_progress_bar: true,
        }
    }
}

/// State shared by every task of one drive pass.
struct DrivePass<'a> {
    drive: &'a dyn DriveService,
    config: &'a DriveSyncConfig,
    root: PathBuf,
    scheduler: Scheduler,
    kept: KeptSet,
    stats: SyncStats,
    progress: ProgressBar,
}

impl DrivePass<'_> {
    fn sync_directory(&self, items: Vec<DriveItem>, local_dir: PathBuf) -> BoxFuture<'_, ()> {
        async move {
            self.scheduler
                .run_batched(items, DRIVE_BATCH_SIZE, |item| {
                    self.sync_item(item, local_dir.clone())
                })
                .await;
        }
        .boxed()
    }

    fn sync_item(&self, item: DriveItem, local_dir: PathBuf) -> BoxFuture<'_, ()> {
        async move {
            if !is_safe_component(&item.name) {
                self.progress.suspend(|| {
                    tracing::warn!(
                        "Skipping remote item with unusable name {:?} in {}",
                        item.name,
                        local_dir.display()
                    )
                });
                self.stats.record_skipped();
                return;
            }
            let local_path = local_dir.join(&item.name);
            let kind = item.kind;
            match kind {
                kind if kind.is_container() => self.process_folder(item, local_path).await,
                ItemKind::File => self.process_file(item, &local_dir, local_path).await,
                _ => tracing::debug!("Ignoring {} of unknown kind", local_path.display()),
            }
        }
        .boxed()
    }

    async fn process_folder(&self, item: DriveItem, local_path: PathBuf) {
        if !folder_wanted(&self.config.folders, &self.root, &local_path) {
            tracing::debug!("Skipping the unwanted folder {} ...", local_path.display());
            return;
        }

        if let Err(e) = tokio::fs::create_dir_all(&local_path).await {
            self.progress.suspend(|| {
                tracing::error!("Failed to create {}: {}", local_path.display(), e)
            });
            self.stats.record_failed();
            return;
        }
        self.kept.insert(local_path.clone());

        // The slot covers the listing only; children acquire their own.
        let children = match self.scheduler.gated(self.drive.list_children(&item)).await {
            Ok(children) => children,
            Err(e) => {
                self.progress.suspend(|| {
                    tracing::error!("Failed to list {}: {}", local_path.display(), e)
                });
                self.stats.record_listing_failure();
                return;
            }
        };
        self.sync_directory(children, local_path).await;
    }

    async fn process_file(&self, item: DriveItem, local_dir: &Path, local_path: PathBuf) {
        if !parent_folder_wanted(&self.config.folders, &self.root, local_dir)
            || !file_wanted(&self.config.file_extensions, &local_path)
        {
            return;
        }

        self.progress.inc_length(1);
        self.kept.insert(local_path.clone());

        let meta = RemoteMeta {
            size: item.size,
            modified: item.modified,
        };
        let outcome = self
            .scheduler
            .gated(async {
                if is_up_to_date(&meta, &local_path).await {
                    return None;
                }
                Some(
                    download(
                        self.drive.open(&item),
                        &local_path,
                        item.modified,
                        self.config.timeout,
                    )
                    .await,
                )
            })
            .await;

        match outcome {
            None => self.stats.record_unchanged(),
            Some(true) => self.stats.record_downloaded(),
            Some(false) => self.stats.record_failed(),
        }
        self.progress.inc(1);
    }
}

/// Mirror the whole drive into `config.destination`.
///
/// Only setup failures are returned as errors: an unusable destination or
/// a failed root listing. Everything below the root is contained per item.
pub async fn sync_drive(
    drive: &dyn DriveService,
    config: &DriveSyncConfig,
    shutdown: CancellationToken,
) -> anyhow::Result<SyncReport> {
    let started = Instant::now();
    let root = std::path::absolute(&config.destination).with_context(|| {
        format!(
            "Failed to resolve destination {}",
            config.destination.display()
        )
    })?;
    tokio::fs::create_dir_all(&root)
        .await
        .with_context(|| format!("Failed to create destination {}", root.display()))?;

    tracing::info!("Syncing drive into {} ...", root.display());
    let top = drive.root().await.context("Failed to list the drive root")?;

    let pass = DrivePass {
        drive,
        config,
        root: root.clone(),
        scheduler: Scheduler::new(config.workers, shutdown.clone()),
        kept: KeptSet::new(),
        stats: SyncStats::default(),
        progress: create_progress_bar(config.no_progress_bar),
    };
    pass.sync_directory(top, root.clone()).await;
    pass.progress.finish_and_clear();

    let mut report = SyncReport::new(&pass.stats, pass.kept.snapshot(), shutdown.is_cancelled());
    if config.remove_obsolete {
        if report.is_complete() {
            report.removed = reconcile_blocking(
                root,
                report.kept.clone(),
                ReconcileMode::FilesAndDirectories,
            )
            .await;
        } else {
            tracing::warn!("Drive pass incomplete, not removing obsolete files");
        }
    }

    report.log_summary("Drive", started.elapsed());
    Ok(report)
}
