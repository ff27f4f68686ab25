//! Photos driver: flat albums of dated photos, each configured rendition
//! downloaded as its own task under `<destination>/<year>/<month>/`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use indicatif::ProgressBar;
use tokio_util::sync::CancellationToken;

use crate::download::change::{is_up_to_date, RemoteMeta};
use crate::download::download;
use crate::download::paths::{
    clean_filename, is_safe_component, legacy_original_path, local_photo_path,
};
use crate::remote::{PhotoAsset, PhotoLibrary};
use crate::types::Rendition;

use super::filter::file_wanted;
use super::reconcile::{reconcile_blocking, ReconcileMode};
use super::scheduler::{Scheduler, DEFAULT_WORKERS};
use super::{create_progress_bar, KeptSet, SyncReport, SyncStats};

/// Photos per batch, per worker.
const PHOTOS_BATCH_PER_WORKER: usize = 20;

#[derive(Debug, Clone)]
pub struct PhotosSyncConfig {
    pub destination: PathBuf,
    pub workers: usize,
    pub remove_obsolete: bool,
    /// Albums to mirror, each into `<destination>/<album>`. Empty mirrors
    /// the "all photos" collection straight into the destination.
    pub albums: Vec<String>,
    pub renditions: Vec<Rendition>,
    /// Filename suffixes to mirror, matched case-insensitively.
    pub extensions: Vec<String>,
    pub timeout: Option<Duration>,
    pub no_progress_bar: bool,
}

impl PhotosSyncConfig {
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        Self {
            destination: destination.into(),
            workers: DEFAULT_WORKERS,
            remove_obsolete: false,
            albums: Vec::new(),
            renditions: vec![Rendition::Original],
            extensions: Vec::new(),
            timeout: None,
            no_progress_bar: true,
        }
    }
}

struct PhotosPass<'a> {
    library: &'a dyn PhotoLibrary,
    config: &'a PhotosSyncConfig,
    scheduler: Scheduler,
    kept: KeptSet,
    stats: SyncStats,
    progress: ProgressBar,
}

impl PhotosPass<'_> {
    async fn sync_collection(&self, assets: Vec<PhotoAsset>, destination: &Path) {
        if let Err(e) = tokio::fs::create_dir_all(destination).await {
            tracing::error!("Failed to create {}: {}", destination.display(), e);
            self.stats.record_listing_failure();
            return;
        }

        let mut claimed = HashSet::new();
        let tasks: Vec<(Arc<PhotoAsset>, Rendition)> = assets
            .into_iter()
            .filter(|asset| file_wanted(&self.config.extensions, Path::new(&asset.filename)))
            .map(Arc::new)
            .flat_map(|asset| {
                self.config
                    .renditions
                    .iter()
                    .map(move |rendition| (Arc::clone(&asset), *rendition))
            })
            .filter(|(asset, rendition)| {
                self.claim_target(&mut claimed, asset, *rendition, destination)
            })
            .collect();

        tracing::info!(
            "Starting parallel download with {} workers",
            self.scheduler.workers()
        );
        let batch_size = self.scheduler.workers() * PHOTOS_BATCH_PER_WORKER;
        self.scheduler
            .run_batched(tasks, batch_size, |(asset, rendition)| {
                self.process_photo(asset, rendition, destination)
            })
            .await;
    }

    /// Two photos that resolve to the same local file would overwrite each
    /// other on every pass. The first one listed keeps the path.
    fn claim_target(
        &self,
        claimed: &mut HashSet<PathBuf>,
        asset: &PhotoAsset,
        rendition: Rendition,
        destination: &Path,
    ) -> bool {
        if !asset.versions.contains_key(&rendition) {
            return true;
        }
        let filename = clean_filename(&asset.filename);
        let local_path = local_photo_path(destination, &filename, &asset.added_date, rendition);
        if claimed.insert(local_path.clone()) {
            return true;
        }
        tracing::warn!(
            "Photo {} maps to {} which another photo already uses, skipping",
            asset.id,
            local_path.display()
        );
        self.stats.record_skipped();
        false
    }

    async fn process_photo(&self, asset: Arc<PhotoAsset>, rendition: Rendition, destination: &Path) {
        let filename = clean_filename(&asset.filename);
        if !is_safe_component(&filename) {
            self.progress.suspend(|| {
                tracing::warn!("Skipping photo with unusable name {:?}", asset.filename)
            });
            self.stats.record_skipped();
            return;
        }

        let local_path = local_photo_path(destination, &filename, &asset.added_date, rendition);
        let Some(version) = asset.versions.get(&rendition) else {
            self.progress.suspend(|| {
                tracing::warn!(
                    "File size {} not found on server. Skipping the photo {} ...",
                    rendition,
                    local_path.display()
                )
            });
            self.stats.record_skipped();
            return;
        };

        if let Some(parent) = local_path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                self.progress.suspend(|| {
                    tracing::error!("Failed to create {}: {}", parent.display(), e)
                });
                self.stats.record_failed();
                return;
            }
        }
        if rendition == Rendition::Original {
            self.adopt_legacy_original(destination, &filename, &asset, &local_path)
                .await;
        }

        self.progress.inc_length(1);
        self.kept.insert(local_path.clone());

        let meta = RemoteMeta {
            size: Some(version.size),
            modified: Some(asset.added_date),
        };
        let outcome = self
            .scheduler
            .gated(async {
                if is_up_to_date(&meta, &local_path).await {
                    return None;
                }
                Some(
                    download(
                        self.library.download(&asset, rendition),
                        &local_path,
                        Some(asset.added_date),
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

    /// Earlier releases named originals `foo__original.jpg`. Move such a
    /// file to the current name so it is reused instead of downloaded again.
    async fn adopt_legacy_original(
        &self,
        destination: &Path,
        filename: &str,
        asset: &PhotoAsset,
        local_path: &Path,
    ) {
        let legacy = legacy_original_path(destination, filename, &asset.added_date);
        let legacy_exists = tokio::fs::metadata(&legacy)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !legacy_exists || tokio::fs::try_exists(local_path).await.unwrap_or(false) {
            return;
        }
        match tokio::fs::rename(&legacy, local_path).await {
            Ok(()) => tracing::debug!(
                "Renamed {} to {}",
                legacy.display(),
                local_path.display()
            ),
            Err(e) => self.progress.suspend(|| {
                tracing::warn!("Could not rename {}: {}", legacy.display(), e)
            }),
        }
    }
}

/// Mirror the configured albums, or all photos, into `config.destination`.
///
/// Unknown album names are a setup error listing the albums that exist.
pub async fn sync_photos(
    library: &dyn PhotoLibrary,
    config: &PhotosSyncConfig,
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

    if !config.albums.is_empty() {
        let available = library
            .album_names()
            .await
            .context("Failed to list photo albums")?;
        for album in &config.albums {
            if !is_safe_component(album) {
                bail!("Album name {:?} cannot be used as a directory name", album);
            }
            if !available.contains(album) {
                bail!(
                    "Album {:?} not found. Available albums: {}",
                    album,
                    available.join(", ")
                );
            }
        }
    }

    tracing::info!("Syncing photos into {} ...", root.display());
    let pass = PhotosPass {
        library,
        config,
        scheduler: Scheduler::new(config.workers, shutdown.clone()),
        kept: KeptSet::new(),
        stats: SyncStats::default(),
        progress: create_progress_bar(config.no_progress_bar),
    };

    if config.albums.is_empty() {
        let assets = library.all().await.context("Failed to list all photos")?;
        pass.sync_collection(assets, &root).await;
    } else {
        for album in &config.albums {
            if pass.scheduler.is_cancelled() {
                break;
            }
            match library.album(album).await {
                Ok(assets) => pass.sync_collection(assets, &root.join(album)).await,
                Err(e) => {
                    tracing::error!("Failed to list album {}: {}", album, e);
                    pass.stats.record_listing_failure();
                }
            }
        }
    }
    pass.progress.finish_and_clear();
    tracing::info!("Photo sync completed");

    let mut report = SyncReport::new(&pass.stats, pass.kept.snapshot(), shutdown.is_cancelled());
    if config.remove_obsolete {
        if report.is_complete() {
            report.removed =
                reconcile_blocking(root, report.kept.clone(), ReconcileMode::FilesOnly).await;
        } else {
            tracing::warn!("Photo pass incomplete, not removing obsolete files");
        }
    }

    report.log_summary("Photos", started.elapsed());
    Ok(report)
}
