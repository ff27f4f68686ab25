//! icloud-mirror: keeps a local copy of iCloud Drive and iCloud Photos.
//!
//! Each pass walks the remote drive tree or photo albums, downloads items
//! whose size or modification time differ from the local copy, and can
//! delete local files the remote no longer has. The local filesystem is the
//! only state kept between passes.

#![warn(clippy::all)]

mod cli;
mod config;
mod download;
mod remote;
mod shutdown;
mod sync;
mod types;

use std::time::Duration;

use clap::Parser;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use config::Config;
use remote::{MountedDrive, MountedPhotos, PhotoLibrary};
use types::SyncTarget;

/// One taxonomy in the run loop, with the time its next pass is due.
struct Schedule {
    target: SyncTarget,
    interval: Duration,
    next_due: Instant,
}

async fn run_pass(
    target: SyncTarget,
    config: &Config,
    no_progress_bar: bool,
    shutdown: &CancellationToken,
) -> anyhow::Result<()> {
    match target {
        SyncTarget::Drive => {
            let (Some(drive), Some(dest)) = (&config.drive, config.drive_destination()) else {
                return Ok(());
            };
            let service = MountedDrive::new(&drive.source);
            sync::sync_drive(
                &service,
                &drive.sync_config(dest, no_progress_bar),
                shutdown.clone(),
            )
            .await?;
        }
        SyncTarget::Photos => {
            let (Some(photos), Some(dest)) = (&config.photos, config.photos_destination()) else {
                return Ok(());
            };
            let library = MountedPhotos::new(&photos.source);
            sync::sync_photos(
                &library,
                &photos.sync_config(dest, no_progress_bar),
                shutdown.clone(),
            )
            .await?;
        }
    }
    Ok(())
}

async fn list_albums(config: &Config) -> anyhow::Result<()> {
    let Some(photos) = &config.photos else {
        anyhow::bail!("--list-albums needs a photos section in the configuration");
    };
    let library = MountedPhotos::new(&photos.source);
    let names = library.album_names().await?;
    println!("Albums:");
    for name in names {
        println!("  {}", name);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    // The config may carry the log level, so load it before installing the
    // subscriber and report a load failure only afterwards.
    let loaded = Config::load(&cli.config);
    let level = cli.log_level.unwrap_or_else(|| {
        loaded
            .as_ref()
            .map(|c| c.app.logger.level)
            .unwrap_or_default()
    });
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(level.as_filter())),
        )
        .init();
    let config = loaded?;

    if cli.list_albums {
        return list_albums(&config).await;
    }

    let now = Instant::now();
    let mut schedules = Vec::new();
    if let (Some(drive), Some(dest)) = (&config.drive, config.drive_destination()) {
        if cli.wants(SyncTarget::Drive) {
            config::prepare_destination(&dest)?;
            schedules.push(Schedule {
                target: SyncTarget::Drive,
                interval: Duration::from_secs(drive.sync_interval),
                next_due: now,
            });
        }
    }
    if let (Some(photos), Some(dest)) = (&config.photos, config.photos_destination()) {
        if cli.wants(SyncTarget::Photos) {
            config::prepare_destination(&dest)?;
            schedules.push(Schedule {
                target: SyncTarget::Photos,
                interval: Duration::from_secs(photos.sync_interval),
                next_due: now,
            });
        }
    }
    if schedules.is_empty() {
        anyhow::bail!(
            "Nothing to sync: {} enables no drive or photos section for this run",
            cli.config.display()
        );
    }

    tracing::info!(
        config = %cli.config.display(),
        targets = schedules.len(),
        "Starting icloud-mirror"
    );
    let shutdown_token = shutdown::install_signal_handler()?;

    loop {
        for schedule in schedules.iter_mut() {
            if shutdown_token.is_cancelled() {
                break;
            }
            if schedule.next_due <= Instant::now() {
                run_pass(
                    schedule.target,
                    &config,
                    cli.no_progress_bar,
                    &shutdown_token,
                )
                .await?;
                schedule.next_due = Instant::now() + schedule.interval;
            }
        }

        if cli.once || shutdown_token.is_cancelled() {
            break;
        }

        let Some(next_due) = schedules.iter().map(|s| s.next_due).min() else {
            break;
        };
        tracing::info!(
            "Waiting {} seconds...",
            next_due.saturating_duration_since(Instant::now()).as_secs()
        );
        tokio::select! {
            _ = tokio::time::sleep_until(next_due) => {}
            _ = shutdown_token.cancelled() => {
                tracing::info!("Shutdown during wait, exiting...");
                break;
            }
        }
    }

    Ok(())
}
