use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use thiserror::Error;

use crate::sync::scheduler::DEFAULT_WORKERS;
use crate::sync::{DriveSyncConfig, PhotosSyncConfig};
use crate::types::{LogLevel, Rendition};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Application configuration, loaded from a YAML file.
///
/// A missing `drive` or `photos` section disables that taxonomy.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub app: AppConfig,
    pub drive: Option<DriveConfig>,
    pub photos: Option<PhotosConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub logger: LoggerConfig,
    /// Base directory that relative destinations are joined onto.
    pub root: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            logger: LoggerConfig::default(),
            root: "icloud".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggerConfig {
    pub level: LogLevel,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DriveConfig {
    /// Root of the mounted drive to mirror.
    pub source: PathBuf,
    pub destination: String,
    pub remove_obsolete: bool,
    pub workers: usize,
    /// Seconds between passes in loop mode.
    pub sync_interval: u64,
    pub timeout_secs: Option<u64>,
    pub filters: DriveFilters,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            source: PathBuf::new(),
            destination: "drive".to_string(),
            remove_obsolete: false,
            workers: DEFAULT_WORKERS,
            sync_interval: 300,
            timeout_secs: None,
            filters: DriveFilters::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DriveFilters {
    pub folders: Vec<String>,
    pub file_extensions: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PhotosConfig {
    /// Root of the mounted photo library to mirror.
    pub source: PathBuf,
    pub destination: String,
    pub remove_obsolete: bool,
    pub workers: usize,
    pub sync_interval: u64,
    pub timeout_secs: Option<u64>,
    pub filters: PhotosFilters,
}

impl Default for PhotosConfig {
    fn default() -> Self {
        Self {
            source: PathBuf::new(),
            destination: "photos".to_string(),
            remove_obsolete: false,
            workers: DEFAULT_WORKERS,
            sync_interval: 500,
            timeout_secs: None,
            filters: PhotosFilters::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PhotosFilters {
    pub albums: Vec<String>,
    pub file_sizes: Vec<Rendition>,
    pub extensions: Vec<String>,
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

fn check_positive(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Invalid {
            field,
            reason: "must be at least 1".to_string(),
        });
    }
    Ok(())
}

fn check_source(field: &'static str, source: &Path) -> Result<(), ConfigError> {
    if source.as_os_str().is_empty() {
        return Err(ConfigError::Invalid {
            field,
            reason: "is required".to_string(),
        });
    }
    Ok(())
}

impl Config {
    /// Load and validate the configuration file at `path`. An empty file
    /// yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let mut config = if content.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?
        };
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    fn normalize(&mut self) {
        if let Some(photos) = self.photos.as_mut() {
            if photos.filters.file_sizes.is_empty() {
                photos.filters.file_sizes.push(Rendition::Original);
            }
            let mut seen = HashSet::new();
            photos.filters.file_sizes.retain(|r| seen.insert(*r));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(drive) = &self.drive {
            check_source("drive.source", &drive.source)?;
            check_positive("drive.workers", drive.workers as u64)?;
            check_positive("drive.sync_interval", drive.sync_interval)?;
            if let Some(secs) = drive.timeout_secs {
                check_positive("drive.timeout_secs", secs)?;
            }
        }
        if let Some(photos) = &self.photos {
            check_source("photos.source", &photos.source)?;
            check_positive("photos.workers", photos.workers as u64)?;
            check_positive("photos.sync_interval", photos.sync_interval)?;
            if let Some(secs) = photos.timeout_secs {
                check_positive("photos.timeout_secs", secs)?;
            }
        }
        Ok(())
    }

    pub fn root_dir(&self) -> PathBuf {
        expand_tilde(&self.app.root)
    }

    /// A destination is used as-is when absolute, otherwise joined onto the
    /// application root.
    fn destination(&self, destination: &str) -> PathBuf {
        let path = expand_tilde(destination);
        if path.is_absolute() {
            path
        } else {
            self.root_dir().join(path)
        }
    }

    pub fn drive_destination(&self) -> Option<PathBuf> {
        self.drive.as_ref().map(|d| self.destination(&d.destination))
    }

    pub fn photos_destination(&self) -> Option<PathBuf> {
        self.photos.as_ref().map(|p| self.destination(&p.destination))
    }
}

impl DriveConfig {
    pub fn sync_config(&self, destination: PathBuf, no_progress_bar: bool) -> DriveSyncConfig {
        DriveSyncConfig {
            destination,
            workers: self.workers,
            remove_obsolete: self.remove_obsolete,
            folders: self.filters.folders.clone(),
            file_extensions: self.filters.file_extensions.clone(),
            timeout: self.timeout_secs.map(Duration::from_secs),
            no_progress_bar,
        }
    }
}

impl PhotosConfig {
    pub fn sync_config(&self, destination: PathBuf, no_progress_bar: bool) -> PhotosSyncConfig {
        PhotosSyncConfig {
            destination,
            workers: self.workers,
            remove_obsolete: self.remove_obsolete,
            albums: self.filters.albums.clone(),
            renditions: self.filters.file_sizes.clone(),
            extensions: self.filters.extensions.clone(),
            timeout: self.timeout_secs.map(Duration::from_secs),
            no_progress_bar,
        }
    }
}

/// Resolve a destination to an absolute path and make sure it exists.
pub fn prepare_destination(path: &Path) -> anyhow::Result<PathBuf> {
    let path = std::path::absolute(path)
        .with_context(|| format!("Failed to resolve destination {}", path.display()))?;
    std::fs::create_dir_all(&path)
        .with_context(|| format!("Failed to create destination {}", path.display()))?;
    Ok(path)
}
