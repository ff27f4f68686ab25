//! In-memory remotes for engine tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use futures_util::stream::{self, StreamExt};

use crate::remote::{
    AssetVersion, ChunkStream, DriveItem, DriveService, ItemKind, PhotoAsset, PhotoLibrary,
    RemoteError,
};
use crate::types::Rendition;

pub fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

/// Tracks how many remote calls are running at once.
#[derive(Debug, Default)]
pub struct CallMeter {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl CallMeter {
    async fn enter(&self, latency: Duration) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        } else {
            tokio::task::yield_now().await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn parent_of(path: &str) -> &str {
    path.rfind('/').map(|i| &path[..i]).unwrap_or("")
}

fn name_of(path: &str) -> &str {
    path.rfind('/').map(|i| &path[i + 1..]).unwrap_or(path)
}

/// Drive whose items are keyed by their `/`-separated path.
#[derive(Debug, Default)]
pub struct MemoryDrive {
    listings: HashMap<String, Vec<DriveItem>>,
    contents: HashMap<String, Vec<u8>>,
    failing: HashSet<String>,
    latency: Duration,
    pub listing_meter: CallMeter,
    pub open_meter: CallMeter,
}

impl MemoryDrive {
    pub fn new() -> Self {
        let mut drive = Self::default();
        drive.listings.insert(String::new(), Vec::new());
        drive
    }

    fn add(&mut self, item: DriveItem) {
        self.listings
            .entry(parent_of(&item.id).to_string())
            .or_default()
            .push(item);
    }

    pub fn folder(mut self, path: &str) -> Self {
        self.add(DriveItem {
            id: path.to_string(),
            name: name_of(path).to_string(),
            kind: ItemKind::Folder,
            size: None,
            modified: None,
        });
        self.listings.entry(path.to_string()).or_default();
        self
    }

    pub fn file(mut self, path: &str, content: &[u8], mtime: i64) -> Self {
        self.add(DriveItem {
            id: path.to_string(),
            name: name_of(path).to_string(),
            kind: ItemKind::File,
            size: Some(content.len() as u64),
            modified: Some(ts(mtime)),
        });
        self.contents.insert(path.to_string(), content.to_vec());
        self
    }

    pub fn item(mut self, item: DriveItem) -> Self {
        self.add(item);
        self
    }

    /// Listing or opening `path` fails with an API error.
    pub fn failing(mut self, path: &str) -> Self {
        self.failing.insert(path.to_string());
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

#[async_trait::async_trait]
impl DriveService for MemoryDrive {
    async fn root(&self) -> Result<Vec<DriveItem>, RemoteError> {
        Ok(self.listings.get("").cloned().unwrap_or_default())
    }

    async fn list_children(&self, container: &DriveItem) -> Result<Vec<DriveItem>, RemoteError> {
        self.listing_meter.enter(self.latency).await;
        if self.failing.contains(&container.id) {
            return Err(RemoteError::Api(format!("cannot list {}", container.id)));
        }
        self.listings
            .get(&container.id)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(container.id.clone()))
    }

    async fn open(&self, file: &DriveItem) -> Result<ChunkStream, RemoteError> {
        self.open_meter.enter(self.latency).await;
        if self.failing.contains(&file.id) {
            return Err(RemoteError::Api(format!("cannot open {}", file.id)));
        }
        let bytes = self
            .contents
            .get(&file.id)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(file.id.clone()))?;
        Ok(stream::iter(vec![Ok(bytes)]).boxed())
    }
}

/// Photo library with named albums and per-rendition contents.
#[derive(Debug, Default)]
pub struct MemoryPhotos {
    albums: BTreeMap<String, Vec<PhotoAsset>>,
    all: Vec<PhotoAsset>,
    contents: HashMap<(String, Rendition), Vec<u8>>,
    failing: HashSet<String>,
    latency: Duration,
    pub meter: CallMeter,
}

impl MemoryPhotos {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a photo to "all photos", and to `album` when given.
    pub fn photo(
        mut self,
        album: Option<&str>,
        id: &str,
        filename: &str,
        added: i64,
        renditions: &[(Rendition, &str)],
    ) -> Self {
        let mut versions = HashMap::new();
        for (rendition, content) in renditions {
            versions.insert(
                *rendition,
                AssetVersion {
                    size: content.len() as u64,
                },
            );
            self.contents
                .insert((id.to_string(), *rendition), content.as_bytes().to_vec());
        }
        let asset = PhotoAsset {
            id: id.to_string(),
            filename: filename.to_string(),
            added_date: ts(added),
            versions,
        };
        if let Some(album) = album {
            self.albums
                .entry(album.to_string())
                .or_default()
                .push(asset.clone());
        }
        self.all.push(asset);
        self
    }

    pub fn empty_album(mut self, name: &str) -> Self {
        self.albums.entry(name.to_string()).or_default();
        self
    }

    /// Downloading the asset `key`, or listing the album `key`, fails with
    /// an API error.
    pub fn failing(mut self, key: &str) -> Self {
        self.failing.insert(key.to_string());
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

#[async_trait::async_trait]
impl PhotoLibrary for MemoryPhotos {
    async fn album_names(&self) -> Result<Vec<String>, RemoteError> {
        Ok(self.albums.keys().cloned().collect())
    }

    async fn album(&self, name: &str) -> Result<Vec<PhotoAsset>, RemoteError> {
        if self.failing.contains(name) {
            return Err(RemoteError::Api(format!("cannot list album {name}")));
        }
        self.albums
            .get(name)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(name.to_string()))
    }

    async fn all(&self) -> Result<Vec<PhotoAsset>, RemoteError> {
        Ok(self.all.clone())
    }

    async fn download(
        &self,
        asset: &PhotoAsset,
        rendition: Rendition,
    ) -> Result<ChunkStream, RemoteError> {
        self.meter.enter(self.latency).await;
        if self.failing.contains(&asset.id) {
            return Err(RemoteError::Api(format!("cannot download {}", asset.id)));
        }
        let bytes = self
            .contents
            .get(&(asset.id.clone(), rendition))
            .cloned()
            .ok_or_else(|| RemoteError::MissingRendition {
                name: asset.filename.clone(),
                rendition,
            })?;
        Ok(stream::iter(vec![Ok(bytes)]).boxed())
    }
}
