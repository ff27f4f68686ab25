//! Remote capability consumed by the sync engine.
//!
//! The engine never talks to a cloud API directly. It sees a drive as a tree
//! of [`DriveItem`]s reachable through [`DriveService`], and a photo library
//! as flat collections of [`PhotoAsset`]s reachable through [`PhotoLibrary`].
//! Items are transient handles: they are produced per call and never cached
//! across runs.

pub mod error;
pub mod mounted;

pub use error::RemoteError;
pub use mounted::{MountedDrive, MountedPhotos};

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;

use crate::types::Rendition;

/// Byte stream of one remote object, delivered in chunks.
pub type ChunkStream = BoxStream<'static, Result<Vec<u8>, RemoteError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKind {
    Folder,
    AppLibrary,
    File,
    /// Anything the engine does not know how to mirror.
    Other,
}

impl ItemKind {
    pub fn is_container(&self) -> bool {
        matches!(self, ItemKind::Folder | ItemKind::AppLibrary)
    }
}

/// Metadata handle for one node of the remote drive.
#[derive(Debug, Clone)]
pub struct DriveItem {
    /// Backend-specific identifier used to list or open the item.
    pub id: String,
    pub name: String,
    pub kind: ItemKind,
    pub size: Option<u64>,
    pub modified: Option<DateTime<Utc>>,
}

#[async_trait::async_trait]
pub trait DriveService: Send + Sync {
    /// Top-level listing of the drive.
    async fn root(&self) -> Result<Vec<DriveItem>, RemoteError>;

    /// Immediate children of a container item.
    async fn list_children(&self, container: &DriveItem) -> Result<Vec<DriveItem>, RemoteError>;

    /// Open a streaming read of a file item.
    async fn open(&self, file: &DriveItem) -> Result<ChunkStream, RemoteError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssetVersion {
    pub size: u64,
}

/// One photo in a library, with its available renditions.
#[derive(Debug, Clone)]
pub struct PhotoAsset {
    pub id: String,
    pub filename: String,
    pub added_date: DateTime<Utc>,
    pub versions: HashMap<Rendition, AssetVersion>,
}

#[async_trait::async_trait]
pub trait PhotoLibrary: Send + Sync {
    /// Names of the albums the library exposes.
    async fn album_names(&self) -> Result<Vec<String>, RemoteError>;

    /// Photos of one named album.
    async fn album(&self, name: &str) -> Result<Vec<PhotoAsset>, RemoteError>;

    /// The "all photos" collection.
    async fn all(&self) -> Result<Vec<PhotoAsset>, RemoteError>;

    /// Open a streaming read of one rendition of a photo.
    async fn download(
        &self,
        asset: &PhotoAsset,
        rendition: Rendition,
    ) -> Result<ChunkStream, RemoteError>;
}
