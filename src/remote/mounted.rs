//! Backend over a locally mounted or exported copy of the cloud store.
//!
//! Item ids are paths relative to the mount root, joined with `/`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use tokio::io::AsyncReadExt;

use super::{
    AssetVersion, ChunkStream, DriveItem, DriveService, ItemKind, PhotoAsset, PhotoLibrary,
    RemoteError,
};
use crate::types::Rendition;

const CHUNK_SIZE: usize = 64 * 1024;

fn child_id(parent: Option<&str>, name: &str) -> String {
    match parent {
        Some(p) => format!("{p}/{name}"),
        None => name.to_string(),
    }
}

fn modified_utc(meta: &std::fs::Metadata) -> Option<DateTime<Utc>> {
    meta.modified().ok().map(DateTime::<Utc>::from)
}

async fn file_stream(path: PathBuf, name: &str) -> Result<ChunkStream, RemoteError> {
    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|e| RemoteError::from_io(name, e))?;
    let chunks = stream::try_unfold(file, |mut file| async move {
        let mut buf = vec![0u8; CHUNK_SIZE];
        let n = file.read(&mut buf).await.map_err(RemoteError::Io)?;
        if n == 0 {
            return Ok(None);
        }
        buf.truncate(n);
        Ok(Some((buf, file)))
    });
    Ok(chunks.boxed())
}

/// List one directory as drive items, sorted by name.
async fn list_dir(root: &Path, parent: Option<&str>) -> Result<Vec<DriveItem>, RemoteError> {
    let dir = match parent {
        Some(p) => root.join(p),
        None => root.to_path_buf(),
    };
    let label = parent.unwrap_or("/");
    let mut entries = tokio::fs::read_dir(&dir)
        .await
        .map_err(|e| RemoteError::from_io(label, e))?;

    let mut items = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        // symlink_metadata semantics: links are reported as `Other`
        let meta = entry.metadata().await?;
        let kind = if meta.is_dir() && parent.is_none() && name.contains('~') {
            // on-disk form of an app container, e.g. `com~apple~Pages`
            ItemKind::AppLibrary
        } else if meta.is_dir() {
            ItemKind::Folder
        } else if meta.is_file() {
            ItemKind::File
        } else {
            ItemKind::Other
        };
        items.push(DriveItem {
            id: child_id(parent, &name),
            size: meta.is_file().then(|| meta.len()),
            modified: modified_utc(&meta),
            name,
            kind,
        });
    }
    items.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(items)
}

/// Drive backed by a directory tree.
#[derive(Debug, Clone)]
pub struct MountedDrive {
    root: PathBuf,
}

impl MountedDrive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait::async_trait]
impl DriveService for MountedDrive {
    async fn root(&self) -> Result<Vec<DriveItem>, RemoteError> {
        list_dir(&self.root, None).await
    }

    async fn list_children(&self, container: &DriveItem) -> Result<Vec<DriveItem>, RemoteError> {
        if !container.kind.is_container() {
            return Err(RemoteError::NotAContainer(container.name.clone()));
        }
        list_dir(&self.root, Some(&container.id)).await
    }

    async fn open(&self, file: &DriveItem) -> Result<ChunkStream, RemoteError> {
        file_stream(self.root.join(&file.id), &file.name).await
    }
}

/// Photo library backed by a directory: subdirectories are albums, every
/// file below the root belongs to "all photos". Only the original rendition
/// exists.
#[derive(Debug, Clone)]
pub struct MountedPhotos {
    root: PathBuf,
}

impl MountedPhotos {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn asset(id: String, filename: String, meta: &std::fs::Metadata) -> PhotoAsset {
        let mut versions = HashMap::new();
        versions.insert(Rendition::Original, AssetVersion { size: meta.len() });
        PhotoAsset {
            id,
            filename,
            added_date: modified_utc(meta).unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
            versions,
        }
    }

    async fn assets_in(
        &self,
        parent: Option<&str>,
        recursive: bool,
    ) -> Result<Vec<PhotoAsset>, RemoteError> {
        let mut assets = Vec::new();
        let mut pending: Vec<Option<String>> = vec![parent.map(str::to_string)];
        while let Some(dir) = pending.pop() {
            for item in list_dir(&self.root, dir.as_deref()).await? {
                match item.kind {
                    ItemKind::File => {
                        let meta = tokio::fs::metadata(self.root.join(&item.id)).await?;
                        assets.push(Self::asset(item.id, item.name, &meta));
                    }
                    kind if recursive && kind.is_container() => pending.push(Some(item.id)),
                    _ => {}
                }
            }
        }
        Ok(assets)
    }
}

#[async_trait::async_trait]
impl PhotoLibrary for MountedPhotos {
    async fn album_names(&self) -> Result<Vec<String>, RemoteError> {
        Ok(list_dir(&self.root, None)
            .await?
            .into_iter()
            .filter(|item| item.kind.is_container())
            .map(|item| item.name)
            .collect())
    }

    async fn album(&self, name: &str) -> Result<Vec<PhotoAsset>, RemoteError> {
        if !self.album_names().await?.iter().any(|n| n == name) {
            return Err(RemoteError::NotFound(name.to_string()));
        }
        self.assets_in(Some(name), false).await
    }

    async fn all(&self) -> Result<Vec<PhotoAsset>, RemoteError> {
        self.assets_in(None, true).await
    }

    async fn download(
        &self,
        asset: &PhotoAsset,
        rendition: Rendition,
    ) -> Result<ChunkStream, RemoteError> {
        if !asset.versions.contains_key(&rendition) {
            return Err(RemoteError::MissingRendition {
                name: asset.filename.clone(),
                rendition,
            });
        }
        file_stream(self.root.join(&asset.id), &asset.filename).await
    }
}
