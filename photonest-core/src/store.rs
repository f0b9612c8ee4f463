//! Data-access port consumed by the scanner, plus an in-memory fake.
//!
//! Persistence of domain records is an external concern; the core only
//! requires the narrow capability surface below. The in-memory
//! implementation backs tests and demos.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::{Result, ScanError};
use crate::types::{Album, AlbumId, DerivedArtifact, Media, MediaId, NewMedia, User, UserId};

/// Abstract record store for users, albums, media, and derived artifacts.
#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn fetch_users(&self) -> Result<Vec<User>>;

    async fn albums_for_user(&self, user: UserId) -> Result<Vec<Album>>;

    /// Resolve the album owning `path`, preferring the deepest match.
    async fn album_for_path(&self, path: &Path) -> Result<Option<Album>>;

    async fn media_by_path(&self, path: &Path) -> Result<Option<Media>>;

    /// Insert the media record for a path, or return the existing one.
    /// The flag reports whether the record was newly created.
    async fn upsert_media(&self, media: NewMedia) -> Result<(Media, bool)>;

    async fn delete_media(&self, id: MediaId) -> Result<Option<Media>>;

    /// Replace the derived-artifact records of `media` that changed.
    async fn save_artifacts(&self, media: MediaId, artifacts: &[DerivedArtifact]) -> Result<()>;

    /// Drop every derived-artifact record of `media`, returning the count.
    async fn delete_artifacts(&self, media: MediaId) -> Result<usize>;
}

/// In-memory store for tests and demos. Lookups are linear scans, which is
/// fine at the sizes tests use.
#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<StoreInner>,
}

#[derive(Default)]
struct StoreInner {
    users: Vec<User>,
    albums: Vec<Album>,
    media: HashMap<MediaId, Media>,
    artifacts: HashMap<MediaId, Vec<DerivedArtifact>>,
    next_user_id: i64,
    next_album_id: i64,
    next_media_id: i64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, username: impl Into<String>) -> User {
        let mut inner = self.write();
        inner.next_user_id += 1;
        let user = User {
            id: UserId(inner.next_user_id),
            username: username.into(),
        };
        inner.users.push(user.clone());
        user
    }

    pub fn add_album(
        &self,
        owner: UserId,
        parent: Option<AlbumId>,
        title: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Album {
        let mut inner = self.write();
        inner.next_album_id += 1;
        let album = Album {
            id: AlbumId(inner.next_album_id),
            owner,
            parent,
            title: title.into(),
            path: path.into(),
        };
        inner.albums.push(album.clone());
        album
    }

    pub fn media_count(&self) -> usize {
        self.read().media.len()
    }

    pub fn artifacts_for(&self, media: MediaId) -> Vec<DerivedArtifact> {
        self.read().artifacts.get(&media).cloned().unwrap_or_default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, StoreInner> {
        self.inner.read().expect("store lock poisoned")
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, StoreInner> {
        self.inner.write().expect("store lock poisoned")
    }
}

impl fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.read();
        f.debug_struct("InMemoryStore")
            .field("users", &inner.users.len())
            .field("albums", &inner.albums.len())
            .field("media", &inner.media.len())
            .finish()
    }
}

#[async_trait]
impl MediaStore for InMemoryStore {
    async fn fetch_users(&self) -> Result<Vec<User>> {
        Ok(self.read().users.clone())
    }

    async fn albums_for_user(&self, user: UserId) -> Result<Vec<Album>> {
        Ok(self
            .read()
            .albums
            .iter()
            .filter(|album| album.owner == user)
            .cloned()
            .collect())
    }

    async fn album_for_path(&self, path: &Path) -> Result<Option<Album>> {
        Ok(self
            .read()
            .albums
            .iter()
            .filter(|album| path.starts_with(&album.path))
            .max_by_key(|album| album.path.components().count())
            .cloned())
    }

    async fn media_by_path(&self, path: &Path) -> Result<Option<Media>> {
        Ok(self
            .read()
            .media
            .values()
            .find(|media| media.path == path)
            .cloned())
    }

    async fn upsert_media(&self, media: NewMedia) -> Result<(Media, bool)> {
        let mut inner = self.write();
        if let Some(existing) = inner.media.values().find(|m| m.path == media.path) {
            return Ok((existing.clone(), false));
        }
        inner.next_media_id += 1;
        let record = Media {
            id: MediaId(inner.next_media_id),
            album: media.album,
            path: media.path,
            title: media.title,
            media_type: media.media_type,
            discovered_at: Utc::now(),
        };
        inner.media.insert(record.id, record.clone());
        Ok((record, true))
    }

    async fn delete_media(&self, id: MediaId) -> Result<Option<Media>> {
        Ok(self.write().media.remove(&id))
    }

    async fn save_artifacts(&self, media: MediaId, artifacts: &[DerivedArtifact]) -> Result<()> {
        let mut inner = self.write();
        if !inner.media.contains_key(&media) {
            return Err(ScanError::NotFound(format!("media {media}")));
        }
        let slot = inner.artifacts.entry(media).or_default();
        for artifact in artifacts {
            slot.retain(|existing| existing.kind != artifact.kind);
            slot.push(artifact.clone());
        }
        Ok(())
    }

    async fn delete_artifacts(&self, media: MediaId) -> Result<usize> {
        Ok(self
            .write()
            .artifacts
            .remove(&media)
            .map(|artifacts| artifacts.len())
            .unwrap_or(0))
    }
}
