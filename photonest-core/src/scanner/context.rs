//! Shared scan context and per-task state.

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use uuid::Uuid;

use crate::notification::NotificationBus;
use crate::scanner::cache::ScanCache;
use crate::scanner::fs::FileSystem;
use crate::scanner::job::ScanJob;
use crate::scanner::pipeline::TaskPipeline;
use crate::scanner::settings::ScannerSettings;
use crate::scanner::tasks::MediaProcessor;
use crate::store::MediaStore;
use crate::types::Album;

/// Handles shared by every hook of one album scan. Cloning is cheap; all
/// fields are reference-counted.
#[derive(Clone)]
pub struct ScanContext {
    pub album: Arc<Album>,
    /// Memoization shared across every job of the owning scan pass.
    pub cache: Arc<ScanCache>,
    pub store: Arc<dyn MediaStore>,
    pub processor: Arc<dyn MediaProcessor>,
    pub content_fs: Arc<dyn FileSystem>,
    pub cache_fs: Arc<dyn FileSystem>,
    pub bus: Arc<NotificationBus>,
    pub settings: Arc<ScannerSettings>,
    /// Root the current pass started from; ancestor marking stops here.
    pub scan_root: PathBuf,
    /// Notification key grouping every update of this album scan.
    pub scan_key: String,
}

impl fmt::Debug for ScanContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanContext")
            .field("album", &self.album.id)
            .field("scan_root", &self.scan_root)
            .field("scan_key", &self.scan_key)
            .finish()
    }
}

/// Shared handles from which per-album scan jobs are derived. One of these
/// lives in the composition root; triggers clone it freely.
#[derive(Clone)]
pub struct ScanEnvironment {
    pub store: Arc<dyn MediaStore>,
    pub processor: Arc<dyn MediaProcessor>,
    pub content_fs: Arc<dyn FileSystem>,
    pub cache_fs: Arc<dyn FileSystem>,
    pub bus: Arc<NotificationBus>,
    pub settings: Arc<ScannerSettings>,
    pub pipeline: Arc<TaskPipeline>,
}

impl ScanEnvironment {
    /// Bind `album` to a scan job sharing the given pass cache.
    pub fn job_for(&self, album: Album, cache: &Arc<ScanCache>, scan_root: PathBuf) -> ScanJob {
        let context = ScanContext {
            album: Arc::new(album),
            cache: Arc::clone(cache),
            store: Arc::clone(&self.store),
            processor: Arc::clone(&self.processor),
            content_fs: Arc::clone(&self.content_fs),
            cache_fs: Arc::clone(&self.cache_fs),
            bus: Arc::clone(&self.bus),
            settings: Arc::clone(&self.settings),
            scan_root,
            scan_key: format!("scan-{}", Uuid::new_v4()),
        };
        ScanJob::new(context, Arc::clone(&self.pipeline))
    }
}

impl fmt::Debug for ScanEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanEnvironment")
            .field("settings", &self.settings)
            .field("pipeline", &self.pipeline)
            .finish()
    }
}

/// Typed key/value state owned by exactly one task for the duration of one
/// scope (a whole album scan, or a single media item). Tasks cannot observe
/// each other's state; the pipeline threads each task its own instance.
#[derive(Default)]
pub struct TaskState {
    values: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl TaskState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value`, replacing any previous value of the same type.
    pub fn insert<T: Any + Send + Sync>(&mut self, value: T) {
        self.values.insert(TypeId::of::<T>(), Box::new(value));
    }

    pub fn get<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.values
            .get(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_ref())
    }

    pub fn get_mut<T: Any + Send + Sync>(&mut self) -> Option<&mut T> {
        self.values
            .get_mut(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_mut())
    }

    pub fn remove<T: Any + Send + Sync>(&mut self) -> Option<T> {
        self.values
            .remove(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast().ok())
            .map(|boxed| *boxed)
    }

    /// Fetch a value inserted earlier, failing loudly if the task never put
    /// one there. Useful inside later hooks of the same task.
    pub fn expect<T: Any + Send + Sync>(&self) -> &T {
        self.get::<T>().unwrap_or_else(|| {
            panic!("task state missing expected value of type {}", type_name::<T>())
        })
    }
}

impl fmt::Debug for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskState")
            .field("values", &self.values.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_values_round_trip() {
        let mut state = TaskState::new();
        state.insert(42u32);
        state.insert(String::from("hello"));

        assert_eq!(state.get::<u32>(), Some(&42));
        assert_eq!(state.get::<String>().map(String::as_str), Some("hello"));

        *state.get_mut::<u32>().expect("present") = 7;
        assert_eq!(state.remove::<u32>(), Some(7));
        assert!(state.get::<u32>().is_none());
    }
}
