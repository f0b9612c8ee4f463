//! Filesystem-event trigger: incremental scans and removals.
//!
//! Watches every root album directory. Create/write events enqueue the
//! owning album for an incremental scan; remove events delete the persisted
//! media record and its derived artifacts. The consuming loop never performs
//! heavy I/O itself — that is the scheduler's job.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{Result, ScanError};
use crate::scanner::cache::ScanCache;
use crate::scanner::context::ScanEnvironment;
use crate::scanner::job::artifact_dir;
use crate::scanner::queue::JobSink;
use crate::types::{Album, AlbumId};

/// Watches album roots and feeds incremental work to the scheduler.
pub struct AlbumWatcher {
    env: ScanEnvironment,
    sink: Arc<dyn JobSink>,
    watcher: Mutex<RecommendedWatcher>,
    roots: Mutex<HashMap<AlbumId, PathBuf>>,
    shutdown: CancellationToken,
}

impl AlbumWatcher {
    /// Create the watcher, register every root album directory, and spawn
    /// the event-consuming loop. Individual root failures are logged and
    /// tolerated; zero watchable roots is fatal.
    pub async fn start(env: ScanEnvironment, sink: Arc<dyn JobSink>) -> Result<Arc<Self>> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (error_tx, error_rx) = mpsc::unbounded_channel();

        let watcher = RecommendedWatcher::new(
            move |outcome: notify::Result<Event>| match outcome {
                Ok(event) => {
                    let _ = event_tx.send(event);
                }
                Err(error) => {
                    let _ = error_tx.send(error);
                }
            },
            notify::Config::default(),
        )?;

        let this = Arc::new(Self {
            env,
            sink,
            watcher: Mutex::new(watcher),
            roots: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        });

        let mut attempted = 0usize;
        let mut watched = 0usize;
        for user in this.env.store.fetch_users().await? {
            let albums = match this.env.store.albums_for_user(user.id).await {
                Ok(albums) => albums,
                Err(error) => {
                    warn!(user = %user.id, %error, "cannot list albums to watch");
                    continue;
                }
            };
            for album in albums.into_iter().filter(|album| album.parent.is_none()) {
                attempted += 1;
                match this.watch_root(&album) {
                    Ok(()) => watched += 1,
                    Err(error) => {
                        warn!(album = %album.id, path = %album.path.display(), %error,
                              "cannot watch album root");
                    }
                }
            }
        }
        if attempted > 0 && watched == 0 {
            return Err(ScanError::Internal(
                "no album root could be watched".into(),
            ));
        }

        info!(watched, "album watcher started");
        let consumer = Arc::clone(&this);
        tokio::spawn(consumer.event_loop(event_rx, error_rx));
        Ok(this)
    }

    /// Watch one album root recursively.
    pub fn watch_root(&self, album: &Album) -> Result<()> {
        self.watcher
            .lock()
            .expect("watcher mutex poisoned")
            .watch(&album.path, RecursiveMode::Recursive)?;
        self.roots
            .lock()
            .expect("roots mutex poisoned")
            .insert(album.id, album.path.clone());
        Ok(())
    }

    /// Stop watching one album root. Unknown albums are a no-op.
    pub fn unwatch_root(&self, album: &Album) -> Result<()> {
        let removed = self
            .roots
            .lock()
            .expect("roots mutex poisoned")
            .remove(&album.id);
        if removed.is_some() {
            self.watcher
                .lock()
                .expect("watcher mutex poisoned")
                .unwatch(&album.path)?;
            info!(album = %album.id, "stopped watching album root");
        }
        Ok(())
    }

    /// Stop the event loop. Idempotent.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    async fn event_loop(
        self: Arc<Self>,
        mut events: mpsc::UnboundedReceiver<Event>,
        mut errors: mpsc::UnboundedReceiver<notify::Error>,
    ) {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                maybe_event = events.recv() => {
                    let Some(event) = maybe_event else { break };
                    self.handle_event(event).await;
                }
                maybe_error = errors.recv() => {
                    let Some(error) = maybe_error else { break };
                    error!(%error, "filesystem watch error");
                }
            }
        }
        info!("album watcher stopped");
    }

    async fn handle_event(&self, event: Event) {
        match event.kind {
            // renames are not converted into move semantics; the
            // remove/create pair they produce is handled on its own
            EventKind::Modify(ModifyKind::Name(_)) => {
                debug!(paths = ?event.paths, "rename event observed, not acted upon");
            }
            EventKind::Create(_) | EventKind::Modify(_) => {
                for path in &event.paths {
                    self.media_changed(path).await;
                }
            }
            EventKind::Remove(_) => {
                for path in &event.paths {
                    self.media_removed(path).await;
                }
            }
            EventKind::Access(_) | EventKind::Any | EventKind::Other => {}
        }
    }

    /// A file appeared or changed: enqueue the owning album for an
    /// incremental scan. Each event opens its own single-event scan pass
    /// with a fresh cache.
    async fn media_changed(&self, path: &Path) {
        let Ok(meta) = self.env.content_fs.metadata(path).await else {
            return;
        };
        if !meta.is_file {
            return;
        }

        let cache = Arc::new(ScanCache::new());
        if cache.should_skip(path, &self.env.settings.skip_list) {
            return;
        }
        if cache.media_type(path).is_none() {
            return;
        }

        let album = match self.env.store.album_for_path(path).await {
            Ok(Some(album)) => album,
            Ok(None) => {
                debug!(path = %path.display(), "changed file belongs to no album");
                return;
            }
            Err(error) => {
                error!(path = %path.display(), %error, "album lookup failed");
                return;
            }
        };

        let scan_root = self
            .root_for(path)
            .unwrap_or_else(|| album.path.clone());
        cache.mark_ancestors_contain_media(path, &scan_root);

        debug!(album = %album.id, path = %path.display(), "enqueuing incremental scan");
        match self.sink.enqueue(self.env.job_for(album, &cache, scan_root)).await {
            Ok(()) => {}
            Err(ScanError::ShuttingDown) => {
                debug!("scheduler is draining, dropping incremental scan");
            }
            Err(error) => {
                error!(%error, "failed to enqueue incremental scan");
            }
        }
    }

    /// A file disappeared: delete its persisted record and artifacts.
    async fn media_removed(&self, path: &Path) {
        let media = match self.env.store.media_by_path(path).await {
            Ok(Some(media)) => media,
            Ok(None) => return,
            Err(error) => {
                error!(path = %path.display(), %error, "media lookup failed");
                return;
            }
        };

        info!(media = %media.id, path = %path.display(), "watched media removed, deleting record");
        if let Err(error) = self.env.store.delete_artifacts(media.id).await {
            error!(media = %media.id, %error, "failed to delete artifact records");
        }
        if let Err(error) = self.env.store.delete_media(media.id).await {
            error!(media = %media.id, %error, "failed to delete media record");
            return;
        }

        // best-effort cleanup of the artifact directory
        let dir = artifact_dir(&self.env.settings.cache_root, media.album, media.id);
        if let Err(error) = self.env.cache_fs.remove_dir_all(&dir).await {
            debug!(dir = %dir.display(), %error, "artifact directory cleanup failed");
        }
    }

    /// The watched root containing `path`, if any.
    fn root_for(&self, path: &Path) -> Option<PathBuf> {
        self.roots
            .lock()
            .expect("roots mutex poisoned")
            .values()
            .filter(|root| path.starts_with(root))
            .max_by_key(|root| root.components().count())
            .cloned()
    }
}

impl fmt::Debug for AlbumWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let roots = self.roots.lock().map(|guard| guard.len()).unwrap_or(0);
        f.debug_struct("AlbumWatcher")
            .field("roots", &roots)
            .field("stopped", &self.shutdown.is_cancelled())
            .finish()
    }
}
