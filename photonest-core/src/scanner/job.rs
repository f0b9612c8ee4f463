//! One schedulable unit of work: a single album scan.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::ScanError;
use crate::notification::Notification;
use crate::scanner::context::ScanContext;
use crate::scanner::pipeline::{AlbumScanOutcome, BatchPosition, FileEntry, TaskPipeline};
use crate::types::{AlbumId, Media, MediaId, NewMedia};

/// Counters describing one finished album scan.
#[derive(Clone, Copy, Debug, Default)]
pub struct ScanSummary {
    /// Media items discovered in the album.
    pub found: usize,
    /// Items that did not previously have a persisted record.
    pub new_media: usize,
    /// Items whose derived artifacts changed.
    pub changed: usize,
    /// Non-fatal errors reported along the way.
    pub errors: usize,
}

/// An album scan bound to its execution context. Created by a trigger, owned
/// by the scheduler while queued, destroyed when its pipeline run completes.
///
/// Equality and hashing go by album identity: the scheduler keeps at most
/// one job per album in flight or queued.
pub struct ScanJob {
    context: ScanContext,
    pipeline: Arc<TaskPipeline>,
}

impl ScanJob {
    pub fn new(context: ScanContext, pipeline: Arc<TaskPipeline>) -> Self {
        Self { context, pipeline }
    }

    pub fn album_id(&self) -> AlbumId {
        self.context.album.id
    }

    pub fn context(&self) -> &ScanContext {
        &self.context
    }

    /// Run the pipeline over the album's direct entries. Hook errors are
    /// reported through the bus and counted; they never propagate to the
    /// scheduler.
    pub(crate) async fn run(self) -> ScanSummary {
        let ScanJob { context, pipeline } = self;
        let album = Arc::clone(&context.album);
        let mut summary = ScanSummary::default();
        let mut run = pipeline.begin_album();

        debug!(album = %album.id, path = %album.path.display(), "album scan starting");

        if let Err(error) = run.before_album_scan(&context).await {
            report_scan_error(&context, &error, "album setup").await;
            summary.errors += 1;
            return summary;
        }

        let entries = match context.content_fs.read_dir(&album.path).await {
            Ok(entries) => entries,
            Err(error) => {
                report_scan_error(&context, &error, "directory listing").await;
                summary.errors += 1;
                return summary;
            }
        };

        let mut discovered: Vec<Media> = Vec::new();
        for path in entries {
            let meta = match context.content_fs.metadata(&path).await {
                Ok(meta) => meta,
                Err(error) => {
                    warn!(path = %path.display(), %error, "skipping unreadable entry");
                    continue;
                }
            };
            // nested directories are sibling albums with their own jobs
            if meta.is_dir {
                continue;
            }
            if context
                .cache
                .should_skip(&path, &context.settings.skip_list)
            {
                continue;
            }

            let entry = FileEntry {
                path: path.clone(),
                meta,
            };
            match run.media_found(&context, &entry).await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(error) => {
                    report_scan_error(&context, &error, "discovery").await;
                    summary.errors += 1;
                    continue;
                }
            }

            let Some(media_type) = context.cache.media_type(&path) else {
                continue;
            };
            let title = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();

            let (media, is_new) = match context
                .store
                .upsert_media(NewMedia {
                    album: album.id,
                    path: path.clone(),
                    title,
                    media_type,
                })
                .await
            {
                Ok(result) => result,
                Err(error) => {
                    report_scan_error(&context, &error, "media registration").await;
                    summary.errors += 1;
                    continue;
                }
            };

            context.cache.set_contains_media(album.path.clone(), true);
            context
                .cache
                .mark_ancestors_contain_media(&path, &context.scan_root);

            if is_new {
                summary.new_media += 1;
            }
            if let Err(error) = run.after_media_found(&context, &media, is_new).await {
                report_scan_error(&context, &error, "discovery").await;
                summary.errors += 1;
            }
            discovered.push(media);
        }

        let total = discovered.len();
        let mut outcome = AlbumScanOutcome::default();
        for (index, media) in discovered.iter().enumerate() {
            let cache_dir = artifact_dir(&context.settings.cache_root, album.id, media.id);
            let position = BatchPosition { index, total };
            match run.process_item(&context, media, &cache_dir, position).await {
                Ok(changed) if changed.is_empty() => {}
                Ok(changed) => match context.store.save_artifacts(media.id, &changed).await {
                    Ok(()) => outcome.changed.push(media.clone()),
                    Err(error) => {
                        report_scan_error(&context, &error, "artifact persistence").await;
                        summary.errors += 1;
                    }
                },
                Err(error) => {
                    report_scan_error(&context, &error, "processing").await;
                    summary.errors += 1;
                }
            }
        }

        summary.found = total;
        summary.changed = outcome.changed.len();
        outcome.all = discovered;

        if let Err(error) = run.after_album_scan(&context, &outcome).await {
            report_scan_error(&context, &error, "album teardown").await;
            summary.errors += 1;
        }

        debug!(album = %album.id, ?summary, "album scan finished");
        summary
    }
}

impl PartialEq for ScanJob {
    fn eq(&self, other: &Self) -> bool {
        self.album_id() == other.album_id()
    }
}

impl Eq for ScanJob {}

impl Hash for ScanJob {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.album_id().hash(state);
    }
}

impl fmt::Debug for ScanJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanJob")
            .field("album", &self.album_id())
            .field("path", &self.context.album.path)
            .finish()
    }
}

/// Where derived artifacts for one media item live under the cache tree.
pub(crate) fn artifact_dir(cache_root: &Path, album: AlbumId, media: MediaId) -> PathBuf {
    cache_root.join(album.to_string()).join(media.to_string())
}

async fn report_scan_error(context: &ScanContext, error: &ScanError, stage: &str) {
    warn!(album = %context.album.id, %error, stage, "scan error");
    context
        .bus
        .broadcast(
            Notification::message(
                context.scan_key.clone(),
                format!("Scan error: {}", context.album.title),
                error.to_string(),
            )
            .negative(),
        )
        .await;
}
