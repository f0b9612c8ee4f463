//! Built-in scan tasks and the external-processing port.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::Result;
use crate::notification::Notification;
use crate::scanner::context::{ScanContext, TaskState};
use crate::scanner::ignore::{IGNORE_FILE_NAME, IgnoreRules};
use crate::scanner::pipeline::{AlbumScanOutcome, BatchPosition, FileEntry, ScanTask};
use crate::types::{DerivedArtifact, Media};

/// Opaque content generation (thumbnails, transcodes, RAW conversion).
/// Implementations live outside the core and are treated as black boxes
/// returning the derived-artifact records that changed.
#[async_trait]
pub trait MediaProcessor: Send + Sync {
    async fn process(&self, media: &Media, cache_dir: &Path) -> Result<Vec<DerivedArtifact>>;
}

/// Processor that generates nothing. Useful for dry runs and tests.
#[derive(Debug, Default)]
pub struct NoopProcessor;

#[async_trait]
impl MediaProcessor for NoopProcessor {
    async fn process(&self, _media: &Media, _cache_dir: &Path) -> Result<Vec<DerivedArtifact>> {
        Ok(Vec::new())
    }
}

/// Loads the album's ignore file once per scan and skips matching entries.
#[derive(Debug, Default)]
pub struct IgnoreFileTask;

struct LoadedRules(Arc<IgnoreRules>);

#[async_trait]
impl ScanTask for IgnoreFileTask {
    fn name(&self) -> &'static str {
        "ignore-file"
    }

    async fn before_album_scan(&self, ctx: &ScanContext, state: &mut TaskState) -> Result<()> {
        let rules = match ctx.cache.ignore_rules(&ctx.album.path) {
            Some(cached) => cached,
            None => {
                let ignore_path = ctx.album.path.join(IGNORE_FILE_NAME);
                let rules = if ctx.content_fs.exists(&ignore_path).await {
                    let content = ctx.content_fs.read_to_string(&ignore_path).await?;
                    Arc::new(IgnoreRules::parse(&content))
                } else {
                    Arc::new(IgnoreRules::default())
                };
                ctx.cache
                    .set_ignore_rules(ctx.album.path.clone(), Arc::clone(&rules));
                rules
            }
        };
        state.insert(LoadedRules(rules));
        Ok(())
    }

    async fn media_found(
        &self,
        _ctx: &ScanContext,
        state: &mut TaskState,
        entry: &FileEntry,
    ) -> Result<bool> {
        let Some(LoadedRules(rules)) = state.get::<LoadedRules>() else {
            return Ok(false);
        };
        if rules.is_empty() {
            return Ok(false);
        }
        let Some(name) = entry.path.file_name().and_then(|name| name.to_str()) else {
            return Ok(false);
        };
        if rules.matches(name) {
            debug!(path = %entry.path.display(), "entry matches ignore rules");
            return Ok(true);
        }
        Ok(false)
    }
}

const SIDECAR_EXTENSIONS: &[&str] = &["xmp", "aae", "thm"];

/// Skips editor sidecar files during discovery; they describe media but are
/// not media themselves.
#[derive(Debug, Default)]
pub struct SidecarTask;

#[async_trait]
impl ScanTask for SidecarTask {
    fn name(&self) -> &'static str {
        "sidecar"
    }

    async fn media_found(
        &self,
        _ctx: &ScanContext,
        _state: &mut TaskState,
        entry: &FileEntry,
    ) -> Result<bool> {
        let is_sidecar = entry
            .path
            .extension()
            .and_then(|extension| extension.to_str())
            .is_some_and(|extension| {
                SIDECAR_EXTENSIONS.contains(&extension.to_ascii_lowercase().as_str())
            });
        Ok(is_sidecar)
    }
}

/// Delegates artifact generation to the configured `MediaProcessor`.
#[derive(Debug, Default)]
pub struct ProcessTask;

#[async_trait]
impl ScanTask for ProcessTask {
    fn name(&self) -> &'static str {
        "process-media"
    }

    async fn process_media(
        &self,
        ctx: &ScanContext,
        _album_state: &TaskState,
        _item_state: &mut TaskState,
        media: &Media,
        cache_dir: &Path,
    ) -> Result<Vec<DerivedArtifact>> {
        ctx.cache_fs.create_dir_all(cache_dir).await?;
        ctx.processor.process(media, cache_dir).await
    }
}

/// Emits per-item progress and an end-of-album summary on the bus.
#[derive(Debug, Default)]
pub struct ProgressTask;

#[async_trait]
impl ScanTask for ProgressTask {
    fn name(&self) -> &'static str {
        "progress"
    }

    async fn after_process_media(
        &self,
        ctx: &ScanContext,
        _album_state: &TaskState,
        _item_state: &mut TaskState,
        _media: &Media,
        _changed: &[DerivedArtifact],
        position: BatchPosition,
    ) -> Result<()> {
        let done = position.index + 1;
        let fraction = done as f32 / position.total.max(1) as f32;
        ctx.bus
            .broadcast(Notification::progress(
                ctx.scan_key.clone(),
                format!("Scanning {}", ctx.album.title),
                format!("{done} of {} media processed", position.total),
                fraction,
            ))
            .await;
        Ok(())
    }

    async fn after_album_scan(
        &self,
        ctx: &ScanContext,
        _state: &mut TaskState,
        outcome: &AlbumScanOutcome,
    ) -> Result<()> {
        ctx.bus
            .broadcast(
                Notification::message(
                    ctx.scan_key.clone(),
                    format!("Scanning {}", ctx.album.title),
                    format!(
                        "{} media found, {} updated",
                        outcome.all.len(),
                        outcome.changed.len()
                    ),
                )
                .positive()
                .with_timeout(Duration::from_secs(5)),
            )
            .await;
        Ok(())
    }
}
