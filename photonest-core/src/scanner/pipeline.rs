//! Composable scan-task pipeline invoked at fixed lifecycle hooks.
//!
//! Discovery hooks (`media_found`, `after_media_found`) run for every
//! filesystem entry; processing hooks run only for entries that survive
//! discovery. That split lets cheap filters guard expensive content
//! generation without involving the scheduler.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Result, ScanError};
use crate::scanner::context::{ScanContext, TaskState};
use crate::scanner::fs::FileMeta;
use crate::types::{DerivedArtifact, Media};

/// A filesystem entry surfaced during album discovery.
#[derive(Clone, Debug)]
pub struct FileEntry {
    pub path: PathBuf,
    pub meta: FileMeta,
}

/// Index/total of one media item within the album batch.
#[derive(Clone, Copy, Debug)]
pub struct BatchPosition {
    pub index: usize,
    pub total: usize,
}

/// Everything that went through one album scan, handed to the final hook.
#[derive(Debug, Default)]
pub struct AlbumScanOutcome {
    /// Media whose derived artifacts changed this scan.
    pub changed: Vec<Media>,
    /// Every media item discovered in the album.
    pub all: Vec<Media>,
}

/// One stage of the scan pipeline. Every hook has a no-op default, so tasks
/// implement only the lifecycle points they care about.
///
/// Album-scoped state lives from `before_album_scan` to `after_album_scan`;
/// item-scoped state is created fresh per media item for the three
/// processing hooks. Neither is visible to other tasks.
#[async_trait]
pub trait ScanTask: Send + Sync {
    /// Stable task name used in logs and error reports.
    fn name(&self) -> &'static str;

    /// One-time setup per album.
    async fn before_album_scan(&self, _ctx: &ScanContext, _state: &mut TaskState) -> Result<()> {
        Ok(())
    }

    /// Called once per filesystem entry. Return `true` to skip the entry;
    /// the first task answering `true` short-circuits the rest.
    async fn media_found(
        &self,
        _ctx: &ScanContext,
        _state: &mut TaskState,
        _entry: &FileEntry,
    ) -> Result<bool> {
        Ok(false)
    }

    /// Fires once an entry has been resolved into a persisted media record.
    async fn after_media_found(
        &self,
        _ctx: &ScanContext,
        _state: &mut TaskState,
        _media: &Media,
        _is_new: bool,
    ) -> Result<()> {
        Ok(())
    }

    /// Setup before expensive work on one media item.
    async fn before_process_media(
        &self,
        _ctx: &ScanContext,
        _album_state: &TaskState,
        _item_state: &mut TaskState,
        _media: &Media,
    ) -> Result<()> {
        Ok(())
    }

    /// Perform (or delegate) content generation for one media item,
    /// returning the derived-artifact records that changed.
    async fn process_media(
        &self,
        _ctx: &ScanContext,
        _album_state: &TaskState,
        _item_state: &mut TaskState,
        _media: &Media,
        _cache_dir: &Path,
    ) -> Result<Vec<DerivedArtifact>> {
        Ok(Vec::new())
    }

    /// Progress/cleanup hook with the item's position in the batch.
    async fn after_process_media(
        &self,
        _ctx: &ScanContext,
        _album_state: &TaskState,
        _item_state: &mut TaskState,
        _media: &Media,
        _changed: &[DerivedArtifact],
        _position: BatchPosition,
    ) -> Result<()> {
        Ok(())
    }

    /// Final hook once every media item has passed through the pipeline.
    async fn after_album_scan(
        &self,
        _ctx: &ScanContext,
        _state: &mut TaskState,
        _outcome: &AlbumScanOutcome,
    ) -> Result<()> {
        Ok(())
    }
}

/// Ordered list of registered tasks. `begin_album` yields the per-run state.
#[derive(Clone, Default)]
pub struct TaskPipeline {
    tasks: Vec<Arc<dyn ScanTask>>,
}

impl TaskPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style registration; tasks run in registration order.
    pub fn with(mut self, task: Arc<dyn ScanTask>) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn register(&mut self, task: Arc<dyn ScanTask>) {
        self.tasks.push(task);
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Start a pipeline run for one album, allocating each task its own
    /// album-scoped state.
    pub fn begin_album(self: &Arc<Self>) -> PipelineRun {
        let album_states = self.tasks.iter().map(|_| TaskState::new()).collect();
        PipelineRun {
            pipeline: Arc::clone(self),
            album_states,
        }
    }
}

impl fmt::Debug for TaskPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.tasks.iter().map(|task| task.name()).collect();
        f.debug_struct("TaskPipeline").field("tasks", &names).finish()
    }
}

fn task_error(task: &dyn ScanTask, hook: &'static str, error: ScanError) -> ScanError {
    ScanError::Task {
        task: task.name(),
        hook,
        message: error.to_string(),
    }
}

/// Executes every registered task at each hook, threading each task its own
/// state. A hook error aborts the remaining tasks for that one invocation
/// only; the caller decides whether the scan continues.
pub struct PipelineRun {
    pipeline: Arc<TaskPipeline>,
    album_states: Vec<TaskState>,
}

impl PipelineRun {
    pub async fn before_album_scan(&mut self, ctx: &ScanContext) -> Result<()> {
        for (task, state) in self
            .pipeline
            .tasks
            .iter()
            .zip(self.album_states.iter_mut())
        {
            task.before_album_scan(ctx, state)
                .await
                .map_err(|error| task_error(task.as_ref(), "before_album_scan", error))?;
        }
        Ok(())
    }

    /// First-skip-wins: returns `true` as soon as any task skips `entry`,
    /// without invoking the tasks registered after it.
    pub async fn media_found(&mut self, ctx: &ScanContext, entry: &FileEntry) -> Result<bool> {
        for (task, state) in self
            .pipeline
            .tasks
            .iter()
            .zip(self.album_states.iter_mut())
        {
            let skip = task
                .media_found(ctx, state, entry)
                .await
                .map_err(|error| task_error(task.as_ref(), "media_found", error))?;
            if skip {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub async fn after_media_found(
        &mut self,
        ctx: &ScanContext,
        media: &Media,
        is_new: bool,
    ) -> Result<()> {
        for (task, state) in self
            .pipeline
            .tasks
            .iter()
            .zip(self.album_states.iter_mut())
        {
            task.after_media_found(ctx, state, media, is_new)
                .await
                .map_err(|error| task_error(task.as_ref(), "after_media_found", error))?;
        }
        Ok(())
    }

    /// Run the three processing hooks for one media item. Each task gets a
    /// fresh item-scoped state threaded through all three hooks; artifact
    /// changes are accumulated across tasks and handed to `after_process_media`.
    pub async fn process_item(
        &self,
        ctx: &ScanContext,
        media: &Media,
        cache_dir: &Path,
        position: BatchPosition,
    ) -> Result<Vec<DerivedArtifact>> {
        let tasks = &self.pipeline.tasks;
        let mut item_states: Vec<TaskState> = tasks.iter().map(|_| TaskState::new()).collect();

        for (index, task) in tasks.iter().enumerate() {
            task.before_process_media(ctx, &self.album_states[index], &mut item_states[index], media)
                .await
                .map_err(|error| task_error(task.as_ref(), "before_process_media", error))?;
        }

        let mut changed = Vec::new();
        for (index, task) in tasks.iter().enumerate() {
            let artifacts = task
                .process_media(
                    ctx,
                    &self.album_states[index],
                    &mut item_states[index],
                    media,
                    cache_dir,
                )
                .await
                .map_err(|error| task_error(task.as_ref(), "process_media", error))?;
            changed.extend(artifacts);
        }

        for (index, task) in tasks.iter().enumerate() {
            task.after_process_media(
                ctx,
                &self.album_states[index],
                &mut item_states[index],
                media,
                &changed,
                position,
            )
            .await
            .map_err(|error| task_error(task.as_ref(), "after_process_media", error))?;
        }

        Ok(changed)
    }

    pub async fn after_album_scan(
        &mut self,
        ctx: &ScanContext,
        outcome: &AlbumScanOutcome,
    ) -> Result<()> {
        for (task, state) in self
            .pipeline
            .tasks
            .iter()
            .zip(self.album_states.iter_mut())
        {
            task.after_album_scan(ctx, state, outcome)
                .await
                .map_err(|error| task_error(task.as_ref(), "after_album_scan", error))?;
        }
        Ok(())
    }
}

impl fmt::Debug for PipelineRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineRun")
            .field("pipeline", &self.pipeline)
            .finish()
    }
}
