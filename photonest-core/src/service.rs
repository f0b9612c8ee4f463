//! Composition root wiring the scanner subsystem together.
//!
//! Everything here is an explicit instance owned by the caller — there are
//! no process-wide singletons, so tests can run several independent
//! scanners side by side.

use std::fmt;
use std::sync::Arc;

use tracing::info;

use crate::error::Result;
use crate::notification::NotificationBus;
use crate::scanner::context::ScanEnvironment;
use crate::scanner::fs::FileSystem;
use crate::scanner::periodic::PeriodicScanner;
use crate::scanner::pipeline::TaskPipeline;
use crate::scanner::queue::{JobSink, ScanScheduler};
use crate::scanner::settings::ScannerSettings;
use crate::scanner::tasks::{
    IgnoreFileTask, MediaProcessor, ProcessTask, ProgressTask, SidecarTask,
};
use crate::scanner::watcher::AlbumWatcher;
use crate::store::MediaStore;

/// Default task pipeline: cheap discovery filters first, then artifact
/// generation, then progress reporting.
pub fn default_pipeline() -> TaskPipeline {
    TaskPipeline::new()
        .with(Arc::new(IgnoreFileTask))
        .with(Arc::new(SidecarTask))
        .with(Arc::new(ProcessTask))
        .with(Arc::new(ProgressTask))
}

/// External collaborators the scanner is built from.
pub struct ScannerDeps {
    pub store: Arc<dyn MediaStore>,
    pub processor: Arc<dyn MediaProcessor>,
    pub content_fs: Arc<dyn FileSystem>,
    pub cache_fs: Arc<dyn FileSystem>,
}

impl fmt::Debug for ScannerDeps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScannerDeps").finish_non_exhaustive()
    }
}

/// The running scan subsystem: notification bus, bounded scheduler, and the
/// two triggers.
pub struct MediaScanner {
    bus: Arc<NotificationBus>,
    scheduler: Arc<ScanScheduler>,
    periodic: PeriodicScanner,
    watcher: Option<Arc<AlbumWatcher>>,
    env: ScanEnvironment,
}

impl MediaScanner {
    /// Build and start the subsystem with the default pipeline. Pass
    /// `watch_filesystem = false` to skip the filesystem trigger (tests,
    /// read-only mounts).
    pub async fn start(
        settings: ScannerSettings,
        deps: ScannerDeps,
        watch_filesystem: bool,
    ) -> Result<Self> {
        Self::start_with_pipeline(settings, deps, default_pipeline(), watch_filesystem).await
    }

    /// Build and start the subsystem with a caller-supplied pipeline.
    pub async fn start_with_pipeline(
        settings: ScannerSettings,
        deps: ScannerDeps,
        pipeline: TaskPipeline,
        watch_filesystem: bool,
    ) -> Result<Self> {
        let bus = Arc::new(NotificationBus::new());
        let scheduler = ScanScheduler::start(Arc::clone(&bus), &settings);
        let settings = Arc::new(settings);
        let sink: Arc<dyn JobSink> = Arc::clone(&scheduler) as Arc<dyn JobSink>;

        let env = ScanEnvironment {
            store: deps.store,
            processor: deps.processor,
            content_fs: deps.content_fs,
            cache_fs: deps.cache_fs,
            bus: Arc::clone(&bus),
            settings,
            pipeline: Arc::new(pipeline),
        };

        let periodic = PeriodicScanner::new(env.clone(), Arc::clone(&sink));
        periodic.start()?;

        let watcher = if watch_filesystem {
            Some(AlbumWatcher::start(env.clone(), sink).await?)
        } else {
            None
        };

        info!("media scanner started");
        Ok(Self {
            bus,
            scheduler,
            periodic,
            watcher,
            env,
        })
    }

    pub fn notifications(&self) -> &Arc<NotificationBus> {
        &self.bus
    }

    pub fn scheduler(&self) -> &Arc<ScanScheduler> {
        &self.scheduler
    }

    pub fn periodic(&self) -> &PeriodicScanner {
        &self.periodic
    }

    pub fn watcher(&self) -> Option<&Arc<AlbumWatcher>> {
        self.watcher.as_ref()
    }

    pub fn environment(&self) -> &ScanEnvironment {
        &self.env
    }

    /// Run one full scan pass right now.
    pub async fn scan_all(&self) {
        self.periodic.scan_now().await;
    }

    /// Hot-reload the worker ceiling.
    pub fn reconfigure_workers(&self, max_concurrent: usize) {
        self.scheduler.reconfigure(max_concurrent);
    }

    /// Stop both triggers and drain the scheduler. Running jobs finish;
    /// nothing new is admitted afterwards.
    pub async fn shutdown(&self) {
        self.periodic.stop();
        if let Some(watcher) = &self.watcher {
            watcher.stop();
        }
        self.scheduler.shutdown().await;
        info!("media scanner stopped");
    }
}

impl fmt::Debug for MediaScanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaScanner")
            .field("scheduler", &self.scheduler)
            .field("periodic", &self.periodic)
            .field("watching", &self.watcher.is_some())
            .finish()
    }
}
