//! Shared helpers for the integration suite.
#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use photonest_core::error::Result;
use photonest_core::scanner::{
    FileSystem, JobSink, MediaProcessor, ScanContext, ScanEnvironment, ScanJob, ScanTask,
    ScannerSettings, SkipList, TaskPipeline, TaskState,
};
use photonest_core::store::MediaStore;
use photonest_core::{
    AlbumId, ArtifactKind, DerivedArtifact, Media, NotificationBus, ScanError,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn test_settings(max_concurrent: usize) -> ScannerSettings {
    ScannerSettings {
        max_concurrent,
        scan_interval: None,
        skip_list: SkipList::parse("gpx"),
        progress_interval: Duration::from_millis(500),
        cache_root: PathBuf::from("/cache"),
    }
}

pub fn build_env(
    store: Arc<dyn MediaStore>,
    fs: Arc<dyn FileSystem>,
    bus: Arc<NotificationBus>,
    settings: ScannerSettings,
    pipeline: TaskPipeline,
    processor: Arc<dyn MediaProcessor>,
) -> ScanEnvironment {
    ScanEnvironment {
        store,
        processor,
        content_fs: Arc::clone(&fs),
        cache_fs: fs,
        bus,
        settings: Arc::new(settings),
        pipeline: Arc::new(pipeline),
    }
}

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Job sink that records enqueued album ids instead of running anything.
#[derive(Debug, Default)]
pub struct RecordingSink {
    enqueued: Mutex<Vec<AlbumId>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn count(&self) -> usize {
        self.enqueued.lock().expect("sink lock poisoned").len()
    }

    pub fn albums(&self) -> Vec<AlbumId> {
        self.enqueued.lock().expect("sink lock poisoned").clone()
    }
}

#[async_trait]
impl JobSink for RecordingSink {
    async fn enqueue(&self, job: ScanJob) -> Result<()> {
        self.enqueued
            .lock()
            .expect("sink lock poisoned")
            .push(job.album_id());
        Ok(())
    }
}

/// Task tracking how many album scans run concurrently.
#[derive(Debug)]
pub struct GaugeTask {
    pub active: Arc<AtomicUsize>,
    pub peak: Arc<AtomicUsize>,
    pub runs: Arc<AtomicUsize>,
    pub hold: Duration,
}

impl GaugeTask {
    pub fn new(hold: Duration) -> Self {
        Self {
            active: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
            runs: Arc::new(AtomicUsize::new(0)),
            hold,
        }
    }
}

#[async_trait]
impl ScanTask for GaugeTask {
    fn name(&self) -> &'static str {
        "gauge"
    }

    async fn before_album_scan(&self, _ctx: &ScanContext, _state: &mut TaskState) -> Result<()> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.hold).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Task that parks every album scan on a semaphore until the test releases
/// it, keeping jobs observably "running".
#[derive(Debug)]
pub struct BlockTask {
    pub gate: Arc<Semaphore>,
}

impl BlockTask {
    pub fn new() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        (
            Self {
                gate: Arc::clone(&gate),
            },
            gate,
        )
    }
}

#[async_trait]
impl ScanTask for BlockTask {
    fn name(&self) -> &'static str {
        "block"
    }

    async fn before_album_scan(&self, _ctx: &ScanContext, _state: &mut TaskState) -> Result<()> {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| ScanError::Internal("gate closed".into()))?;
        Ok(())
    }
}

/// Processor returning one thumbnail record per call.
#[derive(Debug, Default)]
pub struct CountingProcessor {
    pub calls: AtomicUsize,
}

impl CountingProcessor {
    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaProcessor for CountingProcessor {
    async fn process(
        &self,
        _media: &Media,
        cache_dir: &std::path::Path,
    ) -> Result<Vec<DerivedArtifact>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![DerivedArtifact {
            kind: ArtifactKind::Thumbnail,
            path: cache_dir.join("thumb.jpg"),
            width: 320,
            height: 240,
        }])
    }
}
