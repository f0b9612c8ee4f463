//! Scan scheduling and pipeline orchestration.

pub mod cache;
pub mod context;
pub mod fs;
pub mod ignore;
pub mod job;
pub mod periodic;
pub mod pipeline;
pub mod queue;
pub mod settings;
pub mod tasks;
pub mod watcher;

pub use cache::{ScanCache, directory_contains_media};
pub use context::{ScanContext, ScanEnvironment, TaskState};
pub use fs::{FileMeta, FileSystem, InMemoryFs, OsFileSystem};
pub use ignore::{IGNORE_FILE_NAME, IgnoreRules};
pub use job::{ScanJob, ScanSummary};
pub use periodic::PeriodicScanner;
pub use pipeline::{
    AlbumScanOutcome, BatchPosition, FileEntry, PipelineRun, ScanTask, TaskPipeline,
};
pub use queue::{JobSink, ScanScheduler};
pub use settings::{ScannerSettings, SkipList};
pub use tasks::{
    IgnoreFileTask, MediaProcessor, NoopProcessor, ProcessTask, ProgressTask, SidecarTask,
};
pub use watcher::AlbumWatcher;
