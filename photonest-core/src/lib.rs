//! # Photonest Core
//!
//! Background engine of the Photonest media library manager: it discovers
//! media files under user-owned album directories, drives them through a
//! configurable multi-stage pipeline under bounded concurrency, and reports
//! progress to subscribers over a broadcast notification bus.
//!
//! ## Architecture
//!
//! - [`scanner::queue`]: bounded-concurrency scheduler admitting album scan
//!   jobs in FIFO order
//! - [`scanner::pipeline`]: composable task pipeline with fixed lifecycle
//!   hooks per album scan
//! - [`scanner::cache`]: per-pass memoization of filesystem facts
//! - [`scanner::periodic`] / [`scanner::watcher`]: the two job producers
//! - [`notification`]: pub/sub fan-out consumed by the API layer
//! - [`store`] / [`scanner::fs`] / [`scanner::tasks`]: capability ports for
//!   persistence, filesystems, and external media processing
//!
//! Actual media decode/encode, metadata extraction, record persistence, and
//! the API transport are external collaborators behind those ports.

pub mod error;
pub mod notification;
pub mod scanner;
pub mod service;
pub mod store;
pub mod types;

pub use error::{Result, ScanError};
pub use notification::{ListenerId, Notification, NotificationBus, NotificationKind};
pub use scanner::{
    AlbumWatcher, FileSystem, InMemoryFs, JobSink, MediaProcessor, OsFileSystem, PeriodicScanner,
    ScanCache, ScanContext, ScanEnvironment, ScanJob, ScanScheduler, ScanTask, ScannerSettings,
    SkipList, TaskPipeline,
};
pub use service::{MediaScanner, ScannerDeps, default_pipeline};
pub use store::{InMemoryStore, MediaStore};
pub use types::{
    Album, AlbumId, ArtifactKind, DerivedArtifact, Media, MediaId, MediaType, NewMedia, User,
    UserId,
};
