//! Per-pass memoization shared by every job spawned from one trigger pass.
//!
//! Correctness relies on the cache being rebuilt for each scan pass: once a
//! key is populated it is never invalidated within the same lifetime.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use dashmap::DashMap;

use crate::error::Result;
use crate::scanner::fs::FileSystem;
use crate::scanner::ignore::IgnoreRules;
use crate::scanner::settings::SkipList;
use crate::types::MediaType;

/// Memoized filesystem facts for one scan pass. Every accessor is safe for
/// concurrent invocation; jobs share the cache by reference and may not
/// assume exclusive access.
#[derive(Debug, Default)]
pub struct ScanCache {
    contains_media: DashMap<PathBuf, bool>,
    media_types: DashMap<PathBuf, MediaType>,
    ignore_rules: DashMap<PathBuf, Arc<IgnoreRules>>,
}

impl ScanCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Detected media type for `path`, computing on miss. Only supported
    /// types are cached, so an unrecognized file can be retried on a later
    /// pass once it is stable on disk.
    pub fn media_type(&self, path: &Path) -> Option<MediaType> {
        if let Some(cached) = self.media_types.get(path) {
            return Some(*cached);
        }
        let detected = MediaType::from_path(path)?;
        self.media_types.insert(path.to_path_buf(), detected);
        Some(detected)
    }

    /// Cached contains-media verdict for a directory, if one was recorded.
    pub fn contains_media(&self, path: &Path) -> Option<bool> {
        self.contains_media.get(path).map(|entry| *entry)
    }

    pub fn set_contains_media(&self, path: impl Into<PathBuf>, value: bool) {
        self.contains_media.insert(path.into(), value);
    }

    /// Mark every parent directory of `leaf`, up to but excluding `root`,
    /// as containing media. A single found photo thereby marks its whole
    /// ancestor chain without re-scanning siblings.
    pub fn mark_ancestors_contain_media(&self, leaf: &Path, root: &Path) {
        for ancestor in leaf.ancestors().skip(1) {
            if ancestor == root || !ancestor.starts_with(root) {
                break;
            }
            self.contains_media.insert(ancestor.to_path_buf(), true);
        }
    }

    pub fn ignore_rules(&self, dir: &Path) -> Option<Arc<IgnoreRules>> {
        self.ignore_rules.get(dir).map(|entry| Arc::clone(&entry))
    }

    pub fn set_ignore_rules(&self, dir: impl Into<PathBuf>, rules: Arc<IgnoreRules>) {
        self.ignore_rules.insert(dir.into(), rules);
    }

    /// Whether `path` should never be scanned: hidden names (leading dot)
    /// and deny-listed extensions. Pure; colocated here because callers
    /// already hold a cache handle.
    pub fn should_skip(&self, path: &Path, skip: &SkipList) -> bool {
        let hidden = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with('.'));
        if hidden {
            return true;
        }
        path.extension()
            .and_then(|extension| extension.to_str())
            .is_some_and(|extension| skip.contains(extension))
    }
}

/// Recursively probe whether `dir` holds at least one scannable media file,
/// filling the cache as it goes. On the first hit the ancestor chain up to
/// `root` is marked so sibling probes return immediately.
pub fn directory_contains_media<'a>(
    fs: &'a dyn FileSystem,
    cache: &'a ScanCache,
    dir: &'a Path,
    root: &'a Path,
    skip: &'a SkipList,
) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>> {
    Box::pin(async move {
        if let Some(cached) = cache.contains_media(dir) {
            return Ok(cached);
        }

        let mut subdirs = Vec::new();
        for path in fs.read_dir(dir).await? {
            let meta = fs.metadata(&path).await?;
            if meta.is_dir {
                subdirs.push(path);
                continue;
            }
            if meta.is_file
                && !cache.should_skip(&path, skip)
                && cache.media_type(&path).is_some()
            {
                cache.set_contains_media(dir, true);
                cache.mark_ancestors_contain_media(&path, root);
                return Ok(true);
            }
        }

        for subdir in subdirs {
            if directory_contains_media(fs, cache, &subdir, root, skip).await? {
                cache.set_contains_media(dir, true);
                return Ok(true);
            }
        }

        cache.set_contains_media(dir, false);
        Ok(false)
    })
}
