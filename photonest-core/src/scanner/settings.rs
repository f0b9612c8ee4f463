//! Runtime tuning knobs for the scanner.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

/// Settings consumed by the scan subsystem. Loading these from files or the
/// environment is the config crate's job.
#[derive(Clone, Debug)]
pub struct ScannerSettings {
    /// Upper bound on concurrently running album scans. Hot-reloadable at
    /// runtime through `ScanScheduler::reconfigure`.
    pub max_concurrent: usize,
    /// Interval between periodic full scan passes. `None` disables the
    /// periodic trigger.
    pub scan_interval: Option<Duration>,
    /// File extensions excluded from scanning.
    pub skip_list: SkipList,
    /// Minimum spacing between queue progress notifications.
    pub progress_interval: Duration,
    /// Root of the derived-artifact cache tree.
    pub cache_root: PathBuf,
}

impl Default for ScannerSettings {
    fn default() -> Self {
        Self {
            max_concurrent: num_cpus::get().max(1),
            scan_interval: None,
            skip_list: SkipList::default(),
            progress_interval: Duration::from_millis(500),
            cache_root: PathBuf::from("media_cache"),
        }
    }
}

/// Deny-list of file extensions, matched case-insensitively.
#[derive(Clone, Debug, Default)]
pub struct SkipList {
    extensions: HashSet<String>,
}

impl SkipList {
    /// Parse a user-supplied list. Entries may be separated by commas or
    /// semicolons and carry an optional leading dot; case is ignored.
    pub fn parse(raw: &str) -> Self {
        let extensions = raw
            .split([',', ';'])
            .map(str::trim)
            .map(|entry| entry.trim_start_matches('.'))
            .filter(|entry| !entry.is_empty())
            .map(|entry| entry.to_ascii_lowercase())
            .collect();
        Self { extensions }
    }

    pub fn contains(&self, extension: &str) -> bool {
        self.extensions.contains(&extension.to_ascii_lowercase())
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }
}
