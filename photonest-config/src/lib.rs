//! Configuration loading for Photonest.
//!
//! The core crate only consumes [`ScannerSettings`]; this crate owns the
//! serde-facing model, file/env loading, and the conversion between the two.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::info;

use photonest_core::{ScannerSettings, SkipList};

/// Source that produced the scanner configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConfigSource {
    #[default]
    Default,
    EnvPath(PathBuf),
    EnvInline,
    File(PathBuf),
}

/// Top-level scanner settings as users write them. Use these to tune how
/// many album scans run in parallel, how often the periodic trigger fires,
/// and which files are never scanned.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Upper bound on concurrently running album scans. Zero selects the
    /// number of logical CPUs.
    pub concurrent_workers: usize,
    /// Interval between periodic full scans in humantime notation
    /// ("30m", "2h 30m"). Empty or "0" disables the periodic trigger.
    pub scan_interval: String,
    /// File extensions excluded from scanning. Comma or semicolon
    /// separated, leading dots optional, case-insensitive
    /// ("gpx, .kml; geojson").
    pub skip_extensions: String,
    /// Root directory of the derived-artifact cache tree.
    pub cache_path: PathBuf,
    /// Minimum spacing (milliseconds) between queue progress notifications.
    pub progress_interval_ms: u64,
    /// Whether to watch album roots for filesystem changes.
    pub watch_filesystem: bool,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            concurrent_workers: 0,
            scan_interval: String::new(),
            skip_extensions: String::new(),
            cache_path: PathBuf::from("media_cache"),
            progress_interval_ms: 500,
            watch_filesystem: true,
        }
    }
}

impl ScannerConfig {
    /// Load scanner configuration overrides from the environment.
    /// Evaluation order:
    /// 1) `$PHOTONEST_CONFIG_PATH` (TOML or JSON file),
    /// 2) `$PHOTONEST_CONFIG_JSON` (inline JSON),
    /// 3) defaults if neither is set.
    pub fn load_from_env() -> anyhow::Result<(Self, ConfigSource)> {
        if let Ok(path_raw) = env::var("PHOTONEST_CONFIG_PATH")
            && !path_raw.trim().is_empty()
        {
            let path = PathBuf::from(path_raw.trim());
            let config = Self::load_from_file(&path)?;
            info!(path = %path.display(), "scanner config loaded from $PHOTONEST_CONFIG_PATH");
            return Ok((config, ConfigSource::EnvPath(path)));
        }

        if let Ok(inline) = env::var("PHOTONEST_CONFIG_JSON")
            && !inline.trim().is_empty()
        {
            let config =
                serde_json::from_str(&inline).context("parsing $PHOTONEST_CONFIG_JSON")?;
            info!("scanner config loaded from $PHOTONEST_CONFIG_JSON");
            return Ok((config, ConfigSource::EnvInline));
        }

        Ok((Self::default(), ConfigSource::Default))
    }

    /// Load from a TOML or JSON file, chosen by extension (anything that is
    /// not `.json` parses as TOML).
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading scanner config {}", path.display()))?;
        match path.extension().and_then(|extension| extension.to_str()) {
            Some("json") => serde_json::from_str(&raw)
                .with_context(|| format!("parsing JSON config {}", path.display())),
            _ => toml::from_str(&raw)
                .with_context(|| format!("parsing TOML config {}", path.display())),
        }
    }

    /// Parsed periodic interval; `None` disables the trigger.
    pub fn parsed_interval(&self) -> anyhow::Result<Option<Duration>> {
        let raw = self.scan_interval.trim();
        if raw.is_empty() || raw == "0" {
            return Ok(None);
        }
        let parsed = humantime::parse_duration(raw)
            .with_context(|| format!("invalid scan_interval {raw:?}"))?;
        Ok(Some(parsed).filter(|interval| !interval.is_zero()))
    }

    /// Convert into the core runtime settings.
    pub fn into_settings(self) -> anyhow::Result<ScannerSettings> {
        let scan_interval = self.parsed_interval()?;
        let defaults = ScannerSettings::default();
        Ok(ScannerSettings {
            max_concurrent: if self.concurrent_workers == 0 {
                defaults.max_concurrent
            } else {
                self.concurrent_workers
            },
            scan_interval,
            skip_list: SkipList::parse(&self.skip_extensions),
            progress_interval: Duration::from_millis(self.progress_interval_ms),
            cache_root: self.cache_path,
        })
    }
}
