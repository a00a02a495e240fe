//! Runtime configuration for previews, folders and sorting.
//!
//! Defaults match the classic culling layout: the current image plus five
//! ahead and five behind kept decoded, four decode workers, and `keep/` and
//! `delete/` subfolders next to the RAW files. Each numeric knob can be
//! overridden through a `RAWCULL_*` environment variable.

use std::path::Path;
use std::time::Duration;

use tracing::warn;

use crate::error::{CullError, Result};

/// Number of images decoded ahead of the current one.
pub const DEFAULT_PRELOAD_AHEAD: usize = 5;

/// Number of images decoded behind the current one.
pub const DEFAULT_PRELOAD_BEHIND: usize = 5;

/// Resident previews: current + ahead + behind.
pub const DEFAULT_CACHE_SIZE: usize = DEFAULT_PRELOAD_AHEAD + DEFAULT_PRELOAD_BEHIND + 1;

/// Background decode threads.
pub const DEFAULT_WORKERS: usize = 4;

/// Upper bound for a single external conversion.
pub const DEFAULT_DECODE_TIMEOUT_SECS: u64 = 30;

/// Maximum number of queued prefetch requests.
pub const DEFAULT_QUEUE_DEPTH: usize = 256;

pub const KEEP_FOLDER: &str = "keep";
pub const DELETE_FOLDER: &str = "delete";
pub const SIDECAR_EXTENSION: &str = "xmp";

/// RAW extensions accepted by the scanner, lowercase without the dot.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "cr2", "cr3", "nef", "arw", "orf", "raf", "dng", "rw2", "pef", "srw",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CullConfig {
    pub preload_ahead: usize,
    pub preload_behind: usize,
    pub cache_size: usize,
    pub workers: usize,
    pub queue_depth: usize,
    pub decode_timeout: Duration,
    pub keep_folder: String,
    pub delete_folder: String,
    pub sidecar_extension: String,
    pub extensions: Vec<String>,
}

impl Default for CullConfig {
    fn default() -> Self {
        Self {
            preload_ahead: DEFAULT_PRELOAD_AHEAD,
            preload_behind: DEFAULT_PRELOAD_BEHIND,
            cache_size: DEFAULT_CACHE_SIZE,
            workers: DEFAULT_WORKERS,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            decode_timeout: Duration::from_secs(DEFAULT_DECODE_TIMEOUT_SECS),
            keep_folder: KEEP_FOLDER.to_string(),
            delete_folder: DELETE_FOLDER.to_string(),
            sidecar_extension: SIDECAR_EXTENSION.to_string(),
            extensions: SUPPORTED_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }
}

fn env_usize(name: &str) -> Option<usize> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|v| *v > 0)
}

impl CullConfig {
    /// Defaults overlaid with any valid `RAWCULL_*` environment overrides.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(v) = env_usize("RAWCULL_PRELOAD_AHEAD") {
            config.preload_ahead = v;
        }
        if let Some(v) = env_usize("RAWCULL_PRELOAD_BEHIND") {
            config.preload_behind = v;
        }
        if let Some(v) = env_usize("RAWCULL_CACHE_SIZE") {
            config.cache_size = v;
        }
        if let Some(v) = env_usize("RAWCULL_WORKERS") {
            config.workers = v;
        }
        if let Some(v) = env_usize("RAWCULL_DECODE_TIMEOUT_SECS") {
            config.decode_timeout = Duration::from_secs(v as u64);
        }
        config
    }

    /// Smallest capacity that keeps the requested image resident through its own sweep.
    pub fn min_cache_size(&self) -> usize {
        self.preload_ahead + self.preload_behind + 1
    }

    /// Check invariants, raising the cache size to the window when it is too small.
    pub fn validate(mut self) -> Result<Self> {
        if self.workers == 0 {
            return Err(CullError::InvalidConfig("workers must be at least 1".into()));
        }
        if self.queue_depth == 0 {
            return Err(CullError::InvalidConfig(
                "queue depth must be at least 1".into(),
            ));
        }
        if self.keep_folder.is_empty() || self.delete_folder.is_empty() {
            return Err(CullError::InvalidConfig(
                "sort folder names must not be empty".into(),
            ));
        }
        if self.keep_folder.eq_ignore_ascii_case(&self.delete_folder) {
            return Err(CullError::InvalidConfig(format!(
                "keep and delete folders are both {:?}",
                self.keep_folder
            )));
        }
        let min = self.min_cache_size();
        if self.cache_size < min {
            warn!(
                configured = self.cache_size,
                min, "Cache size smaller than prefetch window, raising"
            );
            self.cache_size = min;
        }
        Ok(self)
    }

    /// Whether `path` has one of the configured RAW extensions.
    pub fn is_supported(&self, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))
    }

    pub fn is_sidecar(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case(&self.sidecar_extension))
            .unwrap_or(false)
    }
}
