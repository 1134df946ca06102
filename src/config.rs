//! Configuration for the scanner

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::mounts::MountTable;

/// Default pool size when none is given on the command line
pub const DEFAULT_THREADS: usize = 50;

/// Default wait between grooming passes while the pool is saturated
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10;

/// Default minimum interval between progress messages
pub const DEFAULT_PROGRESS_INTERVAL_MS: u64 = 500;

/// Configuration for a scan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Root directory to scan
    pub root: PathBuf,

    /// Number of worker threads
    /// 0 means auto-detect (CPU cores × 2)
    pub num_threads: usize,

    /// Upper bound on a single wait while the pool is saturated or idle
    pub poll_interval_ms: u64,

    /// Paths that are never scanned, wherever they appear under the root
    pub blacklist: HashSet<PathBuf>,

    /// Mount table to filter against
    /// If None, the system mount table is read when the scan starts
    pub mounts: Option<MountTable>,

    /// Whether to stream JSON progress messages to stderr
    pub show_progress: bool,

    /// Minimum interval between progress messages
    pub progress_interval_ms: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            num_threads: DEFAULT_THREADS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            blacklist: Self::default_blacklist(),
            mounts: None,
            show_progress: false,
            progress_interval_ms: DEFAULT_PROGRESS_INTERVAL_MS,
        }
    }
}

impl ScanConfig {
    /// Create a config builder
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder::new()
    }

    /// Virtual filesystems that are never worth scanning
    pub fn default_blacklist() -> HashSet<PathBuf> {
        ["/proc", "/sys"].iter().map(PathBuf::from).collect()
    }

    /// Check if a path is blacklisted
    pub fn is_blacklisted(&self, path: &Path) -> bool {
        self.blacklist.contains(path)
    }

    /// Get the effective number of threads
    pub fn effective_threads(&self) -> usize {
        if self.num_threads == 0 {
            // Auto-detect: CPU cores × 2
            std::thread::available_parallelism()
                .map(|p| p.get() * 2)
                .unwrap_or(4)
        } else {
            self.num_threads
        }
    }

    /// Wait between grooming passes
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// The configured mount table, or the system one
    pub fn resolve_mounts(&self) -> MountTable {
        match &self.mounts {
            Some(mounts) => mounts.clone(),
            None => MountTable::load(),
        }
    }
}

/// Builder for ScanConfig
#[derive(Debug, Default)]
pub struct ScanConfigBuilder {
    config: ScanConfig,
}

impl ScanConfigBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the root directory
    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.root = root.into();
        self
    }

    /// Set the number of threads
    pub fn num_threads(mut self, threads: usize) -> Self {
        self.config.num_threads = threads;
        self
    }

    /// Set the poll interval in milliseconds
    pub fn poll_interval_ms(mut self, interval: u64) -> Self {
        self.config.poll_interval_ms = interval;
        self
    }

    /// Add a path to the blacklist
    pub fn exclude(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.blacklist.insert(path.into());
        self
    }

    /// Use the given mount table instead of reading the system one
    pub fn mounts(mut self, mounts: MountTable) -> Self {
        self.config.mounts = Some(mounts);
        self
    }

    /// Enable or disable progress messages
    pub fn show_progress(mut self, enabled: bool) -> Self {
        self.config.show_progress = enabled;
        self
    }

    /// Set the progress interval in milliseconds
    pub fn progress_interval_ms(mut self, interval: u64) -> Self {
        self.config.progress_interval_ms = interval;
        self
    }

    /// Build the config
    pub fn build(self) -> ScanConfig {
        self.config
    }
}
