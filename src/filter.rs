//! Decides which directories are submitted for scanning

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::mounts::MountTable;

/// Why a path was kept out of the scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The path is on the blacklist
    Blacklisted,
    /// The nearest enclosing mount is on another device
    OtherDevice(u64),
}

/// Blacklist and mount-boundary predicate, fixed for the whole scan
#[derive(Debug, Clone)]
pub struct PathFilter {
    blacklist: HashSet<PathBuf>,
    mounts: MountTable,
    scan_device: u64,
}

impl PathFilter {
    /// Create a filter for a scan rooted on `scan_device`
    pub fn new(blacklist: HashSet<PathBuf>, mounts: MountTable, scan_device: u64) -> Self {
        Self {
            blacklist,
            mounts,
            scan_device,
        }
    }

    /// Check a path, reporting why it was rejected
    pub fn check(&self, path: &Path) -> Result<(), Rejection> {
        if self.blacklist.contains(path) {
            return Err(Rejection::Blacklisted);
        }
        match self.mounts.lookup(path) {
            Some(device) if device != self.scan_device => Err(Rejection::OtherDevice(device)),
            _ => Ok(()),
        }
    }

    /// Check if a path may be submitted
    pub fn accepts(&self, path: &Path) -> bool {
        self.check(path).is_ok()
    }

    /// Device the scan is confined to
    pub fn scan_device(&self) -> u64 {
        self.scan_device
    }
}
