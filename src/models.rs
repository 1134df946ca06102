//! Core data models for the scanner

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::ScanError;

/// Bytes of regular files directly inside each scanned directory
pub type ResultMap = HashMap<PathBuf, u64>;

/// Outcome of scanning a single directory
#[derive(Debug, Clone)]
pub struct PathResult {
    /// The directory that was scanned
    pub path: PathBuf,
    /// Total size of the regular files directly in the directory
    pub file_bytes: u64,
    /// Subdirectories found, still to be filtered by the caller
    pub subdirectories: Vec<PathBuf>,
    /// Entries skipped because their metadata could not be read
    pub skipped_entries: u64,
    /// Set when the directory could not be opened
    pub error: Option<ScanError>,
}

impl PathResult {
    /// Create a result for a directory that was listed
    pub fn new(path: PathBuf, file_bytes: u64, subdirectories: Vec<PathBuf>) -> Self {
        Self {
            path,
            file_bytes,
            subdirectories,
            skipped_entries: 0,
            error: None,
        }
    }

    /// A directory that could not be opened counts as empty
    pub fn unreadable(path: PathBuf, error: ScanError) -> Self {
        Self {
            error: Some(error),
            ..Self::new(path, 0, Vec::new())
        }
    }

    /// Set the number of skipped entries
    pub fn with_skipped(mut self, skipped: u64) -> Self {
        self.skipped_entries = skipped;
        self
    }

    /// Check if the directory could be listed
    pub fn is_readable(&self) -> bool {
        self.error.is_none()
    }
}

/// Result of a whole scan
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanResult {
    /// Normalised root path
    pub root: PathBuf,
    /// File bytes per directory
    pub sizes: ResultMap,
    /// Entries skipped because their metadata could not be read
    pub skipped_entries: u64,
    /// Directory scans that failed outright
    pub failed_tasks: u64,
    /// Directories that could not be opened and were counted as empty
    #[serde(skip)]
    pub errors: Vec<ScanError>,
    /// Total scan duration in milliseconds
    pub duration_ms: u64,
}

impl ScanResult {
    /// Create a new empty scan result
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            ..Self::default()
        }
    }

    /// Bytes of files directly in the root
    pub fn root_bytes(&self) -> u64 {
        self.sizes.get(&self.root).copied().unwrap_or(0)
    }

    /// Bytes of all files found
    pub fn total_bytes(&self) -> u64 {
        self.sizes.values().sum()
    }

    /// Bytes of all files under `dir`, `dir` included
    pub fn subtree_bytes(&self, dir: &Path) -> u64 {
        self.sizes
            .iter()
            .filter(|(path, _)| path.starts_with(dir))
            .map(|(_, bytes)| bytes)
            .sum()
    }

    /// Number of directories scanned
    pub fn dir_count(&self) -> usize {
        self.sizes.len()
    }

    /// Get the number of errors
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Check if every directory could be read
    pub fn is_success(&self) -> bool {
        self.errors.is_empty() && self.failed_tasks == 0
    }

    /// Entries sorted by descending size, ties broken by ascending path
    pub fn sorted(&self) -> Vec<(&Path, u64)> {
        let mut entries: Vec<(&Path, u64)> = self
            .sizes
            .iter()
            .map(|(path, bytes)| (path.as_path(), *bytes))
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        entries
    }
}

/// Progress information during a scan
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanProgress {
    /// Number of directories scanned so far
    pub scanned_dirs: u64,
    /// Directories submitted but not yet collected
    pub pending_dirs: u64,
    /// Bytes found so far
    pub bytes: u64,
    /// Most recently scanned directory
    pub current_dir: String,
    /// Elapsed time in milliseconds
    pub elapsed_ms: u64,
}

impl ScanProgress {
    /// Create a new progress instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Update the current directory
    pub fn with_dir(mut self, dir: impl Into<String>) -> Self {
        self.current_dir = dir.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ScanResult {
        let mut result = ScanResult::new(PathBuf::from("/r"));
        result.sizes.insert(PathBuf::from("/r"), 350);
        result.sizes.insert(PathBuf::from("/r/sub"), 5000);
        result.sizes.insert(PathBuf::from("/r/sub/deep"), 10);
        result.sizes.insert(PathBuf::from("/r/subway"), 350);
        result
    }

    #[test]
    fn test_totals() {
        let result = sample();
        assert_eq!(result.root_bytes(), 350);
        assert_eq!(result.total_bytes(), 5710);
        assert_eq!(result.dir_count(), 4);
    }

    #[test]
    fn test_subtree_bytes_is_component_wise() {
        let result = sample();
        assert_eq!(result.subtree_bytes(Path::new("/r/sub")), 5010);
        assert_eq!(result.subtree_bytes(Path::new("/r")), 5710);
    }

    #[test]
    fn test_sorted_breaks_ties_by_path() {
        let result = sample();
        let sorted = result.sorted();
        assert_eq!(
            sorted,
            vec![
                (Path::new("/r/sub"), 5000),
                (Path::new("/r"), 350),
                (Path::new("/r/subway"), 350),
                (Path::new("/r/sub/deep"), 10),
            ]
        );
    }

    #[test]
    fn test_unreadable_path_result() {
        let err = ScanError::permission_denied(PathBuf::from("/locked"));
        let result = PathResult::unreadable(PathBuf::from("/locked"), err);
        assert_eq!(result.file_bytes, 0);
        assert!(result.subdirectories.is_empty());
        assert!(!result.is_readable());
    }

    #[test]
    fn test_scan_result_default() {
        let result = ScanResult::default();
        assert_eq!(result.total_bytes(), 0);
        assert_eq!(result.root_bytes(), 0);
        assert!(result.is_success());
    }

    #[test]
    fn test_scan_result_json_skips_errors() {
        let mut result = sample();
        result
            .errors
            .push(ScanError::permission_denied(PathBuf::from("/r/locked")));
        let json: serde_json::Value = serde_json::to_value(&result).unwrap();
        assert_eq!(json["sizes"]["/r/sub"], 5000);
        assert!(json.get("errors").is_none());
    }

    #[test]
    fn test_progress_with_dir() {
        let progress = ScanProgress {
            scanned_dirs: 3,
            ..ScanProgress::new()
        }
        .with_dir("/r/sub");
        assert_eq!(progress.scanned_dirs, 3);
        assert_eq!(progress.current_dir, "/r/sub");
        assert_eq!(progress.bytes, 0);
    }
}
