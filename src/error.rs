//! Error types for the scanner

use std::path::PathBuf;
use thiserror::Error;

/// Error kinds that can occur while setting up or running a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanErrorKind {
    /// Permission denied when accessing a file or directory
    PermissionDenied,
    /// File or directory not found
    NotFound,
    /// I/O error during file operations
    IoError,
    /// The device of the scan root could not be resolved
    RootUnresolvable,
    /// A worker thread could not be started
    WorkerSpawn,
    /// The worker pool was already terminated
    PoolTerminated,
    /// The configuration cannot be used to run a scan
    InvalidConfig,
    /// Unknown error
    Unknown,
}

/// Represents an error that occurred during scanning
#[derive(Debug, Clone, Error)]
#[error("{kind:?}: {message} (path: {path:?})")]
pub struct ScanError {
    /// The kind of error
    pub kind: ScanErrorKind,
    /// The path where the error occurred
    pub path: Option<PathBuf>,
    /// Human-readable error message
    pub message: String,
}

impl ScanError {
    /// Create a new scan error
    pub fn new(kind: ScanErrorKind, path: Option<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            kind,
            path,
            message: message.into(),
        }
    }

    /// Create a permission denied error
    pub fn permission_denied(path: PathBuf) -> Self {
        Self::new(
            ScanErrorKind::PermissionDenied,
            Some(path.clone()),
            format!("Permission denied: {:?}", path),
        )
    }

    /// The scan root could not be stat'd, so the scan device is unknown
    pub fn root_unresolvable(path: PathBuf, err: &std::io::Error) -> Self {
        Self::new(
            ScanErrorKind::RootUnresolvable,
            Some(path.clone()),
            format!("Cannot resolve device of {:?}: {}", path, err),
        )
    }

    /// A worker thread failed to start
    pub fn worker_spawn(id: usize, err: &std::io::Error) -> Self {
        Self::new(
            ScanErrorKind::WorkerSpawn,
            None,
            format!("Failed to start worker {}: {}", id, err),
        )
    }

    /// Submission to a pool that has been drained with termination
    pub fn pool_terminated() -> Self {
        Self::new(
            ScanErrorKind::PoolTerminated,
            None,
            "Worker pool has been terminated",
        )
    }

    /// Create an invalid configuration error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::new(ScanErrorKind::InvalidConfig, None, message)
    }

    /// Attach a path to an error produced without one
    pub fn with_path(mut self, path: PathBuf) -> Self {
        self.path = Some(path);
        self
    }

    /// Whether this error prevents the scan from starting
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            ScanErrorKind::RootUnresolvable
                | ScanErrorKind::WorkerSpawn
                | ScanErrorKind::InvalidConfig
        )
    }
}

impl From<std::io::Error> for ScanError {
    fn from(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::PermissionDenied => ScanErrorKind::PermissionDenied,
            std::io::ErrorKind::NotFound => ScanErrorKind::NotFound,
            _ => ScanErrorKind::IoError,
        };
        Self::new(kind, None, err.to_string())
    }
}

impl From<walkdir::Error> for ScanError {
    fn from(err: walkdir::Error) -> Self {
        let path = err.path().map(|p| p.to_path_buf());
        let kind = match err.io_error().map(|e| e.kind()) {
            Some(std::io::ErrorKind::PermissionDenied) => ScanErrorKind::PermissionDenied,
            Some(std::io::ErrorKind::NotFound) => ScanErrorKind::NotFound,
            Some(_) => ScanErrorKind::IoError,
            None => ScanErrorKind::Unknown,
        };
        Self::new(kind, path, err.to_string())
    }
}
