//! Progress reporting module for scan operations
//!
//! This module streams scan progress to external callers as JSON lines on
//! stderr. It is a side channel: nothing reported here changes scan totals.

use serde::Serialize;
use std::cell::Cell;
use std::io::Write;
use std::time::Instant;

use crate::config::ScanConfig;
use crate::error::ScanError;
use crate::models::{ScanProgress, ScanResult};

/// Start message sent when scan begins
#[derive(Debug, Clone, Serialize)]
pub struct StartMessage {
    /// Message type identifier
    #[serde(rename = "_t")]
    pub msg_type: &'static str,
    /// Sequence number
    pub seq: u64,
    /// Timestamp in milliseconds since reporter creation
    pub ts: u64,
    /// Scan root path
    pub root: String,
    /// Worker pool size
    pub threads: usize,
    /// Number of blacklisted paths
    pub excluded: usize,
}

impl StartMessage {
    /// Create a new start message
    pub fn new(seq: u64, ts: u64, root: String, threads: usize, excluded: usize) -> Self {
        Self {
            msg_type: "start",
            seq,
            ts,
            root,
            threads,
            excluded,
        }
    }
}

/// Progress message sent during scan
#[derive(Debug, Clone, Serialize)]
pub struct ProgressMessage {
    /// Message type identifier ("p" for progress)
    #[serde(rename = "_t")]
    pub msg_type: &'static str,
    /// Sequence number
    pub seq: u64,
    /// Timestamp in milliseconds since reporter creation
    pub ts: u64,
    /// Number of directories scanned
    #[serde(rename = "d")]
    pub dirs: u64,
    /// Directories waiting on a worker
    #[serde(rename = "q")]
    pub pending: u64,
    /// Bytes found so far
    #[serde(rename = "b")]
    pub bytes: u64,
    /// Most recently scanned directory
    pub dir: String,
    /// Elapsed time in milliseconds
    pub ms: u64,
}

impl ProgressMessage {
    /// Create a new progress message
    pub fn new(seq: u64, ts: u64, progress: &ScanProgress) -> Self {
        Self {
            msg_type: "p",
            seq,
            ts,
            dirs: progress.scanned_dirs,
            pending: progress.pending_dirs,
            bytes: progress.bytes,
            dir: progress.current_dir.clone(),
            ms: progress.elapsed_ms,
        }
    }
}

/// Error message sent when a directory could not be read
#[derive(Debug, Clone, Serialize)]
pub struct ErrorProgressMessage {
    /// Message type identifier ("err" for error)
    #[serde(rename = "_t")]
    pub msg_type: &'static str,
    /// Sequence number
    pub seq: u64,
    /// Timestamp in milliseconds since reporter creation
    pub ts: u64,
    /// Error type/category
    pub error_type: String,
    /// Error message description
    pub message: String,
    /// Path that caused the error (if available)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl ErrorProgressMessage {
    /// Create a new error progress message
    pub fn new(
        seq: u64,
        ts: u64,
        error_type: String,
        message: String,
        path: Option<String>,
    ) -> Self {
        Self {
            msg_type: "err",
            seq,
            ts,
            error_type,
            message,
            path,
        }
    }
}

/// Done message sent when scan completes
#[derive(Debug, Clone, Serialize)]
pub struct DoneMessage {
    /// Message type identifier ("done" for completion)
    #[serde(rename = "_t")]
    pub msg_type: &'static str,
    /// Sequence number
    pub seq: u64,
    /// Timestamp in milliseconds since reporter creation
    pub ts: u64,
    /// Total number of directories scanned
    #[serde(rename = "td")]
    pub total_dirs: usize,
    /// Total bytes found
    #[serde(rename = "tb")]
    pub total_bytes: u64,
    /// Number of unreadable directories
    #[serde(rename = "ec")]
    pub error_count: usize,
    /// Number of skipped entries
    #[serde(rename = "sk")]
    pub skipped_entries: u64,
    /// Total scan duration in milliseconds
    pub ms: u64,
}

impl DoneMessage {
    /// Create a done message from a finished scan
    pub fn new(seq: u64, ts: u64, result: &ScanResult) -> Self {
        Self {
            msg_type: "done",
            seq,
            ts,
            total_dirs: result.dir_count(),
            total_bytes: result.total_bytes(),
            error_count: result.error_count(),
            skipped_entries: result.skipped_entries,
            ms: result.duration_ms,
        }
    }
}

/// Progress reporter for outputting scan progress to stderr
///
/// Lives on the coordinator thread; handles timing, sequence numbers and
/// formatting of the message types.
pub struct ProgressReporter {
    /// Whether progress reporting is enabled
    enabled: bool,
    /// Reporting interval in milliseconds
    interval_ms: u64,
    /// Last report time
    last_report: Cell<Instant>,
    /// Sequence number for messages
    seq: Cell<u64>,
    /// Start time of the reporter
    start_time: Instant,
}

impl ProgressReporter {
    /// Create a new ProgressReporter
    ///
    /// # Arguments
    /// * `enabled` - Whether progress reporting is enabled
    /// * `interval_ms` - Minimum interval between progress messages in milliseconds
    pub fn new(enabled: bool, interval_ms: u64) -> Self {
        let now = Instant::now();
        Self {
            enabled,
            interval_ms,
            last_report: Cell::new(now),
            seq: Cell::new(0),
            start_time: now,
        }
    }

    /// Create a reporter from the scan configuration
    pub fn from_config(config: &ScanConfig) -> Self {
        Self::new(config.show_progress, config.progress_interval_ms)
    }

    /// Check if enough time has passed since the last report
    pub fn should_report(&self) -> bool {
        if !self.enabled {
            return false;
        }
        let elapsed = self.last_report.get().elapsed().as_millis() as u64;
        elapsed >= self.interval_ms
    }

    /// Get the next sequence number (monotonically increasing)
    pub fn next_seq(&self) -> u64 {
        let seq = self.seq.get();
        self.seq.set(seq + 1);
        seq
    }

    /// Get the current timestamp in milliseconds since reporter creation
    pub fn current_timestamp(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    /// Output a serializable message to stderr as JSON
    pub fn output_to_stderr<T: Serialize>(&self, msg: &T) {
        if let Ok(json) = serde_json::to_string(msg) {
            eprintln!("{}", json);
            std::io::stderr().flush().ok();
        }
    }

    /// Report scan start
    pub fn report_start(&self, config: &ScanConfig) {
        if !self.enabled {
            return;
        }

        let msg = StartMessage::new(
            self.next_seq(),
            self.current_timestamp(),
            config.root.to_string_lossy().to_string(),
            config.effective_threads(),
            config.blacklist.len(),
        );

        self.output_to_stderr(&msg);
    }

    /// Report scan progress
    ///
    /// Returns true if a message was actually sent (respects interval timing).
    pub fn report_progress(&self, progress: &ScanProgress) -> bool {
        if !self.should_report() {
            return false;
        }

        let msg = ProgressMessage::new(self.next_seq(), self.current_timestamp(), progress);

        self.output_to_stderr(&msg);
        self.last_report.set(Instant::now());
        true
    }

    /// Report an unreadable directory
    ///
    /// Sent immediately (ignores interval timing).
    pub fn report_error(&self, error: &ScanError) {
        if !self.enabled {
            return;
        }

        let msg = ErrorProgressMessage::new(
            self.next_seq(),
            self.current_timestamp(),
            format!("{:?}", error.kind),
            error.message.clone(),
            error.path.as_ref().map(|p| p.to_string_lossy().to_string()),
        );

        self.output_to_stderr(&msg);
    }

    /// Report scan completion
    pub fn report_done(&self, result: &ScanResult) {
        if !self.enabled {
            return;
        }

        let msg = DoneMessage::new(self.next_seq(), self.current_timestamp(), result);
        self.output_to_stderr(&msg);
    }

    /// Check if the reporter is enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}
