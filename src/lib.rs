//! Per-directory disk usage scanner
//!
//! A fixed-size pool of worker threads lists directories while a single
//! coordinator thread filters, submits and accumulates the results. The scan
//! stays on the root's device and skips virtual filesystems such as `/proc`.

pub mod config;
pub mod error;
pub mod filter;
pub mod models;
pub mod mounts;
pub mod pool;
pub mod progress;
pub mod report;
pub mod scanner;
pub mod worker;

pub use config::ScanConfig;
pub use error::{ScanError, ScanErrorKind};
pub use filter::{PathFilter, Rejection};
pub use models::{PathResult, ResultMap, ScanProgress, ScanResult};
pub use mounts::MountTable;
pub use pool::WorkerPool;
pub use progress::ProgressReporter;
pub use report::FormatOptions;
pub use scanner::{process_directory, scan, scan_with_config, Scanner};
pub use worker::{Worker, WorkerState};
