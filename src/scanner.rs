//! Scanner module - the directory task and the coordinator that drives it
//!
//! The coordinator runs on the calling thread. It owns the result map, the
//! filter and the set of submitted paths; workers only ever see the path
//! they were handed and return a plain [`PathResult`].

use log::{debug, error, info, trace, warn};
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::time::Instant;
use walkdir::WalkDir;

use crate::config::ScanConfig;
use crate::error::ScanError;
use crate::filter::{PathFilter, Rejection};
use crate::models::{PathResult, ResultMap, ScanProgress, ScanResult};
use crate::mounts::device_id;
use crate::pool::WorkerPool;
use crate::progress::ProgressReporter;

/// Scan `root` with `pool_size` workers and return file bytes per directory
pub fn scan(root: impl AsRef<Path>, pool_size: usize) -> Result<ResultMap, ScanError> {
    if pool_size == 0 {
        return Err(ScanError::invalid_config("pool size must be at least 1"));
    }
    let config = ScanConfig::builder()
        .root(root.as_ref())
        .num_threads(pool_size)
        .build();
    Ok(Scanner::new(config).run()?.sizes)
}

/// Perform a full scan of the configured root
pub fn scan_with_config(config: &ScanConfig) -> Result<ScanResult, ScanError> {
    Scanner::new(config.clone()).run()
}

/// Sum the regular files directly in `path` and list its subdirectories
///
/// Never fails: a directory that cannot be opened is reported as empty, with
/// the error attached, and entries whose metadata cannot be read are skipped.
/// Symlinks are never followed.
pub fn process_directory(path: PathBuf) -> PathResult {
    let mut file_bytes = 0u64;
    let mut subdirectories = Vec::new();
    let mut skipped = 0u64;

    let walker = WalkDir::new(&path)
        .min_depth(1)
        .max_depth(1)
        .follow_links(false);

    for entry in walker {
        match entry {
            Ok(entry) => match entry.metadata() {
                Ok(metadata) => {
                    let file_type = metadata.file_type();
                    if file_type.is_dir() {
                        subdirectories.push(entry.into_path());
                    } else if file_type.is_file() {
                        file_bytes += metadata.len();
                    }
                }
                Err(e) => {
                    trace!("Skipping {:?}: {}", entry.path(), e);
                    skipped += 1;
                }
            },
            Err(e) if e.depth() == 0 => {
                let err = ScanError::from(e).with_path(path.clone());
                return PathResult::unreadable(path, err);
            }
            Err(e) => {
                trace!("Skipping entry in {:?}: {}", path, e);
                skipped += 1;
            }
        }
    }

    PathResult::new(path, file_bytes, subdirectories).with_skipped(skipped)
}

/// Make the root absolute and drop `.` segments and trailing separators
pub fn normalize_root(root: &Path) -> Result<PathBuf, ScanError> {
    absolutize(root).map_err(|e| ScanError::root_unresolvable(root.to_path_buf(), &e))
}

/// Absolute form of a blacklist, so entries match the child paths of an
/// absolute root however they were written
pub fn normalize_blacklist(blacklist: &HashSet<PathBuf>) -> HashSet<PathBuf> {
    blacklist
        .iter()
        .map(|path| match absolutize(path) {
            Ok(absolute) => absolute,
            Err(e) => {
                warn!("Cannot make {:?} absolute, matching it as given: {}", path, e);
                path.clone()
            }
        })
        .collect()
}

fn absolutize(path: &Path) -> std::io::Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    Ok(absolute
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect())
}

/// Drives a scan: seeds the pool, harvests results, resubmits children
pub struct Scanner {
    config: ScanConfig,
}

impl Scanner {
    /// Create a scanner for the given configuration
    pub fn new(config: ScanConfig) -> Self {
        Self { config }
    }

    /// Run the scan to completion
    ///
    /// Fails only if the scan cannot start: the root's device cannot be
    /// resolved or the worker pool cannot be built.
    pub fn run(&self) -> Result<ScanResult, ScanError> {
        let start = Instant::now();
        let root = normalize_root(&self.config.root)?;
        let scan_device = std::fs::symlink_metadata(&root)
            .map(|metadata| device_id(&metadata))
            .map_err(|e| ScanError::root_unresolvable(root.clone(), &e))?;

        let filter = PathFilter::new(
            normalize_blacklist(&self.config.blacklist),
            self.config.resolve_mounts(),
            scan_device,
        );
        let threads = self.config.effective_threads();
        let poll_interval = self.config.poll_interval();
        let mut pool = WorkerPool::new(threads, poll_interval)?;

        info!("Scanning {:?} with {} workers", root, threads);
        let reporter = ProgressReporter::from_config(&self.config);
        reporter.report_start(&self.config);

        let mut walk = Walk {
            filter,
            submitted: HashSet::new(),
            result: ScanResult::new(root.clone()),
            reporter,
            start,
        };

        walk.offer(&mut pool, root)?;

        let mut batch = Vec::new();
        loop {
            let was_busy = pool.poll(&mut batch);
            if batch.is_empty() {
                if !was_busy {
                    // Nothing running and nothing new: only this thread
                    // submits, so no work can appear after this point.
                    break;
                }
                pool.wait_for_completion(poll_interval);
                continue;
            }
            for path_result in batch.drain(..) {
                walk.record(&mut pool, path_result)?;
            }
        }

        let mut leftovers = Vec::new();
        pool.drain(true, &mut leftovers);
        for path_result in leftovers {
            error!(
                "Pool was drained but still held a result for {:?}",
                path_result.path
            );
            walk.record_size(path_result);
        }

        let (mut result, reporter) = walk.finish();
        result.failed_tasks = pool.failed_jobs();
        result.duration_ms = start.elapsed().as_millis() as u64;

        info!(
            "Scanned {} directories, {} bytes in {}ms",
            result.dir_count(),
            result.total_bytes(),
            result.duration_ms
        );
        if !result.errors.is_empty() {
            warn!(
                "{} directories could not be read and were counted as empty",
                result.errors.len()
            );
        }

        reporter.report_done(&result);
        Ok(result)
    }
}

/// Coordinator-owned state for one scan
struct Walk {
    filter: PathFilter,
    submitted: HashSet<PathBuf>,
    result: ScanResult,
    reporter: ProgressReporter,
    start: Instant,
}

impl Walk {
    /// Submit a path if the filter accepts it and it was not seen before
    fn offer(
        &mut self,
        pool: &mut WorkerPool<PathBuf, PathResult>,
        path: PathBuf,
    ) -> Result<(), ScanError> {
        match self.filter.check(&path) {
            Ok(()) => {}
            Err(Rejection::Blacklisted) => {
                debug!("Skipping blacklisted {:?}", path);
                return Ok(());
            }
            Err(Rejection::OtherDevice(device)) => {
                debug!("Skipping {:?} on device {}", path, device);
                return Ok(());
            }
        }
        if !self.submitted.insert(path.clone()) {
            debug!("{:?} was already submitted", path);
            return Ok(());
        }
        pool.execute(path, process_directory)
    }

    /// Merge one directory's result and submit its children
    fn record(
        &mut self,
        pool: &mut WorkerPool<PathBuf, PathResult>,
        mut path_result: PathResult,
    ) -> Result<(), ScanError> {
        let subdirectories = std::mem::take(&mut path_result.subdirectories);
        let current = path_result.path.clone();
        self.record_size(path_result);

        for subdirectory in subdirectories {
            self.offer(pool, subdirectory)?;
        }

        if self.reporter.should_report() {
            let progress = ScanProgress {
                scanned_dirs: self.result.dir_count() as u64,
                pending_dirs: pool.busy_count() as u64,
                bytes: self.result.total_bytes(),
                elapsed_ms: self.start.elapsed().as_millis() as u64,
                ..ScanProgress::new()
            }
            .with_dir(current.to_string_lossy());
            self.reporter.report_progress(&progress);
        }
        Ok(())
    }

    /// Record size and side-channel data without submitting children
    fn record_size(&mut self, path_result: PathResult) {
        self.result.skipped_entries += path_result.skipped_entries;
        if let Some(err) = path_result.error {
            debug!("Counting unreadable {:?} as empty: {}", path_result.path, err);
            self.reporter.report_error(&err);
            self.result.errors.push(err);
        }
        if self
            .result
            .sizes
            .insert(path_result.path.clone(), path_result.file_bytes)
            .is_some()
        {
            warn!("{:?} was recorded twice", path_result.path);
        }
    }

    fn finish(self) -> (ScanResult, ProgressReporter) {
        (self.result, self.reporter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_bytes(path: &Path, n: usize) {
        fs::write(path, vec![0u8; n]).unwrap();
    }

    #[test]
    fn test_process_directory_sums_files_and_lists_dirs() {
        let dir = tempfile::tempdir().unwrap();
        write_bytes(&dir.path().join("a"), 100);
        write_bytes(&dir.path().join("b"), 250);
        fs::create_dir(dir.path().join("sub")).unwrap();
        write_bytes(&dir.path().join("sub").join("c"), 5000);

        let result = process_directory(dir.path().to_path_buf());
        assert_eq!(result.path, dir.path());
        assert_eq!(result.file_bytes, 350);
        assert_eq!(result.subdirectories, vec![dir.path().join("sub")]);
        assert_eq!(result.skipped_entries, 0);
        assert!(result.is_readable());
    }

    #[test]
    fn test_process_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("gone");

        let result = process_directory(missing.clone());
        assert_eq!(result.path, missing);
        assert_eq!(result.file_bytes, 0);
        assert!(result.subdirectories.is_empty());
        let err = result.error.expect("open failure is reported");
        assert_eq!(err.kind, crate::error::ScanErrorKind::NotFound);
        assert_eq!(err.path, Some(missing));
    }

    #[test]
    fn test_process_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let result = process_directory(dir.path().to_path_buf());
        assert_eq!(result.file_bytes, 0);
        assert!(result.subdirectories.is_empty());
        assert!(result.is_readable());
    }

    #[cfg(unix)]
    #[test]
    fn test_process_directory_does_not_follow_symlinks() {
        use std::os::unix::fs::symlink;

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("target");
        fs::create_dir(&target).unwrap();
        write_bytes(&target.join("big"), 10_000);
        write_bytes(&dir.path().join("small"), 10);

        let scanned = dir.path().join("scanned");
        fs::create_dir(&scanned).unwrap();
        symlink(&target, scanned.join("dir-link")).unwrap();
        symlink(dir.path().join("small"), scanned.join("file-link")).unwrap();
        write_bytes(&scanned.join("own"), 7);

        let result = process_directory(scanned);
        assert_eq!(result.file_bytes, 7);
        assert!(result.subdirectories.is_empty());
    }

    #[test]
    fn test_normalize_root() {
        assert_eq!(
            normalize_root(Path::new("/r/")).unwrap(),
            PathBuf::from("/r")
        );
        assert_eq!(
            normalize_root(Path::new("/r/./sub")).unwrap(),
            PathBuf::from("/r/sub")
        );
        assert_eq!(normalize_root(Path::new("/")).unwrap(), PathBuf::from("/"));

        let relative = normalize_root(Path::new("some/dir")).unwrap();
        assert!(relative.is_absolute());
        assert!(relative.ends_with("some/dir"));
    }

    #[test]
    fn test_normalize_blacklist() {
        let cwd = std::env::current_dir().unwrap();
        let blacklist: HashSet<PathBuf> = ["/proc", "node_modules", "./build/", "/srv/./cache"]
            .iter()
            .map(PathBuf::from)
            .collect();

        let normalized = normalize_blacklist(&blacklist);
        assert_eq!(normalized.len(), 4);
        assert!(normalized.contains(Path::new("/proc")));
        assert!(normalized.contains(&cwd.join("node_modules")));
        assert!(normalized.contains(&cwd.join("build")));
        assert!(normalized.contains(Path::new("/srv/cache")));
    }

    #[test]
    fn test_unreadable_directory_is_recorded_as_empty() {
        let mut walk = Walk {
            filter: PathFilter::new(HashSet::new(), crate::mounts::MountTable::new(), 0),
            submitted: HashSet::new(),
            result: ScanResult::new(PathBuf::from("/r")),
            reporter: ProgressReporter::new(false, 0),
            start: Instant::now(),
        };
        let locked = PathBuf::from("/r/locked");
        let err = ScanError::permission_denied(locked.clone());

        walk.record_size(PathResult::new(PathBuf::from("/r"), 100, Vec::new()).with_skipped(2));
        walk.record_size(PathResult::unreadable(locked.clone(), err));

        let (result, _) = walk.finish();
        assert_eq!(result.sizes.get(&locked), Some(&0));
        assert_eq!(result.total_bytes(), 100);
        assert_eq!(result.skipped_entries, 2);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind, crate::error::ScanErrorKind::PermissionDenied);
        assert_eq!(result.errors[0].path, Some(locked));
    }

    #[test]
    fn test_scan_rejects_zero_pool() {
        let dir = tempfile::tempdir().unwrap();
        let err = scan(dir.path(), 0).unwrap_err();
        assert_eq!(err.kind, crate::error::ScanErrorKind::InvalidConfig);
    }
}
