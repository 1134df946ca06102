//! Mount table used to keep a scan on the root's device
//!
//! The table maps every mount point to the device id it resolves to. It is
//! read once before a scan starts and never changes afterwards.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::Metadata;
use std::path::{Path, PathBuf};

use crate::error::ScanError;

/// Mount table sources, tried in order
pub const MOUNT_SOURCES: [&str; 2] = ["/proc/mounts", "/etc/mtab"];

/// Device id of a filesystem entry
#[cfg(unix)]
pub fn device_id(metadata: &Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    metadata.dev()
}

/// Device id of a filesystem entry
#[cfg(not(unix))]
pub fn device_id(_metadata: &Metadata) -> u64 {
    0
}

/// Mount point to device id mapping
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountTable {
    mounts: BTreeMap<PathBuf, u64>,
}

impl MountTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the system mount table
    ///
    /// An unreadable table is not fatal: the scan then runs without a
    /// mount boundary.
    pub fn load() -> Self {
        for source in MOUNT_SOURCES {
            match Self::from_file(Path::new(source)) {
                Ok(table) => {
                    debug!("Loaded {} mounts from {}", table.len(), source);
                    return table;
                }
                Err(e) => debug!("Cannot read mount table {}: {}", source, e),
            }
        }
        warn!("No mount table available; scan will not stop at mount boundaries");
        Self::default()
    }

    /// Read a mount table in fstab format and stat every mount point
    pub fn from_file(path: &Path) -> Result<Self, ScanError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ScanError::from(e).with_path(path.into()))?;
        Ok(Self::resolve(parse_mount_points(&contents)))
    }

    /// Stat each mount point; points that cannot be stat'd are left out
    pub fn resolve(points: impl IntoIterator<Item = PathBuf>) -> Self {
        let mut table = Self::new();
        for point in points {
            match std::fs::symlink_metadata(&point) {
                Ok(metadata) => table.insert(point, device_id(&metadata)),
                Err(e) => debug!("Skipping mount point {:?}: {}", point, e),
            }
        }
        table
    }

    /// Record a mount point
    pub fn insert(&mut self, mount_point: impl Into<PathBuf>, device: u64) {
        self.mounts.insert(mount_point.into(), device);
    }

    /// Device of the nearest mount point enclosing `path`
    ///
    /// Prefixes are matched by path component, so `/mnt/data` does not
    /// enclose `/mnt/data2`.
    pub fn lookup(&self, path: &Path) -> Option<u64> {
        path.ancestors()
            .find_map(|ancestor| self.mounts.get(ancestor).copied())
    }

    /// Number of mount points
    pub fn len(&self) -> usize {
        self.mounts.len()
    }

    /// Check if the table has no mount points
    pub fn is_empty(&self) -> bool {
        self.mounts.is_empty()
    }
}

impl<P: Into<PathBuf>> FromIterator<(P, u64)> for MountTable {
    fn from_iter<I: IntoIterator<Item = (P, u64)>>(iter: I) -> Self {
        let mut table = Self::new();
        for (point, device) in iter {
            table.insert(point, device);
        }
        table
    }
}

/// Extract mount points (second field) from fstab-formatted text
pub fn parse_mount_points(contents: &str) -> Vec<PathBuf> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_whitespace().nth(1))
        .map(|field| PathBuf::from(unescape_octal(field)))
        .collect()
}

/// Undo the `\NNN` octal escaping used for spaces and tabs in mount fields
fn unescape_octal(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() && is_octal_triplet(&bytes[i + 1..i + 4]) {
            let value = (bytes[i + 1] - b'0') * 64 + (bytes[i + 2] - b'0') * 8 + (bytes[i + 3] - b'0');
            out.push(value);
            i += 4;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn is_octal_triplet(digits: &[u8]) -> bool {
    digits.len() == 3
        && digits[0] <= b'3'
        && digits.iter().all(|d| (b'0'..=b'7').contains(d))
}
