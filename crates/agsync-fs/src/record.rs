//! Transient size+mtime snapshots used as a cheap change oracle

use std::path::Path;
use std::time::UNIX_EPOCH;

use crate::{Error, NormalizedPath, Result};

/// Size and modification time of one file at one moment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Path relative to the root it was read from
    pub path: NormalizedPath,
    /// Size in bytes
    pub size: u64,
    /// Modification time in milliseconds since the Unix epoch
    pub mtime_ms: i64,
}

impl FileRecord {
    /// Stat `full`, recording it under the relative `path`.
    ///
    /// Returns `Ok(None)` when the file does not exist.
    pub fn read(path: NormalizedPath, full: &Path) -> Result<Option<Self>> {
        let meta = match full.metadata() {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::io(full, e)),
        };
        if !meta.is_file() {
            return Ok(None);
        }
        let mtime_ms = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        Ok(Some(Self {
            path,
            size: meta.len(),
            mtime_ms,
        }))
    }

    /// Identical size and identical mtime at millisecond resolution.
    pub fn same_stamp(&self, other: &Self) -> bool {
        self.size == other.size && self.mtime_ms == other.mtime_ms
    }

    /// Identical size and mtimes within `tolerance_ms` of each other.
    pub fn near_stamp(&self, other: &Self, tolerance_ms: i64) -> bool {
        self.size == other.size && (self.mtime_ms - other.mtime_ms).abs() <= tolerance_ms
    }

    /// `self` is newer than `other` by strictly more than `tolerance_ms`.
    pub fn newer_than(&self, other: &Self, tolerance_ms: i64) -> bool {
        self.mtime_ms - other.mtime_ms > tolerance_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(size: u64, mtime_ms: i64) -> FileRecord {
        FileRecord {
            path: NormalizedPath::new("a"),
            size,
            mtime_ms,
        }
    }

    #[test]
    fn tolerance_comparisons() {
        let a = rec(10, 10_000);
        assert!(a.near_stamp(&rec(10, 10_900), 1000));
        assert!(!a.near_stamp(&rec(11, 10_000), 1000));
        assert!(rec(10, 12_001).newer_than(&a, 1000));
        assert!(!rec(10, 11_000).newer_than(&a, 1000));
    }

    #[test]
    fn missing_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let r = FileRecord::read(NormalizedPath::new("x"), &dir.path().join("x")).unwrap();
        assert!(r.is_none());
    }
}
