//! Mtime-based freshness detection for bibliography inputs.
//!
//! Content-hashing every bibliography file on every keystroke is too
//! expensive; the modification time is the staleness proxy. A file that
//! cannot be stat'ed yields `None`, which is itself a distinct stamp, so a
//! file appearing or vanishing also changes the key.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Get the modification time of a file
///
/// Returns `None` if the file doesn't exist or mtime cannot be read
pub fn get_mtime(path: &Path) -> Option<SystemTime> {
    path.metadata().and_then(|m| m.modified()).ok()
}

/// A file path paired with its modification time at observation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileStamp {
    pub path: PathBuf,
    pub mtime: Option<SystemTime>,
}

impl FileStamp {
    /// Stat `path` now.
    pub fn observe(path: PathBuf) -> Self {
        let mtime = get_mtime(&path);
        Self { path, mtime }
    }

    /// Mtime as nanoseconds since the epoch, for stable text encoding.
    pub fn nanos(&self) -> Option<u128> {
        self.mtime
            .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
            .map(|d| d.as_nanos())
    }
}
