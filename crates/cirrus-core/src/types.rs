use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::UNIX_EPOCH;

/// Kind of entry occupying a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    File,
    Directory,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::File => write!(f, "file"),
            EntryKind::Directory => write!(f, "directory"),
        }
    }
}

/// Cheap change-detection summary for one entry: mtime + size.
///
/// Two enumerations of the same path compare fingerprints to decide whether
/// the entry changed without reading its contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Modification time as Unix seconds (0 if the backend reports none)
    pub mtime_secs: u64,
    /// Entry size in bytes (0 for directories)
    pub size: u64,
}

impl Fingerprint {
    pub fn new(mtime_secs: u64, size: u64) -> Self {
        Self { mtime_secs, size }
    }

    /// Fingerprint from local filesystem metadata.
    pub fn from_metadata(meta: &std::fs::Metadata) -> Self {
        let mtime_secs = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let size = if meta.is_dir() { 0 } else { meta.len() };
        Self { mtime_secs, size }
    }
}
