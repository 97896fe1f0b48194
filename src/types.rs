//! Core domain types for s3push

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::SystemTime;

/// Where a [`FileRecord`] can be read from or written to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordLocation {
    /// Absolute path on the local filesystem
    Local(PathBuf),
    /// Full object key in the bucket
    Remote(String),
}

/// A file on either side of the sync, keyed by its relative name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Path relative to the sync root (or key relative to the prefix), `/`-separated
    pub name: String,

    /// Location needed to actually read or write the file
    pub location: RecordLocation,

    /// Size in bytes
    pub size: u64,

    /// Last modification time
    pub modified: SystemTime,
}

impl FileRecord {
    /// Create a record for a local file
    pub fn local(name: impl Into<String>, path: PathBuf, size: u64, modified: SystemTime) -> Self {
        Self {
            name: name.into(),
            location: RecordLocation::Local(path),
            size,
            modified,
        }
    }

    /// Create a record for a remote object
    pub fn remote(
        name: impl Into<String>,
        key: impl Into<String>,
        size: u64,
        modified: SystemTime,
    ) -> Self {
        Self {
            name: name.into(),
            location: RecordLocation::Remote(key.into()),
            size,
            modified,
        }
    }

    /// Local path, if this record describes a local file
    pub fn local_path(&self) -> Option<&PathBuf> {
        match &self.location {
            RecordLocation::Local(path) => Some(path),
            RecordLocation::Remote(_) => None,
        }
    }
}

/// Statistics for a sync operation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncStats {
    /// Local files found under the sync root
    pub files_scanned: u64,

    /// Remote objects seen before the listing ended
    pub remote_listed: u64,

    /// Local files that had a remote counterpart
    pub files_matched: u64,

    /// Files selected for upload
    pub files_planned: u64,

    /// Bytes selected for upload
    pub bytes_planned: u64,

    /// Files uploaded successfully
    pub files_uploaded: u64,

    /// Bytes uploaded successfully
    pub bytes_transferred: u64,

    /// Files whose upload failed
    pub upload_failures: u64,

    /// Names of the files whose upload failed
    pub failed_files: Vec<String>,

    /// Remote listing stopped early because of an error
    pub remote_truncated: bool,

    /// Duration in seconds
    pub duration_secs: f64,
}

impl SyncStats {
    /// Files already in sync (matched and not re-uploaded)
    pub fn files_skipped(&self) -> u64 {
        self.files_scanned.saturating_sub(self.files_planned)
    }

    /// Calculate transfer rate in bytes per second
    pub fn transfer_rate(&self) -> f64 {
        if self.duration_secs == 0.0 {
            0.0
        } else {
            self.bytes_transferred as f64 / self.duration_secs
        }
    }

    /// Whether every planned upload went through
    pub fn is_complete(&self) -> bool {
        self.upload_failures == 0 && !self.remote_truncated
    }
}
