//! Diff computation between the local tree and the remote listing
//!
//! Two phases:
//! 1. [`LocalIndex::collect`] drains the whole local enumeration into a map.
//!    Any local error aborts the sync.
//! 2. [`LocalIndex::diff_into`] streams the remote listing against that map,
//!    emitting local records that need uploading as soon as they are known,
//!    then emits every local record the listing never mentioned.
//!
//! Remote-only objects never produce a decision; nothing is ever deleted.

use super::scan::RecordReceiver;
use crate::error::{Error, Result};
use crate::types::FileRecord;
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Capacity of the upload decision channel
pub const DECISION_CHANNEL_CAPACITY: usize = 8;

/// Counters produced by the streaming phase
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiffStats {
    /// Remote records consumed
    pub remote_seen: u64,
    /// Remote records with a local counterpart
    pub matched: u64,
    /// Matched files emitted because they changed
    pub changed: u64,
    /// Local files emitted because the listing never mentioned them
    pub new_files: u64,
    /// Remote records without a local counterpart
    pub remote_only: u64,
    /// Bytes emitted for upload
    pub bytes_planned: u64,
    /// Listing stopped early on an error
    pub truncated: bool,
    /// Diff stopped because the sync was cancelled
    pub cancelled: bool,
}

impl DiffStats {
    /// Total number of upload decisions emitted
    pub fn planned(&self) -> u64 {
        self.changed + self.new_files
    }
}

/// Whether `local` must be uploaded over `remote`
///
/// Size mismatch always uploads; otherwise only a strictly newer local
/// modification time does.
pub fn needs_upload(local: &FileRecord, remote: &FileRecord) -> bool {
    local.size != remote.size || local.modified > remote.modified
}

/// Local inventory keyed by relative name
#[derive(Debug, Default)]
pub struct LocalIndex {
    files: HashMap<String, FileRecord>,
}

impl LocalIndex {
    /// Drain the local enumeration
    ///
    /// Returns the first error the enumeration reports; partial inventories
    /// are never diffed.
    pub async fn collect(rx: &mut RecordReceiver, cancel: &CancellationToken) -> Result<Self> {
        let mut files = HashMap::new();

        loop {
            let item = tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                item = rx.recv() => item,
            };

            match item {
                Some(Ok(record)) => {
                    if let Some(previous) = files.insert(record.name.clone(), record) {
                        tracing::debug!(
                            name = %previous.name,
                            "Duplicate local name, keeping the later entry"
                        );
                    }
                }
                Some(Err(e)) => return Err(e),
                None => break,
            }
        }

        Ok(Self { files })
    }

    /// Build an index from records already in memory
    pub fn from_records(records: impl IntoIterator<Item = FileRecord>) -> Self {
        Self {
            files: records.into_iter().map(|r| (r.name.clone(), r)).collect(),
        }
    }

    /// Number of local files
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the local side is empty
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Total size of all local files
    pub fn total_bytes(&self) -> u64 {
        self.files.values().map(|r| r.size).sum()
    }

    /// Run the streaming phase on its own task
    pub fn spawn_diff(
        self,
        remote: RecordReceiver,
        capacity: usize,
        cancel: CancellationToken,
    ) -> (mpsc::Receiver<FileRecord>, JoinHandle<DiffStats>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(async move { self.diff_into(remote, tx, cancel).await });
        (rx, handle)
    }

    /// Stream `remote` against the index, sending upload decisions into `tx`
    pub async fn diff_into(
        mut self,
        mut remote: RecordReceiver,
        tx: mpsc::Sender<FileRecord>,
        cancel: CancellationToken,
    ) -> DiffStats {
        let mut stats = DiffStats::default();

        loop {
            let item = tokio::select! {
                _ = cancel.cancelled() => {
                    stats.cancelled = true;
                    return stats;
                }
                item = remote.recv() => item,
            };

            let remote_record = match item {
                Some(Ok(record)) => record,
                Some(Err(e)) => {
                    tracing::warn!(
                        error = %e,
                        seen = stats.remote_seen,
                        unmatched = self.files.len(),
                        "Remote listing truncated; unmatched local files will be uploaded"
                    );
                    stats.truncated = true;
                    break;
                }
                None => break,
            };
            stats.remote_seen += 1;

            let Some(local) = self.files.remove(&remote_record.name) else {
                stats.remote_only += 1;
                continue;
            };
            stats.matched += 1;

            if needs_upload(&local, &remote_record) {
                tracing::debug!(
                    name = %local.name,
                    local_size = local.size,
                    remote_size = remote_record.size,
                    "Changed"
                );
                stats.changed += 1;
                stats.bytes_planned += local.size;
                if tx.send(local).await.is_err() {
                    return stats;
                }
            }
        }
        // stop the listing task if it is still paging
        drop(remote);

        let mut remaining: Vec<FileRecord> = self.files.into_values().collect();
        remaining.sort_by(|a, b| a.name.cmp(&b.name));

        for local in remaining {
            if cancel.is_cancelled() {
                stats.cancelled = true;
                break;
            }
            tracing::debug!(name = %local.name, size = local.size, "New");
            stats.new_files += 1;
            stats.bytes_planned += local.size;
            if tx.send(local).await.is_err() {
                break;
            }
        }

        stats
    }
}
