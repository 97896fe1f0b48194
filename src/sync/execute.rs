//! Upload execution
//!
//! Every decision becomes one task in a [`JoinSet`]; a semaphore permit is
//! taken before the task is spawned and released when it ends, so at most
//! `jobs` uploads are in flight. Failures are counted per file and never
//! stop the rest of the batch.

use super::sniff::{detect_content_type, read_head, DEFAULT_CONTENT_TYPE};
use super::SyncTarget;
use crate::error::{Error, Result};
use crate::progress::ProgressTracker;
use crate::retry::{with_retry, RetryConfig};
use crate::types::FileRecord;
use std::collections::HashMap;
use std::io::SeekFrom;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::AsyncSeekExt;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{Id, JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

/// Outcome of a batch of uploads
#[derive(Debug, Clone, Default)]
pub struct UploadReport {
    /// Uploads that completed
    pub uploaded: u64,
    /// Uploads that failed after retries
    pub failed: u64,
    /// Bytes sent by completed uploads
    pub bytes_uploaded: u64,
    /// Names of the failed files
    pub failed_files: Vec<String>,
    /// Highest number of uploads observed running at once
    pub peak_in_flight: usize,
    /// Dispatch stopped early because the sync was cancelled
    pub cancelled: bool,
}

impl UploadReport {
    /// Uploads that were started
    pub fn started(&self) -> u64 {
        self.uploaded + self.failed
    }
}

/// Bounded pool of upload tasks
pub struct UploadPool {
    target: SyncTarget,
    jobs: usize,
    retry: RetryConfig,
    progress: ProgressTracker,
}

impl UploadPool {
    /// Create a pool running at most `jobs` uploads at once
    pub fn new(
        target: SyncTarget,
        jobs: usize,
        retry: RetryConfig,
        progress: ProgressTracker,
    ) -> Self {
        Self {
            target,
            jobs: jobs.max(1),
            retry,
            progress,
        }
    }

    /// Upload every decision from `decisions`, returning once all started uploads finished
    ///
    /// On cancellation no further decisions are taken; uploads already
    /// running are allowed to complete and are joined before returning.
    pub async fn run(
        &self,
        mut decisions: mpsc::Receiver<FileRecord>,
        cancel: &CancellationToken,
    ) -> UploadReport {
        let semaphore = Arc::new(Semaphore::new(self.jobs));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut tasks: JoinSet<Result<u64>> = JoinSet::new();
        let mut names: HashMap<Id, String> = HashMap::new();
        let mut report = UploadReport::default();

        loop {
            let record = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    report.cancelled = true;
                    break;
                }
                next = decisions.recv() => match next {
                    Some(record) => record,
                    None => break,
                },
            };

            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    report.cancelled = true;
                    break;
                }
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    // never closed while the pool is running
                    Err(_) => break,
                },
            };

            while let Some(done) = tasks.try_join_next_with_id() {
                self.reap(&mut report, &mut names, done);
            }

            self.progress.add_planned(record.size);

            let target = self.target.clone();
            let retry = self.retry.clone();
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            let name = record.name.clone();

            let handle = tasks.spawn(async move {
                let _permit = permit;
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);

                tracing::debug!(name = %record.name, size = record.size, "Uploading");
                let result = with_retry(&retry, || upload_record(&target, &record)).await;

                in_flight.fetch_sub(1, Ordering::SeqCst);
                result
            });
            names.insert(handle.id(), name);
        }

        if report.cancelled {
            tracing::warn!(in_flight = tasks.len(), "Cancelled; waiting for running uploads");
        }

        while let Some(done) = tasks.join_next_with_id().await {
            self.reap(&mut report, &mut names, done);
        }

        report.peak_in_flight = peak.load(Ordering::SeqCst);
        report
    }

    fn reap(
        &self,
        report: &mut UploadReport,
        names: &mut HashMap<Id, String>,
        done: std::result::Result<(Id, Result<u64>), JoinError>,
    ) {
        let (id, result) = match done {
            Ok((id, result)) => (id, result.map_err(|e| e.to_string())),
            Err(e) => (e.id(), Err(format!("upload task aborted: {}", e))),
        };
        let name = names.remove(&id).unwrap_or_default();

        match result {
            Ok(bytes) => {
                report.uploaded += 1;
                report.bytes_uploaded += bytes;
                self.progress.finish_file(bytes);
            }
            Err(message) => {
                tracing::error!(name = %name, error = %message, "Upload failed");
                report.failed += 1;
                report.failed_files.push(name);
                self.progress.fail_file();
            }
        }
    }
}

/// Upload one local file to `target`, returning the bytes sent
pub async fn upload_record(target: &SyncTarget, record: &FileRecord) -> Result<u64> {
    let path = record
        .local_path()
        .ok_or_else(|| Error::storage(format!("{} is not a local file", record.name)))?;

    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| Error::from_path(path, e))?;
    let len = file
        .metadata()
        .await
        .map_err(|e| Error::from_path(path, e))?
        .len();

    let content_type = if len == 0 {
        DEFAULT_CONTENT_TYPE
    } else {
        let head = read_head(&mut file)
            .await
            .map_err(|e| Error::io(format!("reading {}", path.display()), e))?;
        file.seek(SeekFrom::Start(0))
            .await
            .map_err(|e| Error::io(format!("rewinding {}", path.display()), e))?;
        detect_content_type(&head)
    };

    let key = target.object_key(&record.name);
    target
        .store
        .put_object(&target.bucket, &key, file, len, content_type)
        .await?;

    tracing::info!(key = %key, size = len, content_type, "Uploaded");
    Ok(len)
}
