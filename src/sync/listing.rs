//! Remote object enumeration
//!
//! Pages through the store's listing on its own task so the diff can start
//! consuming while later pages are still in flight.

use super::scan::RecordReceiver;
use super::SyncTarget;
use crate::retry::{with_retry, RetryConfig};
use crate::types::FileRecord;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Start listing `target` and return the record stream
///
/// A listing failure is delivered as a single `Err` item, after which the
/// stream ends. Records sent before the failure stay valid.
pub fn list_remote(
    target: SyncTarget,
    capacity: usize,
    retry: RetryConfig,
    cancel: CancellationToken,
) -> RecordReceiver {
    let (tx, rx) = mpsc::channel(capacity.max(1));

    tokio::spawn(async move {
        let list_prefix = target.list_prefix();
        let mut continuation: Option<String> = None;
        let mut pages = 0u64;
        let mut listed = 0u64;

        loop {
            let request = with_retry(&retry, || {
                target
                    .store
                    .list_objects(&target.bucket, &list_prefix, continuation.clone())
            });

            let page = tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("Remote listing cancelled");
                    return;
                }
                page = request => page,
            };

            let page = match page {
                Ok(page) => page,
                Err(e) => {
                    tracing::warn!(
                        bucket = %target.bucket,
                        prefix = %list_prefix,
                        pages,
                        listed,
                        error = %e,
                        "Remote listing failed"
                    );
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            };
            pages += 1;

            for entry in page.entries {
                let name = target.relative_name(&entry.key);
                let record = FileRecord::remote(name, entry.key, entry.size, entry.last_modified);
                if tx.send(Ok(record)).await.is_err() {
                    return;
                }
                listed += 1;
            }

            match page.next_continuation {
                Some(token) if !token.is_empty() => continuation = Some(token),
                _ => break,
            }
        }

        tracing::debug!(pages, listed, "Remote listing finished");
    });

    rx
}

