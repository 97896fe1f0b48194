//! Local file enumeration
//!
//! Walks a file or directory on a blocking thread (jwalk, parallel readdir)
//! and streams one [`FileRecord`] per regular file into a bounded channel.
//! Failures are sent as `Err` items; the consumer decides whether they are
//! fatal.

use crate::error::{Error, Result};
use crate::types::FileRecord;
use std::path::{Component, Path, PathBuf};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Receiving end of an enumeration
pub type RecordReceiver = mpsc::Receiver<Result<FileRecord>>;

/// Default channel capacity for local records
pub const LOCAL_CHANNEL_CAPACITY: usize = 1024;

/// Start enumerating `root` and return the record stream
pub fn scan_local(root: PathBuf, capacity: usize, cancel: CancellationToken) -> RecordReceiver {
    let (tx, rx) = mpsc::channel(capacity.max(1));

    tokio::task::spawn_blocking(move || {
        walk(&root, &tx, &cancel);
        tracing::debug!(root = %root.display(), "Local scan finished");
    });

    rx
}

/// Walk `root`, sending into `tx` until done, cancelled, or the receiver goes away
fn walk(root: &Path, tx: &mpsc::Sender<Result<FileRecord>>, cancel: &CancellationToken) {
    let metadata = match std::fs::metadata(root) {
        Ok(m) => m,
        Err(e) => {
            let _ = tx.blocking_send(Err(Error::from_path(root, e)));
            return;
        }
    };

    let root = std::path::absolute(root).unwrap_or_else(|_| root.to_path_buf());

    if !metadata.is_dir() {
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let _ = tx.blocking_send(file_record(name, root.clone(), &metadata));
        return;
    }

    for entry in jwalk::WalkDir::new(&root)
        .skip_hidden(false)
        .follow_links(false)
        .sort(true)
        .parallelism(jwalk::Parallelism::RayonNewPool(num_cpus::get()))
    {
        if cancel.is_cancelled() {
            tracing::debug!("Local scan cancelled");
            return;
        }

        let item = match entry {
            Ok(e) => {
                let file_type = e.file_type();
                if file_type.is_dir() {
                    continue;
                }

                let path = e.path();
                let metadata = if file_type.is_symlink() {
                    match std::fs::metadata(&path) {
                        Ok(m) if m.is_file() => m,
                        Ok(_) => {
                            tracing::warn!(path = %path.display(), "Skipping symlink to directory");
                            continue;
                        }
                        Err(err) => {
                            tracing::warn!(
                                path = %path.display(),
                                error = %err,
                                "Skipping dangling symlink"
                            );
                            continue;
                        }
                    }
                } else {
                    match e.metadata() {
                        Ok(m) => m,
                        Err(err) => {
                            let _ = tx.blocking_send(Err(Error::Scan {
                                path,
                                message: err.to_string(),
                            }));
                            continue;
                        }
                    }
                };

                if !metadata.is_file() {
                    // sockets, fifos, devices
                    continue;
                }

                file_record(relative_name(&root, &path), path, &metadata)
            }
            Err(err) => Err(Error::Scan {
                path: err.path().map(Path::to_path_buf).unwrap_or_else(|| root.clone()),
                message: err.to_string(),
            }),
        };

        if tx.blocking_send(item).is_err() {
            // consumer is gone, nobody to report to
            return;
        }
    }
}

fn file_record(name: String, path: PathBuf, metadata: &std::fs::Metadata) -> Result<FileRecord> {
    let modified = metadata
        .modified()
        .map_err(|e| Error::from_path(&path, e))?;
    Ok(FileRecord::local(name, path, metadata.len(), modified))
}

/// `/`-separated path of `path` relative to `root`
pub fn relative_name(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
