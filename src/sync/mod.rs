//! Sync engine and orchestration
//!
//! ```text
//! scan_local ──► LocalIndex::collect ─┐
//!                                     ├─► diff ──► UploadPool
//! list_remote ────────────────────────┘
//! ```

pub mod diff;
pub mod execute;
pub mod listing;
pub mod scan;
pub mod sniff;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::progress::ProgressTracker;
use crate::retry::RetryConfig;
use crate::storage::{ObjectStore, S3Backend};
use crate::types::SyncStats;
use crate::uri::parse_s3_target;
use diff::{LocalIndex, DECISION_CHANNEL_CAPACITY};
use execute::UploadPool;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Resolved upload destination: store, bucket and normalized key prefix
#[derive(Clone)]
pub struct SyncTarget {
    /// Store client
    pub store: Arc<dyn ObjectStore>,
    /// Bucket name
    pub bucket: String,
    /// Key prefix without leading or trailing `/`
    pub prefix: String,
}

impl SyncTarget {
    /// Create a target, normalizing `prefix`
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>, prefix: &str) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            prefix: prefix.trim_matches('/').to_string(),
        }
    }

    /// Prefix passed to listing calls; ends with `/` unless empty
    pub fn list_prefix(&self) -> String {
        if self.prefix.is_empty() {
            String::new()
        } else {
            format!("{}/", self.prefix)
        }
    }

    /// Full object key for a relative name
    pub fn object_key(&self, name: &str) -> String {
        join_key(&self.prefix, name)
    }

    /// Relative name for a full object key
    pub fn relative_name(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            return key.to_string();
        }
        key.strip_prefix(&self.list_prefix())
            .unwrap_or(key)
            .to_string()
    }
}

impl std::fmt::Debug for SyncTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncTarget")
            .field("store", &self.store.name())
            .field("bucket", &self.bucket)
            .field("prefix", &self.prefix)
            .finish()
    }
}

/// Join key segments with `/`, dropping empty parts and stray separators
pub fn join_key(prefix: &str, name: &str) -> String {
    let prefix = prefix.trim_matches('/');
    let name = name.trim_start_matches('/');
    match (prefix.is_empty(), name.is_empty()) {
        (true, _) => name.to_string(),
        (false, true) => prefix.to_string(),
        (false, false) => format!("{}/{}", prefix, name),
    }
}

/// The main sync engine
pub struct SyncEngine {
    /// Configuration
    config: Config,
    /// Destination
    target: SyncTarget,
    /// Progress tracker
    progress: ProgressTracker,
}

impl SyncEngine {
    /// Create a new sync engine
    pub fn new(config: Config, target: SyncTarget) -> Self {
        let progress = ProgressTracker::new(config.progress);
        Self {
            config,
            target,
            progress,
        }
    }

    /// Destination of this engine
    pub fn target(&self) -> &SyncTarget {
        &self.target
    }

    /// Upload every new or changed file under `local_root`
    ///
    /// Local enumeration failures abort the run. Remote listing failures and
    /// per-file upload failures do not; they are reported in the returned
    /// [`SyncStats`].
    pub async fn sync(&self, local_root: &Path, cancel: &CancellationToken) -> Result<SyncStats> {
        let start = std::time::Instant::now();
        let mut stats = SyncStats::default();
        let run = cancel.child_token();
        let retry = RetryConfig::from(&self.config);

        tracing::info!(
            source = %local_root.display(),
            bucket = %self.target.bucket,
            prefix = %self.target.prefix,
            store = self.target.store.name(),
            "Starting sync"
        );

        // Both sides start producing before anything is compared
        let mut local_rx = scan::scan_local(
            local_root.to_path_buf(),
            scan::LOCAL_CHANNEL_CAPACITY,
            run.clone(),
        );
        let remote_rx = listing::list_remote(
            self.target.clone(),
            self.config.remote_buffer,
            retry.clone(),
            run.clone(),
        );

        let index = match LocalIndex::collect(&mut local_rx, &run).await {
            Ok(index) => index,
            Err(e) => {
                run.cancel();
                tracing::error!(error = %e, "Local scan failed, aborting sync");
                return Err(e);
            }
        };
        drop(local_rx);

        stats.files_scanned = index.len() as u64;
        tracing::info!(
            files = index.len(),
            bytes = index.total_bytes(),
            "Local scan complete"
        );

        let (mut decisions, diff_handle) =
            index.spawn_diff(remote_rx, DECISION_CHANNEL_CAPACITY, run.clone());

        if self.config.dry_run {
            loop {
                let next = tokio::select! {
                    _ = run.cancelled() => break,
                    next = decisions.recv() => next,
                };
                let Some(record) = next else { break };
                tracing::info!(name = %record.name, size = record.size, "Would upload");
            }
            // unblocks the differ if it is parked on a full channel
            drop(decisions);
        } else {
            let pool = UploadPool::new(
                self.target.clone(),
                self.config.effective_jobs(),
                retry,
                self.progress.clone(),
            );
            let report = pool.run(decisions, &run).await;

            stats.files_uploaded = report.uploaded;
            stats.bytes_transferred = report.bytes_uploaded;
            stats.upload_failures = report.failed;
            stats.failed_files = report.failed_files;
            self.progress.finish();
        }

        let diff = diff_handle
            .await
            .map_err(|e| Error::storage(format!("diff task failed: {}", e)))?;
        run.cancel();

        stats.remote_listed = diff.remote_seen;
        stats.files_matched = diff.matched;
        stats.files_planned = diff.planned();
        stats.bytes_planned = diff.bytes_planned;
        stats.remote_truncated = diff.truncated;
        stats.duration_secs = start.elapsed().as_secs_f64();

        if cancel.is_cancelled() {
            tracing::warn!(uploaded = stats.files_uploaded, "Sync cancelled");
            return Err(Error::Cancelled);
        }

        if stats.upload_failures > 0 {
            tracing::warn!(
                failures = stats.upload_failures,
                uploaded = stats.files_uploaded,
                "Sync finished with failed uploads"
            );
        }

        tracing::info!(
            scanned = stats.files_scanned,
            remote = stats.remote_listed,
            planned = stats.files_planned,
            uploaded = stats.files_uploaded,
            failed = stats.upload_failures,
            truncated = stats.remote_truncated,
            duration_secs = stats.duration_secs,
            "Sync complete"
        );

        Ok(stats)
    }
}

/// Build the S3 target for `config`, placing uploads under `key_prefix`
///
/// The path component of `s3_url`, if any, is prepended to `key_prefix`.
pub async fn connect(config: &Config, key_prefix: &str) -> Result<SyncTarget> {
    let (bucket, base_prefix) = parse_s3_target(&config.s3_url)?;
    ensure_credentials()?;

    let backend = S3Backend::new(config.region.clone(), config.s3_endpoint.clone())
        .await
        .with_multipart(config.multipart_threshold, config.effective_part_size());

    Ok(SyncTarget::new(
        Arc::new(backend),
        bucket,
        &join_key(&base_prefix, key_prefix),
    ))
}

/// Sync the configured uploads directory (or `source`) to `bucket_prefix`
pub async fn sync_uploads(
    config: &Config,
    source: Option<&Path>,
    cancel: &CancellationToken,
) -> Result<SyncStats> {
    config.validate()?;
    let target = connect(config, &config.bucket_prefix).await?;
    let root = source
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config.uploads_location.clone());

    SyncEngine::new(config.clone(), target)
        .sync(&root, cancel)
        .await
}

/// Sync a database dump file to `<backup_prefix>/<backup_name>`
pub async fn sync_database_backup(
    config: &Config,
    dump: &Path,
    backup_name: &str,
    cancel: &CancellationToken,
) -> Result<SyncStats> {
    config.validate()?;
    let prefix = backup_prefix(config, backup_name)?;
    let target = connect(config, &prefix).await?;

    SyncEngine::new(config.clone(), target)
        .sync(dump, cancel)
        .await
}

/// Key prefix for a named database backup
pub fn backup_prefix(config: &Config, backup_name: &str) -> Result<String> {
    let name = backup_name.trim().trim_matches('/');
    if name.is_empty() {
        return Err(Error::config("backup name cannot be blank"));
    }
    Ok(join_key(&config.backup_prefix, name))
}

/// Timestamped backup name, `YYYY-MM-DD_HH-MM-SS`
pub fn backup_name<Tz: chrono::TimeZone>(now: &chrono::DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    now.format("%Y-%m-%d_%H-%M-%S").to_string()
}

/// Fail unless some AWS credential source is configured locally
pub fn ensure_credentials() -> Result<()> {
    let home = dirs::home_dir();
    if credentials_available(|key| std::env::var(key).ok(), home.as_deref()) {
        Ok(())
    } else {
        Err(Error::MissingCredentials {
            message: "set AWS_ACCESS_KEY_ID or create ~/.aws/credentials".to_string(),
        })
    }
}

/// Whether environment or shared files provide credentials
///
/// Instance metadata is not probed.
pub fn credentials_available<F>(env: F, home: Option<&Path>) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    let set = |key: &str| env(key).is_some_and(|v| !v.is_empty());

    if set("AWS_ACCESS_KEY_ID")
        || set("AWS_WEB_IDENTITY_TOKEN_FILE")
        || set("AWS_CONTAINER_CREDENTIALS_RELATIVE_URI")
        || set("AWS_CONTAINER_CREDENTIALS_FULL_URI")
    {
        return true;
    }

    let aws_dir = home.map(|h| h.join(".aws"));
    let credentials = env("AWS_SHARED_CREDENTIALS_FILE")
        .map(PathBuf::from)
        .or_else(|| aws_dir.as_ref().map(|d| d.join("credentials")));
    let config = env("AWS_CONFIG_FILE")
        .map(PathBuf::from)
        .or_else(|| aws_dir.as_ref().map(|d| d.join("config")));

    credentials.is_some_and(|p| p.is_file()) || config.is_some_and(|p| p.is_file())
}
