//! Progress tracking and display for s3push

use crate::types::SyncStats;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Progress tracker for uploads
///
/// Cheap to clone; all clones drive the same bars.
#[derive(Clone)]
pub struct ProgressTracker {
    /// Multi-progress container
    multi: MultiProgress,
    /// Files finished vs. files planned so far
    overall: ProgressBar,
    /// Stats line
    stats: ProgressBar,
    /// Bytes planned so far
    bytes_planned: Arc<AtomicU64>,
    /// Bytes uploaded so far
    bytes_done: Arc<AtomicU64>,
    /// Failed uploads so far
    failures: Arc<AtomicU64>,
    /// Whether progress is enabled
    enabled: bool,
}

impl ProgressTracker {
    /// Create a new progress tracker
    pub fn new(enabled: bool) -> Self {
        let multi = MultiProgress::new();

        let overall = if enabled {
            let pb = multi.add(ProgressBar::new(0));
            pb.set_style(
                ProgressStyle::default_bar()
                    .template(
                        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files",
                    )
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("=>-"),
            );
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        } else {
            ProgressBar::hidden()
        };

        let stats = if enabled {
            let pb = multi.add(ProgressBar::new_spinner());
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("  {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            pb
        } else {
            ProgressBar::hidden()
        };

        Self {
            multi,
            overall,
            stats,
            bytes_planned: Arc::new(AtomicU64::new(0)),
            bytes_done: Arc::new(AtomicU64::new(0)),
            failures: Arc::new(AtomicU64::new(0)),
            enabled,
        }
    }

    /// A tracker that draws nothing
    pub fn hidden() -> Self {
        Self::new(false)
    }

    /// Register one more file to upload
    pub fn add_planned(&self, bytes: u64) {
        self.overall.inc_length(1);
        self.bytes_planned.fetch_add(bytes, Ordering::Relaxed);
        self.refresh();
    }

    /// Mark one upload as done
    pub fn finish_file(&self, bytes: u64) {
        self.overall.inc(1);
        self.bytes_done.fetch_add(bytes, Ordering::Relaxed);
        self.refresh();
    }

    /// Mark one upload as failed
    pub fn fail_file(&self) {
        self.overall.inc(1);
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.refresh();
    }

    fn refresh(&self) {
        if !self.enabled {
            return;
        }
        let msg = format!(
            "Uploaded: {} of {} | Failed: {}",
            format_size(self.bytes_done.load(Ordering::Relaxed)),
            format_size(self.bytes_planned.load(Ordering::Relaxed)),
            self.failures.load(Ordering::Relaxed)
        );
        self.stats.set_message(msg);
    }

    /// Finish all progress bars
    pub fn finish(&self) {
        self.overall.finish();
        self.stats.finish();
    }

    /// Print a message (works with progress bars)
    pub fn println(&self, msg: &str) {
        if self.enabled {
            self.multi.println(msg).ok();
        } else {
            println!("{}", msg);
        }
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::hidden()
    }
}

/// Format a file size for display
pub fn format_size(bytes: u64) -> String {
    human_bytes::human_bytes(bytes as f64)
}

/// Format a duration for display
pub fn format_duration(secs: f64) -> String {
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else if secs < 3600.0 {
        format!("{:.1}m", secs / 60.0)
    } else {
        format!("{:.1}h", secs / 3600.0)
    }
}

/// Format transfer rate for display
pub fn format_rate(bytes_per_sec: f64) -> String {
    format!("{}/s", human_bytes::human_bytes(bytes_per_sec))
}

/// Print a dry-run summary
pub fn print_dry_run_summary(stats: &SyncStats) {
    println!("\n=== Dry Run Summary ===");
    println!("Local files:      {}", stats.files_scanned);
    println!("Remote objects:   {}", stats.remote_listed);
    println!("Files to upload:  {}", stats.files_planned);
    println!("Files up to date: {}", stats.files_skipped());
    println!("Would transfer:   {}", format_size(stats.bytes_planned));
    if stats.remote_truncated {
        println!("Remote listing was incomplete; unmatched files counted as uploads");
    }
}

/// Print a final summary after sync
pub fn print_summary(stats: &SyncStats) {
    println!("\n=== Sync Complete ===");
    println!("Duration:          {}", format_duration(stats.duration_secs));
    println!("Local files:       {}", stats.files_scanned);
    println!("Files uploaded:    {}", stats.files_uploaded);
    println!("Files up to date:  {}", stats.files_skipped());
    println!("Upload failures:   {}", stats.upload_failures);
    println!("Bytes transferred: {}", format_size(stats.bytes_transferred));
    println!("Transfer rate:     {}", format_rate(stats.transfer_rate()));

    if stats.remote_truncated {
        println!("\nWarning: remote listing was incomplete; some files may have been re-uploaded");
    }
    if !stats.failed_files.is_empty() {
        println!("\nFailed files:");
        for name in &stats.failed_files {
            println!("  {}", name);
        }
    }
}
