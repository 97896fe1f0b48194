//! Configuration management for s3push

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default number of parallel uploads
pub const DEFAULT_JOBS: usize = 5;

/// Default capacity of the remote listing buffer (records)
pub const DEFAULT_REMOTE_BUFFER: usize = 50_000;

/// Default size at which uploads switch to multipart (64MB)
pub const DEFAULT_MULTIPART_THRESHOLD: u64 = 64 * 1024 * 1024;

/// Default multipart part size (16MB)
pub const DEFAULT_PART_SIZE: u64 = 16 * 1024 * 1024;

/// S3 minimum part size (5MB)
pub const S3_MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Config file looked up in the working directory before the user config dir
pub const LOCAL_CONFIG_FILE: &str = "s3push.toml";

/// Main configuration struct
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // ==================== Target ====================

    /// Target bucket URI (`s3://bucket[/path]`)
    pub s3_url: String,

    /// AWS region; falls back to the SDK's region chain when unset
    pub region: Option<String>,

    /// Custom endpoint for S3-compatible storage (MinIO, Hetzner, etc.)
    pub s3_endpoint: Option<String>,

    /// Key prefix that uploads are placed under
    pub bucket_prefix: String,

    /// Local directory synced by `push` when no source is given
    pub uploads_location: PathBuf,

    /// Key prefix under which database dumps are stored
    pub backup_prefix: String,

    // ==================== Transfer ====================

    /// Number of parallel uploads (0 = auto-detect CPU count)
    pub jobs: usize,

    /// Remote records buffered ahead of the diff
    pub remote_buffer: usize,

    /// Files at or above this size use multipart upload (bytes)
    pub multipart_threshold: u64,

    /// Multipart part size (bytes)
    pub part_size: u64,

    /// Perform a dry run (no uploads)
    pub dry_run: bool,

    /// Show progress bars
    pub progress: bool,

    // ==================== Retry ====================

    /// Maximum retries for failed operations
    pub max_retries: u32,

    /// Retry delay base in milliseconds
    pub retry_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // Target
            s3_url: String::new(),
            region: None,
            s3_endpoint: None,
            bucket_prefix: String::new(),
            uploads_location: PathBuf::from("."),
            backup_prefix: "database_backups".to_string(),

            // Transfer
            jobs: DEFAULT_JOBS,
            remote_buffer: DEFAULT_REMOTE_BUFFER,
            multipart_threshold: DEFAULT_MULTIPART_THRESHOLD,
            part_size: DEFAULT_PART_SIZE,
            dry_run: false,
            progress: false,

            // Retry
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

impl Config {
    /// Load configuration from `./s3push.toml` or the default config file
    pub fn load() -> Result<Self> {
        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            return Self::load_from(&local);
        }

        let config_path = Self::default_config_path()?;
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::io("reading config", e))?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to the default config file
    pub fn save(&self) -> Result<()> {
        let config_path = Self::default_config_path()?;
        self.save_to(&config_path)
    }

    /// Save configuration to a specific file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io("creating config dir", e))?;
        }
        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::config(format!("serializing config: {}", e)))?;
        std::fs::write(path, contents).map_err(|e| Error::io("writing config", e))?;
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_config_path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join("s3push").join("config.toml"))
            .ok_or_else(|| Error::config("could not determine config directory"))
    }

    /// Check the values a sync cannot run without
    pub fn validate(&self) -> Result<()> {
        if self.s3_url.trim().is_empty() {
            return Err(Error::config("s3_url is not set"));
        }
        if self.remote_buffer == 0 {
            return Err(Error::config("remote_buffer must be greater than zero"));
        }
        Ok(())
    }

    /// Get the effective number of jobs (resolves 0 to CPU count)
    pub fn effective_jobs(&self) -> usize {
        if self.jobs == 0 {
            num_cpus::get()
        } else {
            self.jobs
        }
    }

    /// Part size clamped to the S3 minimum
    pub fn effective_part_size(&self) -> u64 {
        self.part_size.max(S3_MIN_PART_SIZE)
    }

    /// Parse a size string like "100", "100K", "100M", "100G" into bytes
    pub fn parse_size(s: &str) -> Result<u64> {
        let s = s.trim().to_uppercase();
        if s.is_empty() {
            return Ok(0);
        }

        let digits_end = s
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(s.len());
        let (num_part, suffix) = s.split_at(digits_end);

        let multiplier = match suffix.trim() {
            "" | "B" => 1u64,
            "K" | "KB" => 1024,
            "M" | "MB" => 1024 * 1024,
            "G" | "GB" => 1024 * 1024 * 1024,
            "T" | "TB" => 1024u64 * 1024 * 1024 * 1024,
            _ => return Err(Error::config(format!("invalid size value: {}", s))),
        };

        let num: u64 = num_part
            .parse()
            .map_err(|_| Error::config(format!("invalid size value: {}", s)))?;

        num.checked_mul(multiplier)
            .ok_or_else(|| Error::config(format!("size value too large: {}", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.jobs, DEFAULT_JOBS);
        assert_eq!(config.remote_buffer, DEFAULT_REMOTE_BUFFER);
        assert_eq!(config.backup_prefix, "database_backups");
        assert!(!config.dry_run);
    }

    #[test]
    fn test_effective_jobs() {
        let mut config = Config::default();
        assert_eq!(config.effective_jobs(), 5);

        config.jobs = 0;
        assert!(config.effective_jobs() > 0);
    }

    #[test]
    fn test_effective_part_size_clamped() {
        let mut config = Config::default();
        config.part_size = 1024;
        assert_eq!(config.effective_part_size(), S3_MIN_PART_SIZE);
    }

    #[test]
    fn test_validate() {
        let mut config = Config::default();
        assert!(config.validate().is_err());

        config.s3_url = "s3://bucket".to_string();
        assert!(config.validate().is_ok());

        config.remote_buffer = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(Config::parse_size("100").unwrap(), 100);
        assert_eq!(Config::parse_size("4k").unwrap(), 4096);
        assert_eq!(Config::parse_size("64M").unwrap(), 64 * 1024 * 1024);
        assert_eq!(Config::parse_size("1GB").unwrap(), 1024 * 1024 * 1024);
        assert_eq!(Config::parse_size("").unwrap(), 0);
        assert!(Config::parse_size("12X").is_err());
        assert!(Config::parse_size("M").is_err());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.s3_url = "s3://bucket/site".to_string();
        config.bucket_prefix = "htdocs/app/uploads".to_string();
        config.jobs = 8;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.s3_url, "s3://bucket/site");
        assert_eq!(loaded.bucket_prefix, "htdocs/app/uploads");
        assert_eq!(loaded.jobs, 8);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "s3_url = \"s3://b\"\nregion = \"us-east-2\"\n").unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.region.as_deref(), Some("us-east-2"));
        assert_eq!(loaded.jobs, DEFAULT_JOBS);
    }
}
