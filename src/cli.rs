//! CLI argument parsing for s3push

use crate::config::Config;
use crate::error::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// s3push - one-way incremental upload of a local tree to S3
#[derive(Parser, Debug)]
#[command(name = "s3push")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Output logs as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Upload new and changed files from a local directory
    Push(PushArgs),

    /// Upload a database dump under the backup prefix
    Backup(BackupArgs),

    /// Show configuration
    Config(ConfigArgs),
}

/// Options shared by every command that talks to S3
#[derive(clap::Args, Debug, Default)]
pub struct RemoteArgs {
    /// Destination URI, s3://bucket[/prefix] [default: s3_url from config]
    #[arg(long = "to")]
    pub to: Option<String>,

    /// AWS region
    #[arg(long)]
    pub region: Option<String>,

    /// Custom S3-compatible endpoint URL
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Number of parallel uploads, 0 = CPU count [default: from config]
    #[arg(short = 'j', long)]
    pub jobs: Option<usize>,

    /// Perform a trial run with no uploads
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Show progress bars
    #[arg(short = 'P', long)]
    pub progress: bool,

    /// Size at which uploads switch to multipart (e.g. 64M)
    #[arg(long, value_parser = parse_size_arg)]
    pub multipart_threshold: Option<u64>,

    /// Configuration file path
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,
}

impl RemoteArgs {
    /// Load the configuration file and apply command-line overrides
    pub fn to_config(&self) -> Result<Config> {
        let mut config = match self.config {
            Some(ref path) => Config::load_from(path)?,
            None => Config::load()?,
        };

        if let Some(ref to) = self.to {
            config.s3_url = to.clone();
        }
        if self.region.is_some() {
            config.region = self.region.clone();
        }
        if self.endpoint.is_some() {
            config.s3_endpoint = self.endpoint.clone();
        }
        if let Some(jobs) = self.jobs {
            config.jobs = jobs;
        }
        if let Some(threshold) = self.multipart_threshold {
            config.multipart_threshold = threshold;
        }
        config.dry_run |= self.dry_run;
        config.progress |= self.progress;

        Ok(config)
    }
}

/// Arguments for the push command
#[derive(Parser, Debug)]
pub struct PushArgs {
    /// Local directory or file [default: uploads_location from config]
    pub source: Option<PathBuf>,

    /// Key prefix under the destination [default: bucket_prefix from config]
    #[arg(long)]
    pub prefix: Option<String>,

    #[command(flatten)]
    pub remote: RemoteArgs,
}

impl PushArgs {
    /// Resolve the configuration for this push
    pub fn to_config(&self) -> Result<Config> {
        let mut config = self.remote.to_config()?;
        if let Some(ref prefix) = self.prefix {
            config.bucket_prefix = prefix.clone();
        }
        Ok(config)
    }
}

/// Arguments for the backup command
#[derive(Parser, Debug)]
pub struct BackupArgs {
    /// Database dump to upload
    pub dump: PathBuf,

    /// Backup name [default: local timestamp]
    #[arg(long)]
    pub name: Option<String>,

    #[command(flatten)]
    pub remote: RemoteArgs,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Show the configuration file path
    #[arg(long)]
    pub path: bool,

    /// Create default configuration file
    #[arg(long)]
    pub init: bool,
}

fn parse_size_arg(s: &str) -> std::result::Result<u64, String> {
    Config::parse_size(s).map_err(|e| e.to_string())
}
