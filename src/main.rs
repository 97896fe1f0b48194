//! s3push - one-way incremental upload of a local tree to S3

use clap::Parser;
use s3push::cli::{BackupArgs, Cli, Commands, ConfigArgs, PushArgs};
use s3push::config::Config;
use s3push::progress::{print_dry_run_summary, print_summary};
use s3push::sync::{backup_name, sync_database_backup, sync_uploads};
use s3push::types::SyncStats;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.json);

    // Ctrl+C stops dispatching; running uploads are allowed to finish
    let cancel = setup_shutdown_handler();

    let result = match cli.command {
        Commands::Push(args) => run_push(args, &cancel).await,
        Commands::Backup(args) => run_backup(args, &cancel).await,
        Commands::Config(args) => handle_config_command(args),
    };

    cancel.cancel();
    result
}

fn init_tracing(verbose: u8, json: bool) {
    let filter = match verbose {
        0 => EnvFilter::new("s3push=info"),
        1 => EnvFilter::new("s3push=debug"),
        2 => EnvFilter::new("s3push=trace"),
        _ => EnvFilter::new("trace"),
    };

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().pretty())
            .init();
    }
}

fn setup_shutdown_handler() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();

    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("Received Ctrl+C, finishing running uploads...");
                token.cancel();
            }
            _ = token.cancelled() => {
                // Normal shutdown
            }
        }
    });

    cancel
}

async fn run_push(args: PushArgs, cancel: &CancellationToken) -> anyhow::Result<()> {
    let config = args.to_config()?;
    let stats = sync_uploads(&config, args.source.as_deref(), cancel).await?;
    report(&config, &stats)
}

async fn run_backup(args: BackupArgs, cancel: &CancellationToken) -> anyhow::Result<()> {
    let config = args.remote.to_config()?;
    let name = args
        .name
        .unwrap_or_else(|| backup_name(&chrono::Local::now()));

    tracing::info!(dump = %args.dump.display(), name = %name, "Uploading database backup");
    let stats = sync_database_backup(&config, &args.dump, &name, cancel).await?;
    report(&config, &stats)
}

fn report(config: &Config, stats: &SyncStats) -> anyhow::Result<()> {
    if config.dry_run {
        print_dry_run_summary(stats);
        return Ok(());
    }

    print_summary(stats);
    if stats.upload_failures > 0 {
        anyhow::bail!("{} of {} uploads failed", stats.upload_failures, stats.files_planned);
    }
    Ok(())
}

fn handle_config_command(args: ConfigArgs) -> anyhow::Result<()> {
    if args.path {
        println!("{}", Config::default_config_path()?.display());
    } else if args.init {
        let config = Config::default();
        config.save()?;
        println!(
            "Created default configuration at {}",
            Config::default_config_path()?.display()
        );
    } else {
        let config = Config::load()?;
        println!("{}", toml::to_string_pretty(&config)?);
    }
    Ok(())
}
