//! Main CLI application structure

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use super::output::{Output, OutputFormat};
use super::{archive_cmd, copy_cmd, export_cmd, import_cmd, mapping_cmd};
use crate::hub::HttpHub;
use crate::migrate::ArchiveAction;
use crate::storage::Config;

#[derive(Parser)]
#[command(name = "hubmigrate")]
#[command(author, version, about = "Dependency-aware content migration between content hubs")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Enable verbose output for debugging
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Path to a config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Hub to operate on
    #[arg(long, global = true, env = "HUB_MIGRATE_HUB_ID")]
    pub hub_id: Option<String>,

    /// Base URL of the content API
    #[arg(long, global = true, env = "HUB_MIGRATE_BASE_URL")]
    pub base_url: Option<String>,

    /// API bearer token
    #[arg(long, global = true, env = "HUB_MIGRATE_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Import content items from an export directory
    Import(import_cmd::ImportArgs),

    /// Export content items to a directory
    Export(export_cmd::ExportArgs),

    /// Archive content items
    Archive(archive_cmd::ArchiveArgs),

    /// Unarchive content items
    Unarchive(archive_cmd::ArchiveArgs),

    /// Copy content items from one hub or repository to another
    Copy(copy_cmd::CopyArgs),

    /// Copy content items, then archive them on the source
    Move(copy_cmd::CopyArgs),

    /// Inspect ID mapping files
    #[command(subcommand)]
    Mapping(mapping_cmd::MappingCommands),
}

/// HTTP client for the configured hub
pub(super) fn connect(config: &Config) -> Result<Arc<HttpHub>> {
    let hub_id = config.require_hub_id()?;
    let hub = HttpHub::new(&config.hub.base_url, hub_id, config.hub.token.clone())?;
    Ok(Arc::new(hub))
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,hub_migrate={}", level)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .try_init();
}

/// Main entry point for the CLI
pub fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let output = Output::new(cli.format, cli.verbose);

    let config = Config::load(cli.config.as_deref())?.with_overrides(cli.hub_id, cli.base_url, cli.token);
    output.verbose_ctx("config", &format!("Data directory: {}", config.data_dir().display()));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;

    let success = runtime.block_on(async {
        match cli.command {
            Commands::Import(args) => import_cmd::run(args, &config, &output).await,
            Commands::Export(args) => export_cmd::run(args, &config, &output).await,
            Commands::Archive(args) => {
                archive_cmd::run(args, ArchiveAction::Archive, &config, &output).await
            }
            Commands::Unarchive(args) => {
                archive_cmd::run(args, ArchiveAction::Unarchive, &config, &output).await
            }
            Commands::Copy(args) => copy_cmd::run(args, false, &config, &output).await,
            Commands::Move(args) => copy_cmd::run(args, true, &config, &output).await,
            Commands::Mapping(cmd) => mapping_cmd::run(cmd, &output),
        }
    })?;

    Ok(if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
