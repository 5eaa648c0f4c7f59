use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};

use banhammer::api::{Channel, GroupApi, HttpGroupApi};
use banhammer::cancel::CancelToken;
use banhammer::cli::{BanArgs, Cli, Commands, SearchArgs};
use banhammer::config::{self, AppConfig};
use banhammer::logger::{init_tracing, RunLogger, VerbosityLevel};
use banhammer::moderation::run_ban_file;
use banhammer::pipeline::{run_discovery, DiscoveryOptions};
use banhammer::result_sink::results_path;
use banhammer::scanner::ScanParams;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(VerbosityLevel::from_verbose_count(cli.verbose));

    // Handle --init flag first (before any other processing)
    if cli.init {
        match AppConfig::create_default_config() {
            Ok(path) => {
                println!("Created default configuration file at: {}", path.display());
                println!("Edit this file to set the gateway URL and session token, then run banhammer again.");
                std::process::exit(0);
            }
            Err(e) => {
                eprintln!("Failed to create configuration file: {}", e);
                std::process::exit(1);
            }
        }
    }

    let Some(command) = cli.command else {
        eprintln!("No command given. Use `banhammer search` or `banhammer ban` (see --help).");
        std::process::exit(1);
    };

    if let Commands::Search(args) = &command {
        if let Err(e) = args.validate() {
            eprintln!("Invalid arguments: {}", e);
            std::process::exit(1);
        }
    }

    let app_config = match AppConfig::load() {
        Ok(cfg) => cfg,
        Err(config::ConfigError::FileNotFound(path)) => match AppConfig::prompt_create_config() {
            Ok(Some(created_path)) => {
                println!("Created default configuration file at: {}", created_path.display());
                println!("Edit this file to set the gateway URL and session token, then run banhammer again.");
                std::process::exit(0);
            }
            Ok(None) => {
                eprintln!("Configuration file not found at: {}", path.display());
                eprintln!("Run with --init to create a default configuration file.");
                std::process::exit(1);
            }
            Err(e) => {
                eprintln!("Failed to create configuration file: {}", e);
                std::process::exit(1);
            }
        },
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    info!("Starting banhammer {}", env!("CARGO_PKG_VERSION"));

    let cancel = CancelToken::new();
    if let Err(e) = cancel.install_ctrlc_handler() {
        warn!("Failed to set Ctrl-C handler: {}. Interrupting will not save progress.", e);
    }

    let api: Arc<dyn GroupApi> =
        Arc::new(HttpGroupApi::new(&app_config).context("Failed to build API client")?);

    let channel_id = match &command {
        Commands::Search(args) => args.channel_id,
        Commands::Ban(args) => args.channel_id,
    };
    info!("Retrieving the channel information");
    let channel = match api.resolve_channel(channel_id).await {
        Ok(channel) => channel,
        Err(e) => {
            error!("Can't resolve channel {}: {}", channel_id, e);
            std::process::exit(1);
        }
    };
    info!("Working with channel {} ({})", channel.id, channel.title);

    let logger = RunLogger::new();
    let result = match command {
        Commands::Search(args) => search(api, channel, &args, &app_config, &cancel, &logger).await,
        Commands::Ban(args) => ban(api, channel, &args, &cancel, &logger).await,
    };
    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }

    if cancel.is_cancelled() {
        std::process::exit(130); // 130 = 128 + SIGINT(2)
    }
    Ok(())
}

async fn search(
    api: Arc<dyn GroupApi>,
    channel: Channel,
    args: &SearchArgs,
    config: &AppConfig,
    cancel: &CancelToken,
    logger: &RunLogger,
) -> Result<()> {
    let window = args.window().map_err(anyhow::Error::msg)?;
    let output = results_path(&args.results_dir(config), Local::now())?;

    let options = DiscoveryOptions {
        scan: ScanParams {
            strategy: args.strategy(config),
            window,
            start_offset: args.ban_search_offset,
            page_size: config.search.page_size,
            limit: args.limit(),
        },
        channel_capacity: config.search.channel_capacity,
        fetch_messages: args.fetch_messages(config),
    };

    let summary = run_discovery(api, channel, options, &output, cancel.clone()).await?;
    logger.print_discovery_summary(&summary);
    Ok(())
}

async fn ban(
    api: Arc<dyn GroupApi>,
    channel: Channel,
    args: &BanArgs,
    cancel: &CancelToken,
    logger: &RunLogger,
) -> Result<()> {
    let outcome = run_ban_file(api, channel, &args.file, cancel, logger).await?;
    logger.print_moderation_summary(&outcome);
    Ok(())
}
