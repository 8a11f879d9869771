//! trustwall - keeps an nftables allow-list in sync with trusted sources.

use anyhow::Result;
use clap::Parser;
use std::fs::OpenOptions;
use std::path::Path;
use std::process::ExitCode;
use tracing::level_filters::LevelFilter;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

use trustwall::cli::{Cli, Commands};
use trustwall::config::{Config, ConfigOrigin};

/// Install the stdout layer and, if the log file opens, a file layer.
///
/// Returns the writer guard (flushes the file on drop) and the reason the
/// log file could not be used, if any.
fn init_logging(cli: &Cli, log_file: &Path) -> Result<(Option<WorkerGuard>, Option<String>)> {
    let stdout_level = if cli.verbose {
        LevelFilter::DEBUG
    } else if cli.quiet {
        LevelFilter::ERROR
    } else {
        LevelFilter::INFO
    };
    let file_level = if cli.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_filter(stdout_level);

    let (file_layer, guard, file_error) = match open_log_file(log_file) {
        Ok(file) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(false)
                .with_filter(file_level);
            (Some(layer), Some(guard), None)
        }
        Err(e) => (None, None, Some(format!("{:?}: {}", log_file, e))),
    };

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(file_layer)
        .try_init()?;

    Ok((guard, file_error))
}

fn open_log_file(path: &Path) -> std::io::Result<std::fs::File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

fn report_config_origin(origin: &ConfigOrigin, path: &Path) {
    match origin {
        ConfigOrigin::File => info!("Loaded configuration from {:?}", path),
        ConfigOrigin::CreatedDefault => {
            info!("Config file {:?} not found, created with defaults", path)
        }
        ConfigOrigin::DefaultsUnwritable(reason) => {
            warn!("Config file {:?} not found and could not be created ({}), using defaults", path, reason)
        }
        ConfigOrigin::DefaultsAfterParseError(reason) => {
            warn!("Error reading config file {:?}: {}, using defaults", path, reason)
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let command = cli.command_or_default();

    if command == Commands::Version {
        println!("trustwall {}", env!("CARGO_PKG_VERSION"));
        return Ok(ExitCode::SUCCESS);
    }

    // Needed before logging starts: it names the log file
    let (config, origin) = Config::load(&cli.config)?;

    let (_guard, log_file_error) = init_logging(&cli, &config.log_file)?;
    if let Some(reason) = log_file_error {
        warn!("Logging to stdout only, cannot open log file {}", reason);
    }
    report_config_origin(&origin, &cli.config);

    let code = match command {
        Commands::Check => trustwall::commands::check::run(&config).await?,
        Commands::Update { force, dry_run } => {
            trustwall::commands::update::run(&config, force, dry_run).await?
        }
        Commands::Version => 0,
    };

    Ok(ExitCode::from(code))
}
