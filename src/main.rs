use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use coletor::config::Config;

mod commands;

#[derive(Parser)]
#[command(
    name = "coletor",
    version,
    about = "DataSUS open-data catalog and API downloader",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true)]
    log_format: Option<String>,

    /// TOML configuration file (environment variables override it)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Download one resource per catalog dataset, then harvest the API
    Crawl {
        /// Output root; files land under <output>/datasus/
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Number of datasets processed concurrently
        #[arg(short, long)]
        workers: Option<usize>,

        /// Do not harvest the open-data API after the catalog
        #[arg(long, default_value = "false")]
        skip_openapi: bool,

        /// Write Prometheus metrics in text format to this file at the end
        #[arg(long)]
        metrics_file: Option<PathBuf>,
    },

    /// Harvest the open-data API only
    Harvest {
        /// Output root; files land under <output>/datasus/
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show completed datasets and previous runs
    Status {
        /// Output root used by earlier runs
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }

    setup_tracing(&config.logging.format, &config.logging.level, cli.verbose)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "coletor starting");

    match cli.command {
        Commands::Crawl {
            output,
            workers,
            skip_openapi,
            metrics_file,
        } => {
            if let Some(output) = output {
                config.pipeline.output_root = output;
            }
            if let Some(workers) = workers {
                config.pipeline.workers = workers;
            }
            if skip_openapi {
                config.harvest.enabled = false;
            }
            config.validate()?;

            tracing::info!(
                output = %config.pipeline.output_root.display(),
                workers = config.pipeline.workers,
                openapi = config.harvest.enabled,
                "Starting crawl command"
            );
            commands::crawl(config, metrics_file).await?;
        }

        Commands::Harvest { output } => {
            if let Some(output) = output {
                config.pipeline.output_root = output;
            }
            config.validate()?;

            tracing::info!(output = %config.pipeline.output_root.display(), "Starting harvest command");
            commands::harvest(config).await?;
        }

        Commands::Status { output } => {
            if let Some(output) = output {
                config.pipeline.output_root = output;
            }
            commands::status(&config).await?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => Config::default(),
    };
    config.apply_env();
    Ok(config)
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("coletor=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("coletor={level},warn")))
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}
