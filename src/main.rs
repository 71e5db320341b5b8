use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use listing_watcher::config::{AppConfig, LoggingConfig};
use listing_watcher::orchestrator::{BatchOptions, BatchOrchestrator};
use listing_watcher::persistence::SqliteGateway;
use listing_watcher::resilience::ScrapeEngine;
use listing_watcher::scheduler::BatchScheduler;

#[derive(Parser)]
#[command(name = "listing-watcher", about = "Keeps marketplace listing prices fresh", version)]
struct Cli {
    /// Config file to load instead of the config/ directory.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler until interrupted (default).
    Run,
    /// Run a single batch and print its report.
    Once,
    /// Scrape one listing and print what was found.
    Scrape {
        url: String,
        /// Marketplace name, e.g. Amazon or eBay.
        source: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::from_env()?,
    };

    let _guard = init_tracing(&config.logging)?;

    if config.metrics.enabled {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(([0, 0, 0, 0], config.metrics.port))
            .install()?;
        info!("Prometheus metrics on port {}", config.metrics.port);
    }

    let engine = Arc::new(ScrapeEngine::from_config(&config)?);

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Scrape { url, source } => {
            let listing = engine.check_listing(&url, &source).await?;
            println!("{}", serde_json::to_string_pretty(&listing)?);
        }
        Commands::Once => {
            let orchestrator = build_orchestrator(&config, engine).await?;
            let report = orchestrator.run().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Run => {
            info!("Starting listing watcher...");
            let orchestrator = build_orchestrator(&config, engine).await?;
            let mut scheduler = BatchScheduler::new(Arc::new(orchestrator), config.scheduler.clone()).await?;
            scheduler.start().await?;

            tokio::signal::ctrl_c().await?;
            info!("Shutting down...");
            scheduler.shutdown().await?;
        }
    }

    Ok(())
}

async fn build_orchestrator(config: &AppConfig, engine: Arc<ScrapeEngine>) -> Result<BatchOrchestrator> {
    let gateway = SqliteGateway::connect(&config.database).await?;
    Ok(BatchOrchestrator::new(
        engine,
        Arc::new(gateway),
        BatchOptions::from_config(config),
    ))
}

fn init_tracing(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::from_default_env().add_directive("listing_watcher=debug".parse()?);

    match &config.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, &config.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .init();
            Ok(None)
        }
    }
}
