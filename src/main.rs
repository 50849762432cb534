use std::path::{Path, PathBuf};
use std::process::ExitCode;
use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use colored::*;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use modelpub::config::Settings;
use modelpub::convert::ExternalConverter;
use modelpub::display;
use modelpub::fileserver::{IndexClient, WriteMode};
use modelpub::publish::{check_scale, PublishRequest, Publisher};

/// Convert 3D models and publish them to the asset fileserver
///
/// Example usage:
///   modelpub publish --model model.blend --name cat-model
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Directory holding default.toml / local.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Convert, package and upload a model, then add it to the catalog
    Publish(PublishArgs),
    /// Show the assets listed in the remote catalog
    List,
}

#[derive(Args)]
struct PublishArgs {
    /// The file location of the model
    #[arg(long)]
    model: PathBuf,
    /// The name of the model. Needs to be unique
    #[arg(long)]
    name: Option<String>,
    /// Metadata file (defaults to metadata.json next to the model)
    #[arg(long)]
    metadata: Option<PathBuf>,
    /// Provenance tag stored in the catalog
    #[arg(long)]
    source: Option<String>,
    /// Scale factor stored in the catalog
    #[arg(long, value_parser = parse_scale)]
    scale: Option<f64>,
    /// Also generate the demo world from the scene template
    #[arg(long)]
    demo: bool,
}

/// Main entry point for modelpub
///
/// Loads settings, sets up file logging, then runs the requested command.
/// Any fatal error or failed publish step gives a non-zero exit code.
#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    let settings = match &cli.config {
        Some(dir) => Settings::load(dir),
        None => Settings::new(),
    }
    .context("Failed to load settings")?;

    let _guard = init_logging(&settings)?;
    info!("modelpub starting up");

    let result = match cli.command {
        Command::Publish(args) => publish(&settings, args).await,
        Command::List => list(&settings).await,
    };
    // Logged here so the entry is flushed when the guard drops
    if let Err(e) = &result {
        error!("{:#}", e);
    }
    result
}

fn parse_scale(value: &str) -> Result<f64, String> {
    let scale: f64 = value.parse().map_err(|e| format!("{}", e))?;
    check_scale(scale).map_err(|e| e.to_string())
}

/// Sets up the daily rolling log file. The returned guard flushes the
/// non-blocking writer when dropped.
fn init_logging(settings: &Settings) -> anyhow::Result<tracing_appender::non_blocking::WorkerGuard> {
    let log_dir = settings.logging.file.as_deref().unwrap_or_else(|| Path::new("logs"));
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

    let file_appender = tracing_appender::rolling::RollingFileAppender::new(
        tracing_appender::rolling::Rotation::DAILY,
        log_dir,
        "modelpub",
    );
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        // Disable ANSI colors for cleaner log files
        .with_ansi(false)
        .with_line_number(true)
        .with_file(true)
        .with_target(false)
        .with_env_filter(EnvFilter::new(settings.logging.level.to_lowercase()))
        .init();

    Ok(guard)
}

async fn publish(settings: &Settings, args: PublishArgs) -> anyhow::Result<bool> {
    let request = PublishRequest {
        model: args.model,
        name: args.name,
        metadata: args.metadata,
        source: args.source,
        scale: args.scale,
        demo_scene: args.demo,
    };

    let publisher = Publisher::new(settings, ExternalConverter::new(&settings.converter))?;
    let report = publisher.publish(&request).await?;

    display::display_report(&report);
    if report.succeeded() {
        println!("{}", "Model published successfully".green().bold());
    } else {
        println!("{}", "Model publish failed".red().bold());
    }
    Ok(report.succeeded())
}

async fn list(settings: &Settings) -> anyhow::Result<bool> {
    let index = IndexClient::new(
        settings.fileserver(),
        &settings.index.path,
        settings.index_timeout(),
        WriteMode::LastWriterWins,
    )?;
    let snapshot = index.fetch_index().await?;
    display::display_catalog(&snapshot.catalog);
    Ok(true)
}
