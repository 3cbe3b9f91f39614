mod metrics;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::runtime::Handle;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cadence_core::{
    load_config, validate_config, Config, ConversionJob, ConversionManager, JobStatus,
    MediaSource,
};

/// Supervised media conversion.
#[derive(Debug, Parser)]
#[command(name = "cadence", version, about)]
struct Cli {
    /// Configuration file. Defaults to `$CADENCE_CONFIG`, then `config.toml`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print job snapshots as JSON lines and log as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Convert one or more files with a configured converter.
    Convert {
        /// Name of a `[converters.<name>]` section.
        #[arg(short, long)]
        converter: String,

        /// Print Prometheus metrics once every conversion has ended.
        #[arg(long)]
        metrics: bool,

        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// List configured converters.
    Converters,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays machine readable
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::registry()
        .with(filter)
        .with(cli.json.then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
        }))
        .with((!cli.json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();

    let config_path = cli
        .config
        .clone()
        .or_else(|| std::env::var("CADENCE_CONFIG").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    validate_config(&config).context("Configuration validation failed")?;

    match cli.command {
        Command::Convert {
            converter,
            metrics: print_metrics,
            files,
        } => {
            let result = convert(&config, &converter, files, cli.json).await;
            if print_metrics {
                print!("{}", metrics::encode_metrics()?);
            }
            result
        }
        Command::Converters => list_converters(&config, cli.json),
    }
}

async fn convert(config: &Config, name: &str, files: Vec<PathBuf>, json: bool) -> Result<()> {
    let converter = config
        .converter(name)
        .with_context(|| format!("Cannot convert with {:?}", name))?;
    let poll_interval = config.manager.poll_interval();
    let mut manager = ConversionManager::new(config.manager.clone(), Handle::current());

    let mut jobs = Vec::with_capacity(files.len());
    for file in files {
        let job = manager
            .start_conversion(MediaSource::new(&file), Arc::clone(&converter))
            .with_context(|| format!("Failed to start conversion of {:?}", file))?;
        job.listen(move |job| report(job, json))?;
        jobs.push(job);
    }

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    let mut canceled = false;

    loop {
        manager.check_notifications();
        if manager.idle() {
            break;
        }

        tokio::select! {
            _ = &mut shutdown, if !canceled => {
                let count = manager.cancel_all();
                info!("Shutdown requested, canceling {} conversion(s)", count);
                canceled = true;
            }
            _ = tokio::time::sleep(poll_interval) => {}
        }
    }

    let unfinished = jobs
        .iter()
        .filter(|job| job.status() != JobStatus::Finished)
        .count();
    if unfinished > 0 {
        bail!("{} of {} conversion(s) did not finish", unfinished, jobs.len());
    }
    Ok(())
}

fn report(job: &ConversionJob, json: bool) {
    if json {
        match serde_json::to_string(&job.snapshot()) {
            Ok(line) => println!("{}", line),
            Err(e) => warn!(job = %job.id(), error = %e, "Failed to encode job snapshot"),
        }
        return;
    }

    match job.status() {
        JobStatus::Pending => {}
        JobStatus::Converting => info!(
            job = %job.id(),
            source = %job.source(),
            eta = ?job.eta(),
            "{:.1}%",
            job.progress_percent() * 100.0
        ),
        JobStatus::Finished => info!(
            job = %job.id(),
            source = %job.source(),
            output = ?job.output(),
            "Finished"
        ),
        JobStatus::Failed => error!(
            job = %job.id(),
            source = %job.source(),
            "Failed: {}",
            job.error().unwrap_or_default()
        ),
        JobStatus::Canceled => warn!(job = %job.id(), source = %job.source(), "Canceled"),
    }
}

fn list_converters(config: &Config, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&config.converters)?);
        return Ok(());
    }

    if config.converters.is_empty() {
        warn!("No converters configured");
    }
    for (name, converter) in &config.converters {
        println!(
            "{}\t.{}\t{}",
            name,
            converter.extension,
            converter.executable.display()
        );
    }
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
