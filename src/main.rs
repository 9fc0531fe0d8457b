//! Sumi-Archiver main entry point
//!
//! This is the command-line interface for the Sumi-Archiver web archival crawler.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use sumi_archiver::config::{load_config_with_hash, validate, Config};
use sumi_archiver::crawler::{run_crawl, CrawlOptions, Seeds};
use sumi_archiver::orchestrator::{HqClient, Orchestrator};
use sumi_archiver::output::print_queue_statistics;
use sumi_archiver::queue;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const EXIT_FATAL: u8 = 1;
const EXIT_USAGE: u8 = 2;

/// Sumi-Archiver: a durable web archival crawler
///
/// Sumi-Archiver fetches URLs, archives every HTTP exchange, and follows the
/// links and assets it finds, with per-host rate limiting and a crash-safe
/// queue.
#[derive(Parser, Debug)]
#[command(name = "sumi-archiver")]
#[command(version)]
#[command(about = "A durable web archival crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(short, long, global = true, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start a crawl
    Get {
        #[command(subcommand)]
        source: GetSource,

        #[command(flatten)]
        overrides: Overrides,
    },

    /// Show the queue statistics of a job directory and exit
    Stats {
        #[arg(value_name = "JOB_DIR")]
        job_dir: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum GetSource {
    /// Crawl from the given URLs
    Url {
        #[arg(required = true, value_name = "URL")]
        urls: Vec<String>,
    },

    /// Crawl from a seed file, one URL per line
    List {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Crawl URLs pulled from the configured orchestrator
    Hq,
}

/// CLI values taking precedence over the configuration file
#[derive(Args, Debug)]
struct Overrides {
    /// Job name (also names the default job directory)
    #[arg(long)]
    job_name: Option<String>,

    /// Number of crawl workers
    #[arg(short, long)]
    workers: Option<usize>,

    /// Maximum hop distance from a seed
    #[arg(long)]
    max_hops: Option<u64>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Command::Stats { job_dir } => {
            setup_logging(cli.verbose, cli.quiet, None);
            match handle_stats(&job_dir) {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    tracing::error!("Failed to read job statistics: {:#}", e);
                    ExitCode::from(EXIT_FATAL)
                }
            }
        }
        Command::Get { source, overrides } => {
            let (config, hash) = match load_job_config(cli.config.as_deref(), overrides) {
                Ok(loaded) => loaded,
                Err(e) => {
                    eprintln!("Invalid configuration: {:#}", e);
                    return ExitCode::from(EXIT_USAGE);
                }
            };

            let job_dir = config.job_dir();
            setup_logging(cli.verbose, cli.quiet, Some(&job_dir));
            install_panic_hook(&job_dir);

            match handle_crawl(config, hash, source).await {
                Ok(()) => ExitCode::SUCCESS,
                Err(CliError::Usage(e)) => {
                    tracing::error!("{:#}", e);
                    ExitCode::from(EXIT_USAGE)
                }
                Err(CliError::Fatal(e)) => {
                    tracing::error!("Crawl failed: {:#}", e);
                    ExitCode::from(EXIT_FATAL)
                }
            }
        }
    }
}

enum CliError {
    Usage(anyhow::Error),
    Fatal(anyhow::Error),
}

/// Loads the configuration file (or the defaults) and applies CLI overrides
fn load_job_config(
    path: Option<&Path>,
    overrides: Overrides,
) -> anyhow::Result<(Config, Option<String>)> {
    let (mut config, hash) = match path {
        Some(path) => {
            let (config, hash) = load_config_with_hash(path)
                .with_context(|| format!("loading {}", path.display()))?;
            (config, Some(hash))
        }
        None => (Config::default(), None),
    };

    if let Some(job_name) = overrides.job_name {
        config.job.job_name = job_name;
    }
    if let Some(workers) = overrides.workers {
        config.job.workers = workers;
    }
    if let Some(max_hops) = overrides.max_hops {
        config.crawler.max_hops = max_hops;
    }
    validate(&config)?;

    Ok((config, hash))
}

/// Sets up the logging/tracing subscriber based on verbosity level
///
/// With a job directory, every event is also written as JSON to
/// `logs/sumi-archiver.log` inside it.
fn setup_logging(verbose: u8, quiet: bool, job_dir: Option<&Path>) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_archiver=info,warn"),
            1 => EnvFilter::new("sumi_archiver=debug,info"),
            2 => EnvFilter::new("sumi_archiver=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    let file_layer = job_dir.and_then(|dir| {
        let logs = dir.join("logs");
        std::fs::create_dir_all(&logs).ok()?;
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(logs.join("sumi-archiver.log"))
            .ok()?;
        Some(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(Mutex::new(file)),
        )
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false),
        )
        .with(file_layer)
        .init();
}

/// Writes a diagnostic file under `logs/` when any thread panics
fn install_panic_hook(job_dir: &Path) {
    let logs = job_dir.join("logs");
    let default_hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |info| {
        let backtrace = std::backtrace::Backtrace::force_capture();
        let stamp = chrono::Local::now().format("%Y%m%dT%H%M%S");
        let path = logs.join(format!("panic.{}.log", stamp));

        let written = std::fs::create_dir_all(&logs).and_then(|_| {
            let mut file = std::fs::File::create(&path)?;
            writeln!(file, "{}", info)?;
            writeln!(file, "\n{}", backtrace)
        });
        match written {
            Ok(()) => eprintln!("Panic details written to {}", path.display()),
            Err(e) => eprintln!("Failed to write panic log {}: {}", path.display(), e),
        }
        default_hook(info);
    }));
}

/// Handles the `stats` command: prints the persisted queue statistics
fn handle_stats(job_dir: &Path) -> anyhow::Result<()> {
    if !job_dir.join("queue").is_file() {
        anyhow::bail!("no queue found in {}", job_dir.display());
    }

    println!("Job directory: {}\n", job_dir.display());
    let inspection = queue::inspect(job_dir)
        .with_context(|| format!("inspecting {}", job_dir.display()))?;
    print_queue_statistics(&inspection);
    Ok(())
}

/// Handles the `get` commands
async fn handle_crawl(
    config: Config,
    config_hash: Option<String>,
    source: GetSource,
) -> Result<(), CliError> {
    let mut options = CrawlOptions {
        config_hash,
        ..Default::default()
    };

    let seeds = match source {
        GetSource::Url { urls } => Seeds::Urls(urls),
        GetSource::List { file } => {
            if !file.is_file() {
                return Err(CliError::Usage(anyhow::anyhow!(
                    "seed file {} does not exist",
                    file.display()
                )));
            }
            Seeds::File(file)
        }
        GetSource::Hq => {
            let settings = config.orchestrator.as_ref().ok_or_else(|| {
                CliError::Usage(anyhow::anyhow!(
                    "`get hq` requires an [orchestrator] table in the configuration"
                ))
            })?;
            let client = HqClient::new(settings, &config.crawler.user_agent)
                .map_err(|e| CliError::Usage(e.into()))?;
            let orchestrator: Arc<dyn Orchestrator> = Arc::new(client);
            options.orchestrator = Some(orchestrator);
            Seeds::Orchestrator
        }
    };

    tracing::info!(
        job = %config.job.job_name,
        workers = config.job.workers,
        max_hops = config.crawler.max_hops,
        "Starting crawl"
    );

    match run_crawl(config, seeds, options).await {
        Ok(summary) => {
            if summary.detached_workers > 0 {
                tracing::warn!(
                    detached = summary.detached_workers,
                    "Some workers were detached at shutdown"
                );
            }
            tracing::info!("Crawl completed successfully");
            Ok(())
        }
        Err(e) => Err(CliError::Fatal(e.into())),
    }
}
