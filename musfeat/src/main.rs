//! musfeat - parallel audio feature extraction
//!
//! ```text
//! musfeat -f features.txt -o out.json [-j 8] [-i REGEX] [-e REGEX] DIR...
//! ```
//!
//! Exit codes: 0 success (also when nothing was found or the run was
//! interrupted), 1 run failure or crashed workers, 2 configuration error.
//!
//! The hidden `worker` subcommand is the entry point of worker processes
//! and is not meant to be run by hand.

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use std::io::{BufWriter, Read};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use musfeat::{launcher_for, Overrides, PipelineConfig, PipelineError, RunOutcome, WorkerMode};
use musfeat_common::config::{load_toml_config, resolve_config_source, DEFAULT_LOG_LEVEL};
use musfeat_common::logging::{init_logging, MAX_VERBOSITY};

const EXIT_FAILURE: u8 = 1;
const EXIT_CONFIG: u8 = 2;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " [",
    env!("GIT_HASH"),
    "] built ",
    env!("BUILD_TIMESTAMP"),
    " (",
    env!("BUILD_PROFILE"),
    ", ",
    env!("BUILD_TARGET"),
    ")"
);

/// Command-line arguments for musfeat
#[derive(Parser, Debug)]
#[command(name = "musfeat")]
#[command(about = "Extract audio features from music collections in parallel")]
#[command(version = VERSION)]
#[command(args_conflicts_with_subcommands = true, subcommand_negates_reqs = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Directories to search for audio files
    #[arg(value_name = "DIR", required = true)]
    inputs: Vec<PathBuf>,

    /// File containing the ';'-separated feature description
    #[arg(short, long, value_name = "FILE", required = true)]
    features: Option<PathBuf>,

    /// Output file for the result set (JSON)
    #[arg(short, long, value_name = "FILE", required = true)]
    output: Option<PathBuf>,

    /// Descend into subdirectories (default)
    #[arg(short, long, conflicts_with = "no_recursive")]
    recursive: bool,

    /// Only look at files directly inside each input directory
    #[arg(short, long)]
    no_recursive: bool,

    /// Only process files whose root-relative path matches this regex
    #[arg(short, long, value_name = "REGEX", env = "MUSFEAT_INCLUDE")]
    include: Option<String>,

    /// Skip files whose root-relative path matches this regex
    #[arg(short, long, value_name = "REGEX", env = "MUSFEAT_EXCLUDE")]
    exclude: Option<String>,

    /// Number of parallel workers [default: number of CPUs]
    #[arg(short = 'j', long, env = "MUSFEAT_WORKERS")]
    workers: Option<usize>,

    /// Thread cap of the extraction engine inside each worker [default: 1]
    #[arg(long, env = "MUSFEAT_ENGINE_THREADS")]
    engine_threads: Option<usize>,

    /// Worker isolation [default: process]
    #[arg(long, value_enum, env = "MUSFEAT_WORKER_MODE")]
    worker_mode: Option<WorkerMode>,

    /// Resample every file to this rate before extraction
    #[arg(long, value_name = "HZ", env = "MUSFEAT_SAMPLE_RATE")]
    sample_rate: Option<u32>,

    /// Executable started for process workers [default: this binary]
    #[arg(long, value_name = "FILE", env = "MUSFEAT_WORKER_PROGRAM", hide = true)]
    worker_program: Option<PathBuf>,

    /// Configuration file (TOML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process one shard read from stdin, answer on stdout
    #[command(hide = true)]
    Worker {
        #[arg(short, long, action = ArgAction::Count)]
        verbose: u8,
    },
}

impl Cli {
    fn overrides(&self) -> Overrides {
        let recursive = if self.recursive {
            Some(true)
        } else if self.no_recursive {
            Some(false)
        } else {
            None
        };

        Overrides {
            recursive,
            include: self.include.clone(),
            exclude: self.exclude.clone(),
            workers: self.workers,
            engine_threads: self.engine_threads,
            worker_mode: self.worker_mode,
            sample_rate: self.sample_rate,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Some(Command::Worker { verbose }) => worker_main(verbose),
        None => match run_main(cli) {
            Ok(code) => code,
            Err(e) => {
                error!("{:#}", e);
                exit_code_for(&e)
            }
        },
    }
}

fn run_main(cli: Cli) -> Result<ExitCode> {
    let verbosity = cli.verbose.min(MAX_VERBOSITY);

    let source = resolve_config_source(cli.config.as_deref());
    let toml = load_toml_config(&source);
    let level = toml
        .as_ref()
        .map(|t| t.logging.level.clone())
        .unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string());

    if let Err(e) = init_logging(verbosity, &level) {
        // No subscriber yet, stderr is all there is
        eprintln!("musfeat: {}", e);
        return Ok(ExitCode::from(EXIT_CONFIG));
    }

    info!("Starting musfeat v{}", VERSION);

    let toml = toml.map_err(PipelineError::from)?;
    let overrides = cli.overrides();
    let (features, output) = match (cli.features, cli.output) {
        (Some(features), Some(output)) => (features, output),
        _ => {
            return Err(PipelineError::Config(
                "both --features and --output are required".to_string(),
            )
            .into())
        }
    };

    let config = PipelineConfig::resolve(cli.inputs, features, output, overrides, &toml)?;
    let launcher = launcher_for(config.worker_mode, verbosity, cli.worker_program.as_deref())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let cancel = CancellationToken::new();
    let outcome = runtime.block_on(async {
        watch_shutdown_signals(cancel.clone());
        musfeat::run(&config, launcher, &cancel).await
    });
    // Blocking worker threads are not waited for after an interrupt
    runtime.shutdown_background();

    match outcome? {
        RunOutcome::Completed(summary) if summary.crashed_workers > 0 => {
            error!(
                "{} of {} workers crashed; their files are marked failed in {}",
                summary.crashed_workers,
                summary.workers,
                config.output.display()
            );
            Ok(ExitCode::from(EXIT_FAILURE))
        }
        RunOutcome::Completed(_) | RunOutcome::NoFilesFound => Ok(ExitCode::SUCCESS),
        RunOutcome::Interrupted => {
            warn!("Interrupted, no output written");
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Entry point of a worker process
fn worker_main(verbose: u8) -> ExitCode {
    if let Err(e) = init_logging(verbose.min(MAX_VERBOSITY), DEFAULT_LOG_LEVEL) {
        eprintln!("musfeat worker: {}", e);
    }

    let mut request = Vec::new();
    if let Err(e) = std::io::stdin().lock().read_to_end(&mut request) {
        error!("Failed to read worker request: {}", e);
        return ExitCode::from(EXIT_FAILURE);
    }

    let stdout = BufWriter::new(std::io::stdout().lock());
    match musfeat::workers::serve(request.as_slice(), stdout) {
        Ok(processed) => {
            debug!("Worker processed {} files", processed);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Worker failed: {}", e);
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

fn exit_code_for(error: &anyhow::Error) -> ExitCode {
    match error.downcast_ref::<PipelineError>() {
        Some(e) if e.is_config() => ExitCode::from(EXIT_CONFIG),
        _ => ExitCode::from(EXIT_FAILURE),
    }
}

/// Cancel the run on Ctrl+C or SIGTERM
///
/// Handlers are registered before this returns, so any signal received once
/// the run has started cancels it. Must be called inside the runtime.
fn watch_shutdown_signals(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        use signal::unix::{signal, SignalKind};

        let handlers = signal(SignalKind::interrupt())
            .and_then(|interrupt| Ok((interrupt, signal(SignalKind::terminate())?)));

        match handlers {
            Ok((mut interrupt, mut terminate)) => {
                tokio::spawn(async move {
                    tokio::select! {
                        _ = interrupt.recv() => {
                            info!("Received Ctrl+C, cancelling run");
                        },
                        _ = terminate.recv() => {
                            info!("Received terminate signal, cancelling run");
                        },
                    }
                    cancel.cancel();
                });
            }
            Err(e) => warn!("Failed to install signal handlers: {}", e),
        }
    }

    #[cfg(not(unix))]
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, cancelling run");
                cancel.cancel();
            }
            Err(e) => warn!("Failed to install Ctrl+C handler: {}", e),
        }
    });
}
