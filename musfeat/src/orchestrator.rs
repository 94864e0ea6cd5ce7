//! Run orchestration
//!
//! Drives one run end to end:
//!
//! 1. Validate configuration, compile the path filter, load and check the
//!    feature description. Any problem here aborts before discovery.
//! 2. Discover files under every root.
//! 3. Partition into shards and dispatch them to workers.
//! 4. Aggregate shard outputs back into discovery order.
//! 5. Write the result set and log a summary.
//!
//! Cancellation is honoured during discovery and dispatch; a cancelled run
//! writes nothing.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::error::PipelineResult;
use crate::models::{FeatureSpec, RunSummary};
use crate::services::{
    aggregate, partition, write_results, DispatchOutcome, Dispatcher, FeatureExtractor,
    FileScanner, PathFilter,
};
use crate::workers::{WorkerConfig, WorkerLauncher};

/// How a run ended, when it did not fail
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Result set written
    Completed(RunSummary),
    /// Discovery found nothing; no output was written
    NoFilesFound,
    /// Cancelled by the user; no output was written
    Interrupted,
}

/// Execute a full run
pub async fn run(
    config: &PipelineConfig,
    launcher: Arc<dyn WorkerLauncher>,
    cancel: &CancellationToken,
) -> PipelineResult<RunOutcome> {
    let start = Instant::now();

    config.validate()?;
    let filter = PathFilter::new(config.include.as_deref(), config.exclude.as_deref())?;
    let features = FeatureSpec::from_file(&config.features_file)?;
    FeatureExtractor::validate(&features)?;
    info!("Extracting {} features: {}", features.len(), features.features().join(";"));

    let roots = absolute_roots(&config.roots)?;
    let scanner = FileScanner::new(filter).recursive(config.recursive);

    let mut discovery = scanner.discover(&roots).cancel_on(cancel.clone());
    let files: Vec<PathBuf> = discovery.by_ref().collect();
    if discovery.interrupted() {
        info!(files_found = files.len(), "Run cancelled during discovery");
        return Ok(RunOutcome::Interrupted);
    }
    let skipped_entries = discovery.skipped();

    if files.is_empty() {
        warn!("No files found to process");
        return Ok(RunOutcome::NoFilesFound);
    }
    info!(
        files = files.len(),
        skipped = skipped_entries,
        "Discovery complete in {:.2}s",
        start.elapsed().as_secs_f64()
    );

    let shards = partition(&files, config.workers);
    debug!(
        shard_sizes = ?shards.iter().map(|s| s.len()).collect::<Vec<_>>(),
        "Files partitioned"
    );

    let worker_config = Arc::new(WorkerConfig {
        features: features.clone(),
        loader: config.loader.clone(),
        engine_threads: config.engine_threads,
    });

    let report = match Dispatcher::new(launcher)
        .dispatch(&shards, worker_config, cancel)
        .await
    {
        DispatchOutcome::Completed(report) => report,
        DispatchOutcome::Cancelled => return Ok(RunOutcome::Interrupted),
    };
    let crashed_workers = report.crashed_shards.len();

    let results = aggregate(&files, report.outputs, &shards)?;

    let summary = RunSummary {
        total_files: results.len(),
        succeeded: results.succeeded(),
        failed: results.failed(),
        workers: shards.len(),
        crashed_workers,
        skipped_entries,
        elapsed_seconds: start.elapsed().as_secs_f64(),
    };

    write_results(&config.output, &features, &results, &summary)?;

    info!(
        "Run completed in {:.2}s | Total: {} | Success: {} | Failed: {} | Crashed workers: {} | Rate: {:.1} files/sec",
        summary.elapsed_seconds,
        summary.total_files,
        summary.succeeded,
        summary.failed,
        summary.crashed_workers,
        summary.files_per_second()
    );

    Ok(RunOutcome::Completed(summary))
}

/// Resolve relative roots against the working directory
///
/// Symbolic links are kept as given so reported paths stay under the root
/// the user named.
fn absolute_roots(roots: &[PathBuf]) -> PipelineResult<Vec<PathBuf>> {
    let cwd = std::env::current_dir()?;
    Ok(roots
        .iter()
        .map(|root| {
            if root.is_absolute() {
                root.clone()
            } else {
                cwd.join(root)
            }
        })
        .collect())
}
