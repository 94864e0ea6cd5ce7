//! Shard partitioning and concurrent worker dispatch
//!
//! Files are dealt round-robin over the workers so that every shard gets a
//! similar mix of the directory tree. All shards run concurrently; the
//! dispatcher waits for every one of them, or for cancellation.

use futures::future::join_all;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::models::{FailureStage, FileFailure, FileOutcome, Shard, ShardEntry};
use crate::workers::{WorkerConfig, WorkerLauncher};

/// Split `files` into `worker_count` shards, round-robin
///
/// Shard `k` receives the files at positions `k, k + n, k + 2n, ...`. The
/// shards are disjoint, together cover every file, and may be empty when
/// there are more workers than files. A worker count of 0 is treated as 1.
pub fn partition(files: &[PathBuf], worker_count: usize) -> Vec<Shard> {
    let worker_count = worker_count.max(1);
    let mut shards: Vec<Shard> = (0..worker_count).map(Shard::new).collect();

    for (position, path) in files.iter().enumerate() {
        shards[position % worker_count].entries.push(ShardEntry {
            position,
            path: path.clone(),
        });
    }

    shards
}

/// Raw per-shard outputs of a finished dispatch
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// One output list per shard, in shard order, each aligned with its shard
    pub outputs: Vec<Vec<FileOutcome>>,
    /// Indices of shards whose worker crashed
    pub crashed_shards: Vec<usize>,
}

#[derive(Debug)]
pub enum DispatchOutcome {
    Completed(DispatchReport),
    /// Cancelled before every worker finished; partial outputs are dropped
    Cancelled,
}

/// Runs shards through a [`WorkerLauncher`]
pub struct Dispatcher {
    launcher: Arc<dyn WorkerLauncher>,
}

impl Dispatcher {
    pub fn new(launcher: Arc<dyn WorkerLauncher>) -> Self {
        Self { launcher }
    }

    /// Run every shard concurrently and wait for all of them
    ///
    /// Worker crashes do not abort the run: every file of a crashed shard is
    /// reported as failed at the worker stage. Empty shards are not launched.
    pub async fn dispatch(
        &self,
        shards: &[Shard],
        config: Arc<WorkerConfig>,
        cancel: &CancellationToken,
    ) -> DispatchOutcome {
        let start = Instant::now();
        let launched = shards.iter().filter(|s| !s.is_empty()).count();
        info!(
            "Starting {} workers ({} mode) for {} shards",
            launched,
            self.launcher.name(),
            shards.len()
        );

        let handles: Vec<_> = shards
            .iter()
            .filter(|shard| !shard.is_empty())
            .map(|shard| {
                let launcher = Arc::clone(&self.launcher);
                let shard = shard.clone();
                let config = Arc::clone(&config);
                tokio::spawn(async move { launcher.run_shard(shard, config).await })
            })
            .collect();
        let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();

        let joined = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("Dispatch cancelled, stopping {} workers", aborts.len());
                for abort in &aborts {
                    abort.abort();
                }
                return DispatchOutcome::Cancelled;
            }
            joined = join_all(handles) => joined,
        };

        let mut joined = joined.into_iter();
        let mut report = DispatchReport::default();

        for shard in shards {
            if shard.is_empty() {
                report.outputs.push(Vec::new());
                continue;
            }

            let result = match joined.next() {
                Some(Ok(Ok(outcomes))) if outcomes.len() == shard.len() => Ok(outcomes),
                Some(Ok(Ok(outcomes))) => Err(format!(
                    "worker returned {} results for {} files",
                    outcomes.len(),
                    shard.len()
                )),
                Some(Ok(Err(e))) => Err(e.to_string()),
                Some(Err(e)) => Err(format!("worker task failed: {}", e)),
                None => Err("worker result missing".to_string()),
            };

            match result {
                Ok(outcomes) => {
                    debug!(shard = shard.index, files = outcomes.len(), "Worker finished");
                    report.outputs.push(outcomes);
                }
                Err(reason) => {
                    error!(
                        shard = shard.index,
                        files = shard.len(),
                        "Worker crashed, marking its files as failed: {}",
                        reason
                    );
                    report.outputs.push(crashed_outcomes(shard, &reason));
                    report.crashed_shards.push(shard.index);
                }
            }
        }

        info!(
            "All workers finished in {:.2}s ({} crashed)",
            start.elapsed().as_secs_f64(),
            report.crashed_shards.len()
        );

        DispatchOutcome::Completed(report)
    }
}

fn crashed_outcomes(shard: &Shard, reason: &str) -> Vec<FileOutcome> {
    shard
        .entries
        .iter()
        .map(|_| {
            FileOutcome::Failed(FileFailure::new(
                FailureStage::Worker,
                format!("worker crashed: {}", reason),
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WorkerError;
    use crate::models::{FeatureSpec, FeatureVector};
    use async_trait::async_trait;
    use std::collections::HashSet;

    fn files(n: usize) -> Vec<PathBuf> {
        (0..n).map(|i| PathBuf::from(format!("/music/{:02}.wav", i))).collect()
    }

    fn config() -> Arc<WorkerConfig> {
        Arc::new(WorkerConfig::new(FeatureSpec::parse("rms").unwrap()))
    }

    #[test]
    fn test_partition_round_robin() {
        let shards = partition(&files(7), 3);
        let positions: Vec<Vec<usize>> = shards
            .iter()
            .map(|s| s.entries.iter().map(|e| e.position).collect())
            .collect();
        assert_eq!(positions, vec![vec![0, 3, 6], vec![1, 4], vec![2, 5]]);
        assert_eq!(shards[1].entries[1].path, PathBuf::from("/music/04.wav"));
    }

    #[test]
    fn test_partition_is_complete_and_disjoint() {
        let input = files(23);
        let shards = partition(&input, 4);
        let mut seen = HashSet::new();
        for shard in &shards {
            for entry in &shard.entries {
                assert!(seen.insert(entry.position));
                assert_eq!(entry.path, input[entry.position]);
            }
        }
        assert_eq!(seen.len(), input.len());
    }

    #[test]
    fn test_partition_more_workers_than_files() {
        let shards = partition(&files(2), 5);
        assert_eq!(shards.len(), 5);
        let sizes: Vec<usize> = shards.iter().map(Shard::len).collect();
        assert_eq!(sizes, vec![1, 1, 0, 0, 0]);
    }

    #[test]
    fn test_partition_zero_workers_means_one() {
        let shards = partition(&files(3), 0);
        assert_eq!(shards.len(), 1);
        assert_eq!(shards[0].len(), 3);
    }

    /// Succeeds on every file, except for shards listed in `crash`
    struct ScriptedLauncher {
        crash: Vec<usize>,
        short_answer: Vec<usize>,
    }

    #[async_trait]
    impl WorkerLauncher for ScriptedLauncher {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn run_shard(
            &self,
            shard: Shard,
            _config: Arc<WorkerConfig>,
        ) -> Result<Vec<FileOutcome>, WorkerError> {
            if self.crash.contains(&shard.index) {
                return Err(WorkerError::Crashed {
                    shard: shard.index,
                    reason: "boom".to_string(),
                });
            }
            let mut outcomes: Vec<FileOutcome> = shard
                .entries
                .iter()
                .map(|_| FileOutcome::Extracted(FeatureVector::default()))
                .collect();
            if self.short_answer.contains(&shard.index) {
                outcomes.pop();
            }
            Ok(outcomes)
        }
    }

    #[tokio::test]
    async fn test_dispatch_collects_every_shard_in_order() {
        let shards = partition(&files(5), 3);
        let dispatcher = Dispatcher::new(Arc::new(ScriptedLauncher {
            crash: vec![],
            short_answer: vec![],
        }));

        match dispatcher.dispatch(&shards, config(), &CancellationToken::new()).await {
            DispatchOutcome::Completed(report) => {
                let sizes: Vec<usize> = report.outputs.iter().map(Vec::len).collect();
                assert_eq!(sizes, vec![2, 2, 1]);
                assert!(report.crashed_shards.is_empty());
            }
            DispatchOutcome::Cancelled => panic!("Dispatch should not be cancelled"),
        }
    }

    #[tokio::test]
    async fn test_crashed_shard_is_marked_failed_others_survive() {
        let shards = partition(&files(6), 3);
        let dispatcher = Dispatcher::new(Arc::new(ScriptedLauncher {
            crash: vec![1],
            short_answer: vec![2],
        }));

        let report = match dispatcher.dispatch(&shards, config(), &CancellationToken::new()).await {
            DispatchOutcome::Completed(report) => report,
            DispatchOutcome::Cancelled => panic!("Dispatch should not be cancelled"),
        };

        assert_eq!(report.crashed_shards, vec![1, 2]);
        assert!(report.outputs[0].iter().all(FileOutcome::is_success));
        for crashed in [1, 2] {
            assert_eq!(report.outputs[crashed].len(), 2);
            assert!(report.outputs[crashed]
                .iter()
                .all(|o| o.failure().map(|f| f.stage) == Some(FailureStage::Worker)));
        }
    }

    #[tokio::test]
    async fn test_empty_shards_are_not_launched() {
        let shards = partition(&files(1), 3);
        // Launching an empty shard would crash here
        let dispatcher = Dispatcher::new(Arc::new(ScriptedLauncher {
            crash: vec![1, 2],
            short_answer: vec![],
        }));

        match dispatcher.dispatch(&shards, config(), &CancellationToken::new()).await {
            DispatchOutcome::Completed(report) => {
                assert!(report.crashed_shards.is_empty());
                assert_eq!(report.outputs[0].len(), 1);
                assert!(report.outputs[1].is_empty());
                assert!(report.outputs[2].is_empty());
            }
            DispatchOutcome::Cancelled => panic!("Dispatch should not be cancelled"),
        }
    }

    #[tokio::test]
    async fn test_cancelled_dispatch() {
        let shards = partition(&files(3), 2);
        let dispatcher = Dispatcher::new(Arc::new(ScriptedLauncher {
            crash: vec![],
            short_answer: vec![],
        }));
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(matches!(
            dispatcher.dispatch(&shards, config(), &cancel).await,
            DispatchOutcome::Cancelled
        ));
    }
}
