//! In-process worker: one blocking thread per shard

use async_trait::async_trait;
use std::sync::Arc;

use super::{WorkerConfig, WorkerLauncher};
use crate::error::WorkerError;
use crate::models::{FileOutcome, Shard};
use crate::services::worker_pipeline::WorkerPipeline;

/// Runs each shard on tokio's blocking pool
///
/// A panic inside the pipeline surfaces as a join error and is reported as a
/// crash of that shard only.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadLauncher;

#[async_trait]
impl WorkerLauncher for ThreadLauncher {
    fn name(&self) -> &'static str {
        "thread"
    }

    async fn run_shard(
        &self,
        shard: Shard,
        config: Arc<WorkerConfig>,
    ) -> Result<Vec<FileOutcome>, WorkerError> {
        let index = shard.index;

        tokio::task::spawn_blocking(move || -> Result<Vec<FileOutcome>, WorkerError> {
            let pipeline = WorkerPipeline::new(&config).map_err(|e| WorkerError::Spawn {
                shard: index,
                reason: e.to_string(),
            })?;
            Ok(pipeline.run(&shard))
        })
        .await
        .map_err(|e| WorkerError::Crashed {
            shard: index,
            reason: format!("Task join error: {}", e),
        })?
    }
}
