//! Parent/worker wire format
//!
//! The parent writes one [`WorkerRequest`] as JSON to the worker's stdin and
//! closes it. The worker answers with one [`WorkerResponse`] as JSON on
//! stdout and exits 0. Logs go to stderr so they never mix with the
//! response.

use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use tracing::debug;

use crate::error::PipelineResult;
use crate::models::{FileOutcome, Shard};
use crate::services::worker_pipeline::{WorkerConfig, WorkerPipeline};

/// Name of the hidden CLI subcommand running a worker
pub const WORKER_SUBCOMMAND: &str = "worker";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub shard: Shard,
    pub config: WorkerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerResponse {
    pub shard_index: usize,
    pub results: Vec<FileOutcome>,
}

/// Worker entry point: read a request, process it, write the response
///
/// Returns the number of files processed.
pub fn serve<R: Read, W: Write>(input: R, mut output: W) -> PipelineResult<usize> {
    let request: WorkerRequest =
        serde_json::from_reader(input).map_err(std::io::Error::from)?;

    debug!(
        shard = request.shard.index,
        files = request.shard.len(),
        "Worker received shard"
    );

    let pipeline = WorkerPipeline::new(&request.config)?;
    let results = pipeline.run(&request.shard);
    let processed = results.len();

    let response = WorkerResponse {
        shard_index: request.shard.index,
        results,
    };
    serde_json::to_writer(&mut output, &response).map_err(std::io::Error::from)?;
    output.flush()?;

    Ok(processed)
}
