//! Unit of work executed by one worker
//!
//! Loads and decodes every file of a shard, then extracts its features.
//! Failures stay attached to the file they happened on; the output always
//! has one entry per shard entry, in shard order.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, warn};

use super::audio_loader::{AudioLoader, LoaderOptions};
use super::feature_extractor::FeatureExtractor;
use crate::error::PipelineResult;
use crate::models::{FailureStage, FeatureSpec, FileFailure, FileOutcome, Shard};

/// Everything a worker needs, passed explicitly to its entry point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Features to compute, shared read-only by all workers
    pub features: FeatureSpec,
    /// Decoder settings
    pub loader: LoaderOptions,
    /// Internal thread cap of the extraction engine
    pub engine_threads: usize,
}

impl WorkerConfig {
    pub fn new(features: FeatureSpec) -> Self {
        Self {
            features,
            loader: LoaderOptions::default(),
            engine_threads: 1,
        }
    }
}

/// Loader + extractor composition owned by one worker
#[derive(Debug)]
pub struct WorkerPipeline {
    loader: AudioLoader,
    extractor: FeatureExtractor,
}

impl WorkerPipeline {
    pub fn new(config: &WorkerConfig) -> PipelineResult<Self> {
        Ok(Self {
            loader: AudioLoader::new(config.loader.clone()),
            extractor: FeatureExtractor::new(&config.features, config.engine_threads)?,
        })
    }

    /// Process a shard to completion
    pub fn run(&self, shard: &Shard) -> Vec<FileOutcome> {
        if shard.is_empty() {
            debug!(shard = shard.index, "Empty shard, nothing to do");
            return Vec::new();
        }

        let start = Instant::now();
        debug!(shard = shard.index, files = shard.len(), "Reading the files...");

        let outcomes: Vec<FileOutcome> = self
            .loader
            .load_batch(shard.paths().map(PathBuf::as_path))
            .map(|(path, loaded)| match loaded {
                Ok(buffer) => self.extract(path, &buffer),
                Err(e) => {
                    warn!(path = %path.display(), "Decoding failed: {}", e);
                    FileOutcome::Failed(FileFailure::new(FailureStage::Decode, e.to_string()))
                }
            })
            .collect();

        let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
        debug!(
            shard = shard.index,
            succeeded,
            failed = outcomes.len() - succeeded,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Shard complete"
        );

        outcomes
    }

    /// Load and extract a single file
    pub fn process_file(&self, path: &Path) -> FileOutcome {
        match self.loader.load(path) {
            Ok(buffer) => self.extract(path, &buffer),
            Err(e) => FileOutcome::Failed(FileFailure::new(FailureStage::Decode, e.to_string())),
        }
    }

    fn extract(&self, path: &Path, buffer: &crate::models::RawBuffer) -> FileOutcome {
        match self.extractor.extract(buffer) {
            Ok(vector) => FileOutcome::Extracted(vector),
            Err(e) => {
                warn!(path = %path.display(), "Extraction failed: {}", e);
                FileOutcome::Failed(FileFailure::new(FailureStage::Extract, e.to_string()))
            }
        }
    }
}
