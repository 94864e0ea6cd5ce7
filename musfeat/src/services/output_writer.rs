//! Result set persistence
//!
//! Writes one JSON document per run:
//!
//! ```json
//! {
//!   "generated_at": "2026-01-01T12:00:00Z",
//!   "features": ["rms", "mfcc"],
//!   "files": [
//!     { "path": "/music/a.wav", "status": "ok", "features": [...] },
//!     { "path": "/music/b.wav", "status": "failed", "stage": "decode", "error": "..." }
//!   ],
//!   "summary": { "total_files": 2, ... }
//! }
//! ```
//!
//! `files` is in discovery order. The file is replaced atomically.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::error::{PipelineError, PipelineResult};
use crate::models::{FeatureSpec, ResultEntry, ResultSet, RunSummary};

/// Serialized form of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputDocument {
    pub generated_at: DateTime<Utc>,
    pub features: Vec<String>,
    pub files: Vec<ResultEntry>,
    pub summary: RunSummary,
}

impl OutputDocument {
    pub fn new(features: &FeatureSpec, results: &ResultSet, summary: &RunSummary) -> Self {
        Self {
            generated_at: Utc::now(),
            features: features.features().to_vec(),
            files: results.entries().to_vec(),
            summary: summary.clone(),
        }
    }

    /// Pretty-printed JSON
    pub fn render(&self) -> PipelineResult<Vec<u8>> {
        let mut bytes = serde_json::to_vec_pretty(self)
            .map_err(|e| PipelineError::Output(format!("Failed to serialize results: {}", e)))?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}

/// Write the result set to `path`
pub fn write_results(
    path: &Path,
    features: &FeatureSpec,
    results: &ResultSet,
    summary: &RunSummary,
) -> PipelineResult<()> {
    let bytes = OutputDocument::new(features, results, summary).render()?;

    musfeat_common::fs::write_atomic(path, &bytes).map_err(|e| {
        PipelineError::Output(format!("Failed to write {}: {}", path.display(), e))
    })?;

    info!("Results written to {}", path.display());
    Ok(())
}
