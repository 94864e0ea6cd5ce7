//! Per-file results and the ordered result set

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Values of one feature identifier for one file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureValue {
    /// Feature identifier as written in the feature description
    pub name: String,
    /// Computed values (one for scalar features, several for vectors)
    pub values: Vec<f64>,
}

/// Feature vector of one file, in feature-description order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub features: Vec<FeatureValue>,
}

impl FeatureVector {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// First entry with the given name
    pub fn get(&self, name: &str) -> Option<&FeatureValue> {
        self.features.iter().find(|f| f.name == name)
    }
}

/// Pipeline stage a file failed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    /// File could not be read or decoded
    Decode,
    /// Decoded audio could not be turned into features
    Extract,
    /// The worker owning the file died
    Worker,
}

/// Explicit failure marker for one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFailure {
    pub stage: FailureStage,
    pub error: String,
}

impl FileFailure {
    pub fn new(stage: FailureStage, error: impl Into<String>) -> Self {
        Self {
            stage,
            error: error.into(),
        }
    }
}

/// Outcome for one file: a feature vector or a failure marker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileOutcome {
    #[serde(rename = "ok")]
    Extracted(FeatureVector),
    Failed(FileFailure),
}

impl FileOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, FileOutcome::Extracted(_))
    }

    pub fn features(&self) -> Option<&FeatureVector> {
        match self {
            FileOutcome::Extracted(v) => Some(v),
            FileOutcome::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&FileFailure> {
        match self {
            FileOutcome::Extracted(_) => None,
            FileOutcome::Failed(f) => Some(f),
        }
    }
}

/// One row of the result set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEntry {
    /// Written as text; undecodable bytes become U+FFFD
    #[serde(with = "super::serde_path::lossy")]
    pub path: PathBuf,
    #[serde(flatten)]
    pub outcome: FileOutcome,
}

/// Results of a run, index-aligned with the discovery order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    entries: Vec<ResultEntry>,
}

impl ResultSet {
    /// Build from entries already in discovery order
    pub fn from_entries(entries: Vec<ResultEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[ResultEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Paths in discovery order
    pub fn paths(&self) -> Vec<&Path> {
        self.entries.iter().map(|e| e.path.as_path()).collect()
    }

    pub fn succeeded(&self) -> usize {
        self.entries.iter().filter(|e| e.outcome.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.len() - self.succeeded()
    }
}

/// Statistics of a completed run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total_files: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub workers: usize,
    /// Workers whose whole shard was marked failed
    pub crashed_workers: usize,
    /// Directory entries skipped during discovery
    pub skipped_entries: usize,
    pub elapsed_seconds: f64,
}

impl RunSummary {
    pub fn files_per_second(&self) -> f64 {
        if self.elapsed_seconds <= 0.0 {
            return 0.0;
        }
        self.total_files as f64 / self.elapsed_seconds
    }
}
