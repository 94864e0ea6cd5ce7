//! Work partitions

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One file of a shard, tagged with its discovery position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardEntry {
    /// Index of the file in the full discovery order
    pub position: usize,
    /// Absolute path of the file, sent to workers byte for byte
    #[serde(with = "super::serde_path::raw")]
    pub path: PathBuf,
}

/// Disjoint subset of the discovered files assigned to one worker
///
/// May be empty when there are more workers than files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shard {
    /// Worker slot this shard belongs to
    pub index: usize,
    /// Files in processing order
    pub entries: Vec<ShardEntry>,
}

impl Shard {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Paths in processing order
    pub fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.entries.iter().map(|e| &e.path)
    }
}
