//! Worker launchers
//!
//! A launcher runs one shard to completion in an isolated execution unit
//! and hands back one outcome per shard entry. Two implementations exist:
//!
//! - [`ProcessLauncher`]: one child process per shard, talking JSON over
//!   stdin/stdout (see [`protocol`])
//! - [`ThreadLauncher`]: one blocking thread per shard inside this process
//!
//! The dispatcher treats both the same way; a launcher error means the
//! whole shard crashed.

pub mod process;
pub mod protocol;
pub mod thread;

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::WorkerError;
use crate::models::{FileOutcome, Shard};

pub use crate::services::worker_pipeline::WorkerConfig;
pub use process::ProcessLauncher;
pub use protocol::{serve, WorkerRequest, WorkerResponse};
pub use thread::ThreadLauncher;

/// Runs shards in isolated workers
#[async_trait]
pub trait WorkerLauncher: Send + Sync {
    /// Launcher name for logs
    fn name(&self) -> &'static str;

    /// Run `shard` to completion
    ///
    /// On success the returned outcomes are index-aligned with
    /// `shard.entries`.
    async fn run_shard(
        &self,
        shard: Shard,
        config: Arc<WorkerConfig>,
    ) -> Result<Vec<FileOutcome>, WorkerError>;
}
