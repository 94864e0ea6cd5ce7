//! Out-of-process worker: one child process per shard
//!
//! The child is this same executable started with the hidden `worker`
//! subcommand. A crash, non-zero exit or unreadable answer of the child is a
//! crash of its shard; the parent and the other shards carry on.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::protocol::{WorkerRequest, WorkerResponse, WORKER_SUBCOMMAND};
use super::{WorkerConfig, WorkerLauncher};
use crate::error::{PipelineResult, WorkerError};
use crate::models::{FileOutcome, Shard};

/// Spawns `<program> worker` per shard
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    verbosity: u8,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            verbosity: 0,
        }
    }

    /// Launcher re-executing the running binary
    pub fn current_exe() -> PipelineResult<Self> {
        Ok(Self::new(std::env::current_exe()?))
    }

    /// Forward `-v` flags so worker logs match the parent's level
    pub fn verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg(WORKER_SUBCOMMAND);
        if self.verbosity > 0 {
            cmd.arg(format!("-{}", "v".repeat(self.verbosity as usize)));
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl WorkerLauncher for ProcessLauncher {
    fn name(&self) -> &'static str {
        "process"
    }

    async fn run_shard(
        &self,
        shard: Shard,
        config: Arc<WorkerConfig>,
    ) -> Result<Vec<FileOutcome>, WorkerError> {
        let index = shard.index;
        let expected = shard.len();

        let request = serde_json::to_vec(&WorkerRequest {
            shard,
            config: (*config).clone(),
        })
        .map_err(|e| WorkerError::Protocol {
            shard: index,
            reason: e.to_string(),
        })?;

        let mut child = self.command().spawn().map_err(|e| WorkerError::Spawn {
            shard: index,
            reason: format!("{}: {}", self.program.display(), e),
        })?;

        debug!(shard = index, pid = ?child.id(), files = expected, "Worker process started");

        let mut stdin = child.stdin.take().ok_or_else(|| WorkerError::Spawn {
            shard: index,
            reason: "worker stdin was not captured".to_string(),
        })?;
        // A write failure means the child is already gone
        stdin.write_all(&request).await.map_err(|e| WorkerError::Crashed {
            shard: index,
            reason: format!("failed to send request: {}", e),
        })?;
        drop(stdin);

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| WorkerError::Crashed {
                shard: index,
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(WorkerError::Crashed {
                shard: index,
                reason: format!("worker exited with {}", output.status),
            });
        }

        let response: WorkerResponse =
            serde_json::from_slice(&output.stdout).map_err(|e| WorkerError::Protocol {
                shard: index,
                reason: e.to_string(),
            })?;

        if response.shard_index != index {
            return Err(WorkerError::Protocol {
                shard: index,
                reason: format!("answer is for shard {}", response.shard_index),
            });
        }

        Ok(response.results)
    }
}
