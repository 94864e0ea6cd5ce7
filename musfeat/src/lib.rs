//! musfeat library interface
//!
//! Parallel audio feature extraction: discover audio files under one or more
//! directories, split them across isolated workers, extract the requested
//! features from each file, and write one result set in discovery order.
//!
//! The binary is a thin shell around [`orchestrator::run`]; worker
//! processes enter through [`workers::serve`].

pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod workers;

pub use crate::config::{Overrides, PipelineConfig, WorkerMode};
pub use crate::error::{PipelineError, PipelineResult, WorkerError};
pub use crate::orchestrator::{run, RunOutcome};

use std::path::Path;
use std::sync::Arc;
use workers::{ProcessLauncher, ThreadLauncher, WorkerLauncher};

/// Launcher for the configured worker mode
///
/// Process workers run `worker_program`, or re-execute the current binary
/// when none is given; `verbosity` is forwarded to them.
pub fn launcher_for(
    mode: WorkerMode,
    verbosity: u8,
    worker_program: Option<&Path>,
) -> PipelineResult<Arc<dyn WorkerLauncher>> {
    Ok(match mode {
        WorkerMode::Process => {
            let launcher = match worker_program {
                Some(program) => ProcessLauncher::new(program),
                None => ProcessLauncher::current_exe()?,
            };
            Arc::new(launcher.verbosity(verbosity))
        }
        WorkerMode::Thread => Arc::new(ThreadLauncher),
    })
}
