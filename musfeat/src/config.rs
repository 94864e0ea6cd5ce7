//! Run configuration for musfeat
//!
//! Settings are resolved per field with priority command line → environment
//! → TOML file → built-in default. Command line and environment arrive
//! merged (clap reads the `MUSFEAT_*` variables), so this module only has to
//! layer them over the TOML file.

use musfeat_common::config::{resolve_worker_count, TomlConfig};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{debug, info};

use crate::error::{PipelineError, PipelineResult};
use crate::services::file_scanner::FileScanner;
use crate::services::LoaderOptions;

/// Default thread cap of the extraction engine inside one worker
///
/// Parallelism comes from the worker pool; each worker stays single
/// threaded unless asked otherwise.
pub const DEFAULT_ENGINE_THREADS: usize = 1;

/// How workers are isolated from the parent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum WorkerMode {
    /// One child process per shard
    #[default]
    Process,
    /// One thread per shard inside this process
    Thread,
}

impl fmt::Display for WorkerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerMode::Process => write!(f, "process"),
            WorkerMode::Thread => write!(f, "thread"),
        }
    }
}

impl FromStr for WorkerMode {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "process" => Ok(WorkerMode::Process),
            "thread" => Ok(WorkerMode::Thread),
            other => Err(PipelineError::Config(format!(
                "unknown worker mode {:?} (expected \"process\" or \"thread\")",
                other
            ))),
        }
    }
}

/// Values given on the command line or through the environment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub recursive: Option<bool>,
    pub include: Option<String>,
    pub exclude: Option<String>,
    pub workers: Option<usize>,
    pub engine_threads: Option<usize>,
    pub worker_mode: Option<WorkerMode>,
    pub sample_rate: Option<u32>,
}

/// Fully resolved configuration of one run
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Directories to search, in order
    pub roots: Vec<PathBuf>,
    /// File holding the `;`-separated feature description
    pub features_file: PathBuf,
    /// Where the result set is written
    pub output: PathBuf,
    pub recursive: bool,
    pub include: Option<String>,
    pub exclude: Option<String>,
    pub workers: usize,
    pub engine_threads: usize,
    pub worker_mode: WorkerMode,
    pub loader: LoaderOptions,
}

impl PipelineConfig {
    /// Configuration with built-in defaults for everything optional
    pub fn new(roots: Vec<PathBuf>, features_file: PathBuf, output: PathBuf) -> Self {
        Self {
            roots,
            features_file,
            output,
            recursive: true,
            include: None,
            exclude: None,
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            engine_threads: DEFAULT_ENGINE_THREADS,
            worker_mode: WorkerMode::default(),
            loader: LoaderOptions::default(),
        }
    }

    /// Layer command line/environment values over the TOML file
    pub fn resolve(
        roots: Vec<PathBuf>,
        features_file: PathBuf,
        output: PathBuf,
        overrides: Overrides,
        toml: &TomlConfig,
    ) -> PipelineResult<Self> {
        let mut config = Self::new(roots, features_file, output);

        config.recursive = overrides.recursive.or(toml.recursive).unwrap_or(true);
        config.include = overrides.include.or_else(|| toml.include.clone());
        config.exclude = overrides.exclude.or_else(|| toml.exclude.clone());
        config.workers = resolve_worker_count(overrides.workers, toml.workers)?;
        config.engine_threads = overrides
            .engine_threads
            .or(toml.engine_threads)
            .unwrap_or(DEFAULT_ENGINE_THREADS);
        config.worker_mode = match (overrides.worker_mode, toml.worker_mode.as_deref()) {
            (Some(mode), _) => mode,
            (None, Some(text)) => text.parse()?,
            (None, None) => WorkerMode::default(),
        };
        config.loader.target_sample_rate = overrides.sample_rate.or(toml.sample_rate);

        debug!(?config, "Configuration resolved");
        Ok(config)
    }

    /// Check everything that can be checked before discovery starts
    pub fn validate(&self) -> PipelineResult<()> {
        if self.roots.is_empty() {
            return Err(PipelineError::Config(
                "no input directory given".to_string(),
            ));
        }

        for root in &self.roots {
            FileScanner::validate_root(root)
                .map_err(|e| PipelineError::Config(format!("invalid input directory: {}", e)))?;
        }

        if self.workers == 0 {
            return Err(PipelineError::Config(
                "worker count must be at least 1".to_string(),
            ));
        }

        if self.engine_threads == 0 {
            return Err(PipelineError::Config(
                "engine thread count must be at least 1".to_string(),
            ));
        }

        if let (Some(include), Some(exclude)) = (&self.include, &self.exclude) {
            if include == exclude {
                return Err(PipelineError::Config(
                    "include and exclude pattern are equal, nothing would be processed"
                        .to_string(),
                ));
            }
        }

        if self.loader.target_sample_rate == Some(0) {
            return Err(PipelineError::Config(
                "target sample rate must be positive".to_string(),
            ));
        }

        info!(
            roots = self.roots.len(),
            workers = self.workers,
            engine_threads = self.engine_threads,
            mode = %self.worker_mode,
            recursive = self.recursive,
            "Configuration validated"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn base(dir: &TempDir) -> PipelineConfig {
        let mut config = PipelineConfig::new(
            vec![dir.path().to_path_buf()],
            dir.path().join("features.txt"),
            dir.path().join("out.json"),
        );
        config.workers = 2;
        config
    }

    #[test]
    fn test_cli_beats_toml() {
        let toml = TomlConfig {
            workers: Some(8),
            engine_threads: Some(4),
            worker_mode: Some("thread".to_string()),
            recursive: Some(false),
            include: Some(".*\\.wav".to_string()),
            ..Default::default()
        };
        let overrides = Overrides {
            workers: Some(3),
            worker_mode: Some(WorkerMode::Process),
            recursive: Some(true),
            ..Default::default()
        };

        let config = PipelineConfig::resolve(
            vec![PathBuf::from("/music")],
            PathBuf::from("f.txt"),
            PathBuf::from("o.json"),
            overrides,
            &toml,
        )
        .unwrap();

        assert_eq!(config.workers, 3);
        assert_eq!(config.engine_threads, 4);
        assert_eq!(config.worker_mode, WorkerMode::Process);
        assert!(config.recursive);
        assert_eq!(config.include.as_deref(), Some(".*\\.wav"));
    }

    #[test]
    fn test_defaults_without_toml() {
        let config = PipelineConfig::resolve(
            vec![PathBuf::from("/music")],
            PathBuf::from("f.txt"),
            PathBuf::from("o.json"),
            Overrides::default(),
            &TomlConfig::default(),
        )
        .unwrap();

        assert!(config.recursive);
        assert!(config.workers >= 1);
        assert_eq!(config.engine_threads, DEFAULT_ENGINE_THREADS);
        assert_eq!(config.worker_mode, WorkerMode::Process);
        assert_eq!(config.loader.target_sample_rate, None);
    }

    #[test]
    fn test_unknown_worker_mode_in_toml() {
        let toml = TomlConfig {
            worker_mode: Some("fiber".to_string()),
            ..Default::default()
        };
        let result = PipelineConfig::resolve(
            vec![],
            PathBuf::new(),
            PathBuf::new(),
            Overrides::default(),
            &toml,
        );
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let result = PipelineConfig::resolve(
            vec![],
            PathBuf::new(),
            PathBuf::new(),
            Overrides {
                workers: Some(0),
                ..Default::default()
            },
            &TomlConfig::default(),
        );
        assert!(result.unwrap_err().is_config());
    }

    #[test]
    fn test_validate_accepts_existing_root() {
        let dir = TempDir::new().unwrap();
        assert!(base(&dir).validate().is_ok());
    }

    #[test]
    fn test_validate_missing_root() {
        let dir = TempDir::new().unwrap();
        let mut config = base(&dir);
        config.roots.push(dir.path().join("missing"));
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_validate_identical_patterns() {
        let dir = TempDir::new().unwrap();
        let mut config = base(&dir);
        config.include = Some(".*".to_string());
        config.exclude = Some(".*".to_string());
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_validate_no_roots() {
        let dir = TempDir::new().unwrap();
        let mut config = base(&dir);
        config.roots.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_worker_mode_parsing() {
        assert_eq!("Thread".parse::<WorkerMode>().unwrap(), WorkerMode::Thread);
        assert_eq!(WorkerMode::Process.to_string(), "process");
        assert!("".parse::<WorkerMode>().is_err());
    }
}
