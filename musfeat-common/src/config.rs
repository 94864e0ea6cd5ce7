//! Configuration loading and resolution
//!
//! Settings are resolved in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! Command-line and environment handling for most settings lives in the
//! binary (clap `env` fallbacks). This module owns the TOML layer and the
//! pieces of resolution shared between crates.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "MUSFEAT_CONFIG";

/// Default log level when neither `-v` nor TOML selects one
pub const DEFAULT_LOG_LEVEL: &str = "warn";

/// Logging section of the TOML config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level name understood by tracing (error, warn, info, debug, trace)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

/// TOML configuration file contents
///
/// Every field is optional; absent fields fall through to compiled defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Number of worker processes
    pub workers: Option<usize>,
    /// Internal threads of the extraction engine per worker
    pub engine_threads: Option<usize>,
    /// Worker execution mode ("process" or "thread")
    pub worker_mode: Option<String>,
    /// Resample decoded audio to this rate before extraction
    pub sample_rate: Option<u32>,
    /// Recurse into subdirectories of each root
    pub recursive: Option<bool>,
    /// Include pattern for relative paths
    pub include: Option<String>,
    /// Exclude pattern for relative paths
    pub exclude: Option<String>,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Where the effective config file came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Named on the command line; must exist
    CommandLine(PathBuf),
    /// Named by `MUSFEAT_CONFIG`; must exist
    Environment(PathBuf),
    /// Platform default location; may be absent
    Default(PathBuf),
    /// No config directory on this platform
    None,
}

impl ConfigSource {
    /// Path of the config file, if any
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigSource::CommandLine(p) | ConfigSource::Environment(p) | ConfigSource::Default(p) => {
                Some(p.as_path())
            }
            ConfigSource::None => None,
        }
    }

    /// Whether a missing file at this location is an error
    pub fn is_explicit(&self) -> bool {
        matches!(self, ConfigSource::CommandLine(_) | ConfigSource::Environment(_))
    }
}

/// Resolve which config file to read
///
/// Priority: command-line path → `MUSFEAT_CONFIG` → `<config_dir>/musfeat/config.toml`
pub fn resolve_config_source(cli_path: Option<&Path>) -> ConfigSource {
    if let Some(path) = cli_path {
        return ConfigSource::CommandLine(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return ConfigSource::Environment(PathBuf::from(path));
        }
    }

    match default_config_path() {
        Some(path) => ConfigSource::Default(path),
        None => ConfigSource::None,
    }
}

/// Platform default config file location
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("musfeat").join("config.toml"))
}

/// Load the TOML config from the resolved source
///
/// A missing default file yields defaults. A missing explicit file, or any
/// file that fails to parse, is a configuration error.
pub fn load_toml_config(source: &ConfigSource) -> Result<TomlConfig> {
    let Some(path) = source.path() else {
        debug!("No config directory available, using defaults");
        return Ok(TomlConfig::default());
    };

    if !path.exists() {
        if source.is_explicit() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        debug!("Config file {} not present, using defaults", path.display());
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config = parse_toml_config(&content)
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;

    debug!("Loaded config from {}", path.display());
    Ok(config)
}

/// Parse TOML text into a config
pub fn parse_toml_config(content: &str) -> Result<TomlConfig> {
    toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
}

/// Resolve the worker count
///
/// Priority: command line / environment → TOML → available parallelism → 1.
/// Zero from any explicit source is rejected.
pub fn resolve_worker_count(cli: Option<usize>, toml: Option<usize>) -> Result<usize> {
    match cli.or(toml) {
        Some(0) => Err(Error::InvalidInput(
            "worker count must be at least 1".to_string(),
        )),
        Some(n) => Ok(n),
        None => Ok(std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)),
    }
}
