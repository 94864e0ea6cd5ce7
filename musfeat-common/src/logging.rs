//! Logging initialisation
//!
//! All output goes to stderr so worker processes can keep stdout for
//! their result stream.

use crate::{Error, Result};
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Highest meaningful `-v` count
pub const MAX_VERBOSITY: u8 = 4;

/// Map a `-v` count to a tracing level
///
/// 0 → warn, 1 → info, 2 → debug, 3 and above → trace.
pub fn level_for_verbosity(verbosity: u8) -> Level {
    match verbosity.min(MAX_VERBOSITY) {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Pick the filter directive for this process
///
/// A non-zero verbosity wins over the configured level name.
pub fn filter_directive(verbosity: u8, configured_level: &str) -> Result<String> {
    if verbosity > 0 {
        return Ok(level_for_verbosity(verbosity).to_string().to_lowercase());
    }

    let level = Level::from_str(configured_level.trim()).map_err(|_| {
        Error::Config(format!("Unknown log level: {}", configured_level))
    })?;
    Ok(level.to_string().to_lowercase())
}

/// Install the global tracing subscriber
///
/// `RUST_LOG` takes precedence over both verbosity and the configured level.
pub fn init_logging(verbosity: u8, configured_level: &str) -> Result<()> {
    let directive = filter_directive(verbosity, configured_level)?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init()
        .map_err(|e| Error::Internal(format!("Failed to install logger: {}", e)))
}
