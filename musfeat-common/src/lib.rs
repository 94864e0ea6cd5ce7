//! # musfeat common library
//!
//! Shared code for the musfeat crates:
//! - Error type used across crates
//! - TOML configuration loading and resolution
//! - Logging initialisation
//! - Atomic file writes

pub mod config;
pub mod error;
pub mod fs;
pub mod logging;

pub use error::{Error, Result};
