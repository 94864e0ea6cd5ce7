//! Test Helper Utilities
//!
//! Shared utilities for testing musfeat

pub mod audio_generator;

pub use audio_generator::{
    generate_corrupt_file, generate_test_library, generate_test_wav, write_features, AudioConfig,
};
