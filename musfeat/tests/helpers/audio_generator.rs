//! Audio Test Fixture Generator
//!
//! Utilities for generating small test audio files and music trees

use std::path::{Path, PathBuf};

/// Configuration for generated audio
#[derive(Debug, Clone)]
pub struct AudioConfig {
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub frequency: f32,
    pub amplitude: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            duration_seconds: 0.5,
            sample_rate: 8000,
            channels: 1,
            frequency: 440.0,
            amplitude: 0.3,
        }
    }
}

/// Generate a sine tone WAV file
pub fn generate_test_wav(path: &Path, config: &AudioConfig) -> anyhow::Result<PathBuf> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let spec = hound::WavSpec {
        channels: config.channels,
        sample_rate: config.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)?;
    let total_samples = (config.duration_seconds * config.sample_rate as f64) as usize;

    for i in 0..total_samples {
        let t = i as f32 / config.sample_rate as f32;
        let sample = (config.amplitude
            * (2.0 * std::f32::consts::PI * config.frequency * t).sin()
            * i16::MAX as f32) as i16;

        for _ in 0..config.channels {
            writer.write_sample(sample)?;
        }
    }

    writer.finalize()?;
    Ok(path.to_path_buf())
}

/// Write a file with an audio extension but undecodable content
pub fn generate_corrupt_file(path: &Path) -> anyhow::Result<PathBuf> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, b"this is definitely not audio data")?;
    Ok(path.to_path_buf())
}

/// Generate `count` tones in `dir`, each at a different frequency
///
/// Files are named `track_001.wav`, `track_002.wav`, ... so discovery order
/// equals generation order.
pub fn generate_test_library(dir: &Path, count: usize) -> anyhow::Result<Vec<PathBuf>> {
    (0..count)
        .map(|i| {
            let config = AudioConfig {
                frequency: 220.0 + 110.0 * i as f32,
                ..Default::default()
            };
            generate_test_wav(&dir.join(format!("track_{:03}.wav", i + 1)), &config)
        })
        .collect()
}

/// Write a feature description file
pub fn write_features(dir: &Path, description: &str) -> anyhow::Result<PathBuf> {
    let path = dir.join("features.txt");
    std::fs::write(&path, description)?;
    Ok(path)
}
