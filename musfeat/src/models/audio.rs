//! Decoded audio

/// Decoded sample data for one file
///
/// Owned by the worker that decoded it and dropped once its features
/// have been computed.
#[derive(Debug, Clone)]
pub struct RawBuffer {
    /// Mono samples (f32, range [-1.0, 1.0])
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Channel count of the source before downmixing
    pub channels: usize,
}

impl RawBuffer {
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
