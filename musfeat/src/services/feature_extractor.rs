//! Feature extraction engine
//!
//! Turns a decoded [`RawBuffer`] into the feature vector named by a
//! [`FeatureSpec`]. Time-domain features are computed directly on the
//! samples. Spectral features share one short-time Fourier transform whose
//! frames are processed on a private rayon pool; the pool size is the
//! engine-thread cap, normally 1 so that parallelism comes from workers
//! rather than from nested thread pools.
//!
//! Features extracted:
//! - `rms`: RMS energy
//! - `peak`: maximum absolute sample
//! - `zcr`: zero-crossing rate, normalised to [0, 1]
//! - `energy_variance`: variance of 100 ms frame RMS
//! - `duration`: length in seconds
//! - `centroid`: mean spectral centroid (Hz)
//! - `rolloff`: mean 85% spectral roll-off (Hz)
//! - `flatness`: mean spectral flatness
//! - `mfcc`: 13 mean mel-frequency cepstral coefficients

use rayon::prelude::*;
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;
use thiserror::Error;

use crate::error::{PipelineError, PipelineResult};
use crate::models::{FeatureSpec, FeatureValue, FeatureVector, RawBuffer};

/// STFT frame length in samples
pub const FRAME_SIZE: usize = 2048;
/// STFT hop in samples
pub const HOP_SIZE: usize = 512;
/// Mel bands feeding the cepstrum
pub const MEL_BANDS: usize = 40;
/// Cepstral coefficients kept
pub const MFCC_COEFFS: usize = 13;
/// Fraction of spectral magnitude below the roll-off frequency
pub const ROLLOFF_FRACTION: f64 = 0.85;

const EPSILON: f64 = 1e-10;

/// Per-file extraction errors
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("empty sample buffer")]
    EmptyBuffer,

    #[error("invalid sample rate: {0}")]
    InvalidSampleRate(u32),

    #[error("feature {0} produced a non-finite value")]
    NonFinite(String),
}

/// Features known to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureKind {
    Rms,
    Peak,
    Zcr,
    EnergyVariance,
    Duration,
    Centroid,
    Rolloff,
    Flatness,
    Mfcc,
}

impl FeatureKind {
    pub const ALL: [FeatureKind; 9] = [
        FeatureKind::Rms,
        FeatureKind::Peak,
        FeatureKind::Zcr,
        FeatureKind::EnergyVariance,
        FeatureKind::Duration,
        FeatureKind::Centroid,
        FeatureKind::Rolloff,
        FeatureKind::Flatness,
        FeatureKind::Mfcc,
    ];

    /// Identifier used in feature descriptions
    pub fn id(self) -> &'static str {
        match self {
            FeatureKind::Rms => "rms",
            FeatureKind::Peak => "peak",
            FeatureKind::Zcr => "zcr",
            FeatureKind::EnergyVariance => "energy_variance",
            FeatureKind::Duration => "duration",
            FeatureKind::Centroid => "centroid",
            FeatureKind::Rolloff => "rolloff",
            FeatureKind::Flatness => "flatness",
            FeatureKind::Mfcc => "mfcc",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.id() == id)
    }
}

/// Feature extractor bound to one feature description
pub struct FeatureExtractor {
    features: Vec<(String, FeatureKind)>,
    pool: rayon::ThreadPool,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
}

impl std::fmt::Debug for FeatureExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureExtractor")
            .field("features", &self.features)
            .field("engine_threads", &self.pool.current_num_threads())
            .finish()
    }
}

impl FeatureExtractor {
    /// Parse the supplied features and set up the engine
    ///
    /// Unknown identifiers are a configuration error. `engine_threads`
    /// caps the internal thread pool (minimum 1).
    pub fn new(spec: &FeatureSpec, engine_threads: usize) -> PipelineResult<Self> {
        let features = Self::resolve(spec)?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(engine_threads.max(1))
            .thread_name(|i| format!("musfeat-engine-{}", i))
            .build()
            .map_err(|e| PipelineError::Io(std::io::Error::other(e.to_string())))?;

        let fft = FftPlanner::<f32>::new().plan_fft_forward(FRAME_SIZE);

        Ok(Self {
            features,
            pool,
            fft,
            window: hann_window(FRAME_SIZE),
        })
    }

    /// Check that every identifier in `spec` is supported
    pub fn validate(spec: &FeatureSpec) -> PipelineResult<()> {
        Self::resolve(spec).map(|_| ())
    }

    /// Identifiers accepted in feature descriptions
    pub fn supported_features() -> Vec<&'static str> {
        FeatureKind::ALL.iter().map(|k| k.id()).collect()
    }

    fn resolve(spec: &FeatureSpec) -> PipelineResult<Vec<(String, FeatureKind)>> {
        spec.features()
            .iter()
            .map(|id| {
                FeatureKind::from_id(id)
                    .map(|kind| (id.clone(), kind))
                    .ok_or_else(|| {
                        PipelineError::Config(format!(
                            "unknown feature {:?} (supported: {})",
                            id,
                            Self::supported_features().join(", ")
                        ))
                    })
            })
            .collect()
    }

    /// Compute the feature vector of one buffer, in description order
    pub fn extract(&self, buffer: &RawBuffer) -> Result<FeatureVector, ExtractError> {
        if buffer.samples.is_empty() {
            return Err(ExtractError::EmptyBuffer);
        }
        if buffer.sample_rate == 0 {
            return Err(ExtractError::InvalidSampleRate(buffer.sample_rate));
        }

        // Computed on first use and shared by every spectral feature
        let mut spectral: Option<SpectralSummary> = None;

        let mut features = Vec::with_capacity(self.features.len());
        for (name, kind) in &self.features {
            let values = match kind {
                FeatureKind::Rms => vec![rms(&buffer.samples)],
                FeatureKind::Peak => vec![peak(&buffer.samples)],
                FeatureKind::Zcr => vec![zero_crossing_rate(&buffer.samples)],
                FeatureKind::EnergyVariance => {
                    vec![energy_variance(&buffer.samples, buffer.sample_rate)]
                }
                FeatureKind::Duration => vec![buffer.duration_seconds()],
                FeatureKind::Centroid => vec![self.spectral(&mut spectral, buffer).centroid],
                FeatureKind::Rolloff => vec![self.spectral(&mut spectral, buffer).rolloff],
                FeatureKind::Flatness => vec![self.spectral(&mut spectral, buffer).flatness],
                FeatureKind::Mfcc => self.spectral(&mut spectral, buffer).mfcc.clone(),
            };

            if values.iter().any(|v| !v.is_finite()) {
                return Err(ExtractError::NonFinite(name.clone()));
            }

            features.push(FeatureValue {
                name: name.clone(),
                values,
            });
        }

        tracing::debug!(
            features = features.len(),
            frames = buffer.samples.len(),
            "Features extracted"
        );

        Ok(FeatureVector { features })
    }

    fn spectral<'s>(
        &self,
        cache: &'s mut Option<SpectralSummary>,
        buffer: &RawBuffer,
    ) -> &'s SpectralSummary {
        cache.get_or_insert_with(|| self.spectral_summary(buffer))
    }

    /// STFT-based statistics averaged over all frames
    fn spectral_summary(&self, buffer: &RawBuffer) -> SpectralSummary {
        let samples = &buffer.samples;
        let sample_rate = buffer.sample_rate;
        let frame_count = if samples.len() <= FRAME_SIZE {
            1
        } else {
            1 + (samples.len() - FRAME_SIZE) / HOP_SIZE
        };

        let filterbank = mel_filterbank(sample_rate, FRAME_SIZE, MEL_BANDS);
        let bin_hz = sample_rate as f64 / FRAME_SIZE as f64;

        let frames: Vec<FrameStats> = self.pool.install(|| {
            (0..frame_count)
                .into_par_iter()
                .map(|i| {
                    let start = i * HOP_SIZE;
                    let end = (start + FRAME_SIZE).min(samples.len());
                    let power = self.power_spectrum(&samples[start..end]);
                    FrameStats::from_power(&power, bin_hz, &filterbank)
                })
                .collect()
        });

        // Sequential reduction keeps results bit-identical across runs
        let n = frames.len() as f64;
        let mut centroid = 0.0;
        let mut rolloff = 0.0;
        let mut flatness = 0.0;
        let mut mel_mean = vec![0.0f64; MEL_BANDS];
        for frame in &frames {
            centroid += frame.centroid;
            rolloff += frame.rolloff;
            flatness += frame.flatness;
            for (acc, v) in mel_mean.iter_mut().zip(&frame.log_mel) {
                *acc += v;
            }
        }
        for v in &mut mel_mean {
            *v /= n;
        }

        SpectralSummary {
            centroid: centroid / n,
            rolloff: rolloff / n,
            flatness: flatness / n,
            mfcc: dct_ii(&mel_mean, MFCC_COEFFS),
        }
    }

    /// Windowed power spectrum of one frame (zero padded), bins 0..=N/2
    fn power_spectrum(&self, frame: &[f32]) -> Vec<f64> {
        let mut buf: Vec<Complex<f32>> = (0..FRAME_SIZE)
            .map(|i| {
                let s = frame.get(i).copied().unwrap_or(0.0);
                Complex::new(s * self.window[i], 0.0)
            })
            .collect();
        self.fft.process(&mut buf);
        buf[..=FRAME_SIZE / 2]
            .iter()
            .map(|c| c.norm_sqr() as f64)
            .collect()
    }
}

struct SpectralSummary {
    centroid: f64,
    rolloff: f64,
    flatness: f64,
    mfcc: Vec<f64>,
}

struct FrameStats {
    centroid: f64,
    rolloff: f64,
    flatness: f64,
    log_mel: Vec<f64>,
}

impl FrameStats {
    fn from_power(power: &[f64], bin_hz: f64, filterbank: &[Vec<f64>]) -> Self {
        let magnitude: Vec<f64> = power.iter().map(|p| p.sqrt()).collect();
        let total: f64 = magnitude.iter().sum();

        let (centroid, rolloff) = if total < EPSILON {
            (0.0, 0.0)
        } else {
            let weighted: f64 = magnitude
                .iter()
                .enumerate()
                .map(|(k, m)| k as f64 * bin_hz * m)
                .sum();

            let threshold = ROLLOFF_FRACTION * total;
            let mut cumulative = 0.0;
            let mut rolloff_bin = magnitude.len() - 1;
            for (k, m) in magnitude.iter().enumerate() {
                cumulative += m;
                if cumulative >= threshold {
                    rolloff_bin = k;
                    break;
                }
            }
            (weighted / total, rolloff_bin as f64 * bin_hz)
        };

        let n = power.len() as f64;
        let log_mean: f64 = power.iter().map(|p| (p + EPSILON).ln()).sum::<f64>() / n;
        let arith_mean: f64 = power.iter().map(|p| p + EPSILON).sum::<f64>() / n;
        let flatness = log_mean.exp() / arith_mean;

        let log_mel = filterbank
            .iter()
            .map(|band| {
                let energy: f64 = band.iter().zip(power).map(|(w, p)| w * p).sum();
                (energy + EPSILON).ln()
            })
            .collect();

        Self {
            centroid,
            rolloff,
            flatness,
            log_mel,
        }
    }
}

// ============================================================================
// Time-domain features
// ============================================================================

/// Root mean square energy
fn rms(samples: &[f32]) -> f64 {
    let sum_squares: f64 = samples.iter().map(|&s| (s as f64).powi(2)).sum();
    (sum_squares / samples.len() as f64).sqrt()
}

fn peak(samples: &[f32]) -> f64 {
    samples.iter().fold(0.0f64, |acc, &s| acc.max((s as f64).abs()))
}

/// Zero-crossing rate normalised by the maximum possible rate
fn zero_crossing_rate(samples: &[f32]) -> f64 {
    if samples.len() < 2 {
        return 0.0;
    }

    let crossings = samples
        .windows(2)
        .filter(|w| (w[0] >= 0.0 && w[1] < 0.0) || (w[0] < 0.0 && w[1] >= 0.0))
        .count();

    let max_possible = (samples.len() / 2).max(1);
    (crossings as f64 / max_possible as f64).min(1.0)
}

/// Variance of RMS over 100 ms frames
fn energy_variance(samples: &[f32], sample_rate: u32) -> f64 {
    let frame_size = ((sample_rate / 10) as usize).max(1);
    if samples.len() < frame_size {
        return 0.0;
    }

    let energies: Vec<f64> = samples.chunks(frame_size).map(rms).collect();
    let mean = energies.iter().sum::<f64>() / energies.len() as f64;
    energies.iter().map(|e| (e - mean).powi(2)).sum::<f64>() / energies.len() as f64
}

// ============================================================================
// Spectral helpers
// ============================================================================

fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f32 / size as f32).cos())
        .collect()
}

fn hz_to_mel(hz: f64) -> f64 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f64) -> f64 {
    700.0 * (10f64.powf(mel / 2595.0) - 1.0)
}

/// Triangular mel filters from 0 Hz to Nyquist over `fft_size / 2 + 1` bins
fn mel_filterbank(sample_rate: u32, fft_size: usize, bands: usize) -> Vec<Vec<f64>> {
    let bins = fft_size / 2 + 1;
    let nyquist = sample_rate as f64 / 2.0;
    let mel_max = hz_to_mel(nyquist);
    let edges: Vec<f64> = (0..bands + 2)
        .map(|i| mel_to_hz(mel_max * i as f64 / (bands + 1) as f64))
        .collect();
    let bin_hz = sample_rate as f64 / fft_size as f64;

    (0..bands)
        .map(|b| {
            let (lo, mid, hi) = (edges[b], edges[b + 1], edges[b + 2]);
            (0..bins)
                .map(|k| {
                    let f = k as f64 * bin_hz;
                    if f <= lo || f >= hi {
                        0.0
                    } else if f <= mid {
                        (f - lo) / (mid - lo)
                    } else {
                        (hi - f) / (hi - mid)
                    }
                })
                .collect()
        })
        .collect()
}

/// Orthonormal DCT-II, first `keep` coefficients
fn dct_ii(input: &[f64], keep: usize) -> Vec<f64> {
    let n = input.len() as f64;
    let scale = (2.0 / n).sqrt();
    (0..keep)
        .map(|k| {
            let sum: f64 = input
                .iter()
                .enumerate()
                .map(|(j, x)| x * (std::f64::consts::PI / n * (j as f64 + 0.5) * k as f64).cos())
                .sum();
            let norm = if k == 0 { std::f64::consts::FRAC_1_SQRT_2 } else { 1.0 };
            scale * norm * sum
        })
        .collect()
}
