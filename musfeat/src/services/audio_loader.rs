//! Audio file loader
//!
//! Decodes audio files to mono f32 PCM with symphonia, optionally
//! resampling with rubato. Failures are returned per file so one corrupt
//! file never affects the rest of a batch.

use serde::{Deserialize, Serialize};
use std::path::Path;
use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::conv::FromSample;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::sample::Sample;
use thiserror::Error;
use tracing::debug;
use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};

use crate::models::RawBuffer;

/// Per-file loading errors
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot open file: {0}")]
    Open(#[from] std::io::Error),

    #[error("unrecognised audio format: {0}")]
    Probe(String),

    #[error("no audio track found in file")]
    NoTrack,

    #[error("sample rate not specified in codec params")]
    UnknownSampleRate,

    #[error("decoder error: {0}")]
    Decoder(String),

    #[error("no audio frames could be decoded")]
    Empty,

    #[error("resampling failed: {0}")]
    Resample(String),
}

/// Loader settings shared by every worker
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderOptions {
    /// Resample to this rate; `None` keeps the native rate
    pub target_sample_rate: Option<u32>,
}

/// Audio file loader
#[derive(Debug, Clone, Default)]
pub struct AudioLoader {
    options: LoaderOptions,
}

impl AudioLoader {
    pub fn new(options: LoaderOptions) -> Self {
        Self { options }
    }

    /// Lazily load a batch of files, one result per input, in order
    ///
    /// Each buffer is produced only when the iterator is advanced, so a
    /// caller that consumes buffers one by one holds at most one in memory.
    pub fn load_batch<'a, I>(
        &'a self,
        paths: I,
    ) -> impl Iterator<Item = (&'a Path, Result<RawBuffer, LoadError>)> + 'a
    where
        I: IntoIterator<Item = &'a Path>,
        I::IntoIter: 'a,
    {
        paths.into_iter().map(move |path| (path, self.load(path)))
    }

    /// Decode a whole file to mono PCM
    ///
    /// **Algorithm:**
    /// 1. Probe the container (extension used as a hint)
    /// 2. Pick the first decodable track
    /// 3. Decode every packet, averaging channels to mono; corrupt packets
    ///    are skipped
    /// 4. Resample if a target rate is configured
    pub fn load(&self, path: &Path) -> Result<RawBuffer, LoadError> {
        debug!(path = %path.display(), "Decoding audio file");

        let file = std::fs::File::open(path)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(extension) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(extension);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| LoadError::Probe(e.to_string()))?;

        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(LoadError::NoTrack)?;

        let track_id = track.id;
        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or(LoadError::UnknownSampleRate)?;

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| LoadError::Decoder(e.to_string()))?;

        let mut samples: Vec<f32> = Vec::new();
        let mut channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(0);
        let mut skipped_packets = 0usize;

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    break;
                }
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => return Err(LoadError::Decoder(e.to_string())),
            };

            if packet.track_id() != track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(decoded) => {
                    channels = decoded.spec().channels.count();
                    samples.extend(downmix_ref(&decoded));
                }
                Err(SymphoniaError::DecodeError(msg)) => {
                    skipped_packets += 1;
                    debug!(path = %path.display(), "Skipping corrupt packet: {}", msg);
                }
                Err(e) => return Err(LoadError::Decoder(e.to_string())),
            }
        }

        if samples.is_empty() {
            return Err(LoadError::Empty);
        }

        debug!(
            path = %path.display(),
            sample_rate,
            channels,
            frames = samples.len(),
            skipped_packets,
            "Audio decoding complete"
        );

        let (samples, sample_rate) = match self.options.target_sample_rate {
            Some(target) if target != sample_rate => (resample_mono(samples, sample_rate, target)?, target),
            _ => (samples, sample_rate),
        };

        Ok(RawBuffer {
            samples,
            sample_rate,
            channels,
        })
    }
}

/// Average all channels of a decoded buffer to mono
fn downmix_ref(decoded: &AudioBufferRef) -> Vec<f32> {
    match decoded {
        AudioBufferRef::U8(buf) => downmix(&**buf),
        AudioBufferRef::U16(buf) => downmix(&**buf),
        AudioBufferRef::U24(buf) => downmix(&**buf),
        AudioBufferRef::U32(buf) => downmix(&**buf),
        AudioBufferRef::S8(buf) => downmix(&**buf),
        AudioBufferRef::S16(buf) => downmix(&**buf),
        AudioBufferRef::S24(buf) => downmix(&**buf),
        AudioBufferRef::S32(buf) => downmix(&**buf),
        AudioBufferRef::F32(buf) => downmix(&**buf),
        AudioBufferRef::F64(buf) => downmix(&**buf),
    }
}

fn downmix<S>(buf: &AudioBuffer<S>) -> Vec<f32>
where
    S: Sample,
    f32: FromSample<S>,
{
    let num_channels = buf.spec().channels.count();
    let num_frames = buf.frames();
    let mut mono = vec![0.0f32; num_frames];

    if num_channels == 0 {
        return mono;
    }

    for ch in 0..num_channels {
        for (out, &sample) in mono.iter_mut().zip(buf.chan(ch)) {
            *out += f32::from_sample(sample);
        }
    }

    let scale = 1.0 / num_channels as f32;
    for out in &mut mono {
        *out *= scale;
    }
    mono
}

/// Resample mono PCM with rubato
///
/// Sinc interpolation with a BlackmanHarris2 window, processed as a single
/// chunk covering the whole input.
fn resample_mono(samples: Vec<f32>, source_rate: u32, target_rate: u32) -> Result<Vec<f32>, LoadError> {
    let num_frames = samples.len();

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = target_rate as f64 / source_rate as f64;

    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, num_frames, 1)
        .map_err(|e| LoadError::Resample(e.to_string()))?;

    let output = resampler
        .process(&[samples], None)
        .map_err(|e| LoadError::Resample(e.to_string()))?;

    let resampled = output.into_iter().next().unwrap_or_default();

    debug!(
        "Resampled {} frames ({} Hz) → {} frames ({} Hz)",
        num_frames,
        source_rate,
        resampled.len(),
        target_rate
    );

    Ok(resampled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_tone(path: &Path, sample_rate: u32, channels: u16, seconds: f32) {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        let total = (seconds * sample_rate as f32) as usize;
        for i in 0..total {
            let t = i as f32 / sample_rate as f32;
            let s = (0.5 * (2.0 * std::f32::consts::PI * 440.0 * t).sin() * i16::MAX as f32) as i16;
            for _ in 0..channels {
                writer.write_sample(s).unwrap();
            }
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_load_stereo_wav_downmixes_to_mono() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tone.wav");
        write_tone(&path, 8000, 2, 0.5);

        let buffer = AudioLoader::default().load(&path).unwrap();
        assert_eq!(buffer.sample_rate, 8000);
        assert_eq!(buffer.channels, 2);
        assert_eq!(buffer.samples.len(), 4000);
        assert!(buffer.samples.iter().all(|s| s.abs() <= 1.0));
        assert!((buffer.duration_seconds() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_load_with_resampling() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tone.wav");
        write_tone(&path, 8000, 1, 1.0);

        let loader = AudioLoader::new(LoaderOptions {
            target_sample_rate: Some(16000),
        });
        let buffer = loader.load(&path).unwrap();
        assert_eq!(buffer.sample_rate, 16000);
        // One chunk in, roughly twice as many frames out
        assert!(buffer.samples.len() > 15000 && buffer.samples.len() <= 16100);
    }

    #[test]
    fn test_load_garbage_is_probe_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("corrupt.wav");
        std::fs::write(&path, b"this is definitely not a riff header").unwrap();

        assert!(AudioLoader::default().load(&path).is_err());
    }

    #[test]
    fn test_load_missing_file_is_open_error() {
        let result = AudioLoader::default().load(Path::new("/nonexistent/a.wav"));
        assert!(matches!(result, Err(LoadError::Open(_))));
    }

    #[test]
    fn test_batch_isolates_failures() {
        let temp_dir = TempDir::new().unwrap();
        let good = temp_dir.path().join("good.wav");
        let bad = temp_dir.path().join("bad.wav");
        write_tone(&good, 8000, 1, 0.1);
        std::fs::write(&bad, b"garbage").unwrap();

        let loader = AudioLoader::default();
        let paths = [bad.as_path(), good.as_path()];
        let results: Vec<_> = loader.load_batch(paths).collect();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, bad.as_path());
        assert!(results[0].1.is_err());
        assert!(results[1].1.is_ok());
    }
}
