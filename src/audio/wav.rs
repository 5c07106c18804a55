//! WAV file audio source for offline runs and tests.

use crate::audio::source::AudioSource;
use crate::defaults::{CAPTURE_SAMPLE_RATE, PCM_SCALE};
use crate::error::{Result, VoxlinkError};
use std::io::Read;

/// Audio source that reads from WAV file data.
/// Supports arbitrary sample rates and channels, resampling to the capture
/// rate and converting to float samples.
pub struct WavAudioSource {
    samples: Vec<f32>,
    position: usize,
    chunk_size: usize,
}

impl WavAudioSource {
    /// Create from any reader (for testing/flexibility).
    pub fn from_reader(reader: Box<dyn Read + Send>) -> Result<Self> {
        let mut wav_reader =
            hound::WavReader::new(reader).map_err(|e| VoxlinkError::AudioCapture {
                message: format!("Failed to parse WAV file: {}", e),
            })?;

        let spec = wav_reader.spec();
        let source_rate = spec.sample_rate;
        let source_channels = spec.channels as usize;

        let raw_samples: Vec<i16> = wav_reader
            .samples::<i16>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| VoxlinkError::AudioCapture {
                message: format!("Failed to read WAV samples: {}", e),
            })?;

        // Mix to mono by averaging channels, then normalize to float
        let mono: Vec<f32> = if source_channels <= 1 {
            raw_samples.iter().map(|&s| s as f32 / PCM_SCALE).collect()
        } else {
            raw_samples
                .chunks_exact(source_channels)
                .map(|frame| {
                    let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                    (sum / source_channels as i32) as f32 / PCM_SCALE
                })
                .collect()
        };

        let samples = resample(&mono, source_rate, CAPTURE_SAMPLE_RATE);

        // 100ms chunks at the capture rate
        let chunk_size = CAPTURE_SAMPLE_RATE as usize / 10;

        Ok(Self {
            samples,
            position: 0,
            chunk_size,
        })
    }

    /// Consume the source and return all samples as a single buffer.
    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }
}

impl AudioSource for WavAudioSource {
    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    fn read_samples(&mut self) -> Result<Vec<f32>> {
        if self.position >= self.samples.len() {
            return Ok(Vec::new());
        }

        let end = std::cmp::min(self.position + self.chunk_size, self.samples.len());
        let chunk = self.samples[self.position..end].to_vec();
        self.position = end;

        Ok(chunk)
    }

    fn is_finite(&self) -> bool {
        true
    }
}

/// Simple linear interpolation resampling.
pub(crate) fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as f64 / ratio).ceil() as usize;

    (0..output_len)
        .map(|i| {
            let source_pos = i as f64 * ratio;
            let source_idx = source_pos.floor() as usize;
            let fraction = source_pos - source_idx as f64;

            if source_idx + 1 >= samples.len() {
                samples[source_idx]
            } else {
                let left = samples[source_idx] as f64;
                let right = samples[source_idx + 1] as f64;
                (left + (right - left) * fraction) as f32
            }
        })
        .collect()
}
