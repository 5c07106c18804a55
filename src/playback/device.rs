//! Speaker output using CPAL.

use crate::config::PlaybackConfig;
use crate::error::{Result, VoxlinkError};
use crate::playback::output::{AudioSink, SinkShared, SourceHandle};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::Arc;
use std::time::Duration;

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: the stream is created and dropped by the sink that owns it and
/// never touched from two threads at once.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

/// Output sink backed by a CPAL stream.
///
/// Runs a mono float stream at the playback rate; the output callback
/// drains a shared segment queue, emitting silence on underrun so the
/// stream never starves.
pub struct CpalAudioSink {
    shared: Arc<SinkShared>,
    sample_rate: u32,
    next_id: u64,
    _stream: SendableStream,
}

impl CpalAudioSink {
    /// Open the configured output device and start the stream.
    ///
    /// # Errors
    /// Returns `Playback` when no device is available or the stream cannot
    /// be built.
    pub fn new(config: &PlaybackConfig) -> Result<Self> {
        let host = cpal::default_host();

        let device = match config.device.as_deref() {
            Some(name) => host
                .output_devices()
                .map_err(|e| VoxlinkError::Playback {
                    message: format!("Failed to enumerate output devices: {}", e),
                })?
                .find(|d| d.name().is_ok_and(|n| n == name))
                .ok_or_else(|| VoxlinkError::Playback {
                    message: format!("Output device not found: {}", name),
                })?,
            None => host
                .default_output_device()
                .ok_or_else(|| VoxlinkError::Playback {
                    message: "No output device available".to_string(),
                })?,
        };

        let stream_config = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let shared = Arc::new(SinkShared::new());
        let callback_shared = Arc::clone(&shared);

        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    callback_shared.fill(data);
                },
                |err| {
                    eprintln!("voxlink: audio playback error: {}", err);
                },
                None,
            )
            .map_err(|e| VoxlinkError::Playback {
                message: format!("Failed to build output stream: {}", e),
            })?;

        stream.play().map_err(|e| VoxlinkError::Playback {
            message: format!("Failed to start output stream: {}", e),
        })?;

        Ok(Self {
            shared,
            sample_rate: config.sample_rate,
            next_id: 0,
            _stream: SendableStream(stream),
        })
    }
}

impl AudioSink for CpalAudioSink {
    fn play_at(&mut self, samples: Vec<f32>, start_at: Duration) -> Result<SourceHandle> {
        let duration = crate::audio::pcm::duration_of(samples.len(), self.sample_rate);
        let id = self.next_id;
        self.next_id += 1;

        let handle = SourceHandle::new(id, start_at + duration);
        let start_sample = (start_at.as_secs_f64() * self.sample_rate as f64) as u64;
        self.shared.push(handle.cancel_flag(), samples, start_sample);

        Ok(handle)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}
